// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Activation channel: the long-poll / complete protocol with the agent.
//!
//! ```text
//! loop:
//!   poll ($waitForActivation)  ── retry (42) ──> poll again, no delay
//!        │                      ── stop (43)  ──> exit cleanly
//!        │                      ── other      ──> ChannelError
//!        └─ work ($activationId + params)
//!              │ dispatch to the handler (one activation at a time)
//!              └─ complete ($activationId + result), bounded retries
//! ```
//!
//! The next poll is only issued after the previous activation's completion
//! was accepted, so at most one activation is ever in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use actionbridge_client::protocol::{RETRY_CODE, STOP_CODE, WAIT_FOR_ACTIVATION};
use actionbridge_client::{ActionRef, InvokeResponse, PlatformClient};
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::activation::{Activation, ActivationState};
use crate::config::ChannelConfig;
use crate::error::{BridgeError, Result};
use crate::session::Session;

/// A poll response, classified once at the transport boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// No work yet.
    Retry,
    /// A caller invoked the action.
    Work(Activation),
    /// The agent asked the bridge to stop polling.
    Stop,
    /// Anything else.
    Error {
        /// HTTP status of the poll invoke.
        status: u16,
        /// Application error code, if the body carried one.
        code: Option<i64>,
        /// Description.
        message: String,
    },
}

impl PollOutcome {
    /// Classify a poll invoke response.
    ///
    /// A 202 means the platform's blocking window elapsed before the agent
    /// answered; it is treated like a retry.
    pub fn from_response(response: &InvokeResponse) -> Self {
        match response.status {
            200 => match response.result.as_ref().and_then(Activation::from_poll_result) {
                Some(activation) => PollOutcome::Work(activation),
                None => PollOutcome::Error {
                    status: 200,
                    code: None,
                    message: "poll result carries no $activationId".to_string(),
                },
            },
            202 => PollOutcome::Retry,
            status => match response.error_code() {
                Some(RETRY_CODE) if status == 502 => PollOutcome::Retry,
                Some(STOP_CODE) if status == 502 => PollOutcome::Stop,
                code => PollOutcome::Error {
                    status,
                    code,
                    message: response
                        .error()
                        .map(error_message)
                        .unwrap_or_else(|| "unexpected poll response".to_string()),
                },
            },
        }
    }
}

fn error_message(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        other => other
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    }
}

/// Runs one forwarded activation to completion.
///
/// Implementations move the activation from `dispatched` through
/// `executing` to `completed` or `failed` and attach the result.
#[async_trait]
pub trait ActivationHandler: Send + Sync {
    /// Execute the activation and record its result on it.
    async fn handle(&self, activation: &mut Activation) -> Result<()>;
}

/// Why [`ActivationChannel::serve`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeExit {
    /// The cancellation token fired.
    Cancelled,
    /// The agent answered a poll with the stop code.
    Stopped,
}

/// Channel counters.
#[derive(Debug, Default)]
struct ChannelStats {
    polls: AtomicU64,
    retries: AtomicU64,
    forwarded: AtomicU64,
    completed: AtomicU64,
}

/// Snapshot of channel counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStatsSnapshot {
    /// Poll invokes issued.
    pub polls: u64,
    /// Polls answered with retry.
    pub retries: u64,
    /// Activations handed to the handler.
    pub forwarded: u64,
    /// Completions accepted by the platform.
    pub completed: u64,
}

/// The poll/complete protocol on behalf of the agent.
pub struct ActivationChannel {
    platform: Arc<dyn PlatformClient>,
    action: ActionRef,
    config: ChannelConfig,
    stats: ChannelStats,
}

impl ActivationChannel {
    /// Create a channel for `action`.
    pub fn new(platform: Arc<dyn PlatformClient>, action: ActionRef, config: ChannelConfig) -> Self {
        Self {
            platform,
            action,
            config,
            stats: ChannelStats::default(),
        }
    }

    /// Create a channel from a session context.
    pub fn from_session(session: &Session) -> Self {
        Self::new(
            session.platform.clone(),
            session.action.clone(),
            session.config.channel.clone(),
        )
    }

    /// Current counters.
    pub fn stats(&self) -> ChannelStatsSnapshot {
        ChannelStatsSnapshot {
            polls: self.stats.polls.load(Ordering::Relaxed),
            retries: self.stats.retries.load(Ordering::Relaxed),
            forwarded: self.stats.forwarded.load(Ordering::Relaxed),
            completed: self.stats.completed.load(Ordering::Relaxed),
        }
    }

    /// Issue one poll invoke.
    ///
    /// Transport failures become [`BridgeError::Channel`]; protocol answers
    /// (including application errors) are returned as outcomes.
    pub async fn poll(&self) -> Result<PollOutcome> {
        self.stats.polls.fetch_add(1, Ordering::Relaxed);
        let params = json!({ WAIT_FOR_ACTIVATION: true });
        let response = self
            .platform
            .invoke(&self.action, &params, true)
            .await
            .map_err(|e| BridgeError::Channel(format!("poll failed: {}", e)))?;

        let outcome = PollOutcome::from_response(&response);
        if outcome == PollOutcome::Retry {
            self.stats.retries.fetch_add(1, Ordering::Relaxed);
        }
        Ok(outcome)
    }

    /// Post a finished activation's result back to the agent.
    ///
    /// Retried up to `complete_retries` extra times; the activation only
    /// counts as handled once the platform accepted the completion.
    pub async fn complete(&self, activation: &Activation) -> Result<()> {
        if !activation.is_finished() {
            return Err(BridgeError::InvalidState(format!(
                "activation {} completed before it finished",
                activation.id
            )));
        }

        let payload = activation.completion_payload();
        let attempts = self.config.complete_retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.platform.invoke(&self.action, &payload, true).await {
                Ok(response) if response.status == 200 => {
                    self.stats.completed.fetch_add(1, Ordering::Relaxed);
                    debug!(activation_id = %activation.id, attempt, "Completion accepted");
                    return Ok(());
                }
                Ok(response) => {
                    last_error = format!(
                        "status {}: {}",
                        response.status,
                        response
                            .error()
                            .map(error_message)
                            .unwrap_or_else(|| "no error body".to_string())
                    );
                }
                Err(e) => last_error = e.to_string(),
            }

            warn!(
                activation_id = %activation.id,
                attempt,
                attempts,
                error = %last_error,
                "Completion failed"
            );
            if attempt < attempts {
                tokio::time::sleep(self.config.complete_retry_delay).await;
            }
        }

        Err(BridgeError::Channel(format!(
            "failed to complete activation {} after {} attempts: {}",
            activation.id, attempts, last_error
        )))
    }

    /// Poll, dispatch and complete until cancelled, stopped, or failed.
    ///
    /// Only the poll itself is cancellable; an activation already handed to
    /// `handler` is executed and completed before the token is observed.
    pub async fn serve(
        &self,
        cancel: &CancellationToken,
        handler: &dyn ActivationHandler,
    ) -> Result<ServeExit> {
        info!(action = %self.action, "Waiting for activations");

        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Poll cancelled");
                    return Ok(ServeExit::Cancelled);
                }
                outcome = self.poll() => outcome?,
            };

            match outcome {
                PollOutcome::Retry => continue,
                PollOutcome::Stop => {
                    info!(action = %self.action, "Agent requested stop");
                    return Ok(ServeExit::Stopped);
                }
                PollOutcome::Error {
                    status,
                    code,
                    message,
                } => {
                    return Err(BridgeError::Channel(format!(
                        "unexpected poll response (status {}, code {:?}): {}",
                        status, code, message
                    )));
                }
                PollOutcome::Work(mut activation) => {
                    self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
                    info!(activation_id = %activation.id, "Activation received");

                    activation.advance(ActivationState::Dispatched)?;
                    handler.handle(&mut activation).await?;
                    self.complete(&activation).await?;

                    info!(
                        activation_id = %activation.id,
                        state = ?activation.state,
                        "Activation completed"
                    );
                }
            }
        }
    }
}
