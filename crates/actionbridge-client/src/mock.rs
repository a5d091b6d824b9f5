// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock platform for testing.
//!
//! An in-memory stand-in for the platform that also plays the role of the
//! agent stub once an action carries the marker annotation. Nothing is shared
//! between instances; every test builds its own.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::sync::{Mutex, Notify, oneshot};
use tokio::time::Instant;

use crate::client::PlatformClient;
use crate::error::{ClientError, Result};
use crate::protocol::{self, ACTIVATION_ID, MARKER_ANNOTATION, RETRY_CODE, STOP_CODE};
use crate::types::{ActionDefinition, ActionRef, InvokeResponse};

/// A call received by the mock platform.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCall {
    /// `get_action`.
    Get(ActionRef),
    /// `update_action`.
    Update(ActionRef, ActionDefinition),
    /// `delete_action`.
    Delete(ActionRef),
    /// `invoke`.
    Invoke {
        /// Invoked action.
        action: ActionRef,
        /// Parameters.
        params: Value,
        /// Blocking flag.
        blocking: bool,
    },
}

impl PlatformCall {
    /// Whether the call changes remote state (update or delete).
    pub fn is_mutation(&self) -> bool {
        matches!(self, PlatformCall::Update(..) | PlatformCall::Delete(_))
    }

    /// Whether the call is a poll invoke.
    pub fn is_poll(&self) -> bool {
        matches!(self, PlatformCall::Invoke { params, .. } if protocol::is_poll(params))
    }

    /// Whether the call is a completion invoke.
    pub fn is_completion(&self) -> bool {
        matches!(self, PlatformCall::Invoke { params, .. } if protocol::completion_id(params).is_some())
    }

    /// Whether the call is an ordinary (caller) invoke.
    pub fn is_caller_invoke(&self) -> bool {
        matches!(self, PlatformCall::Invoke { .. }) && !self.is_poll() && !self.is_completion()
    }
}

#[derive(Debug)]
struct PendingActivation {
    id: String,
    params: Value,
}

#[derive(Default)]
struct State {
    actions: HashMap<ActionRef, ActionDefinition>,
    remote_results: HashMap<ActionRef, Value>,
    queue: VecDeque<PendingActivation>,
    dispatched: HashSet<String>,
    relays: HashMap<String, oneshot::Sender<Value>>,
    results: HashMap<String, Value>,
    calls: Vec<PlatformCall>,
    stop_requested: bool,
    completion_failures: u32,
    next_id: u64,
}

/// Mock platform for testing.
pub struct MockPlatform {
    state: Mutex<State>,
    work: Notify,
    /// How long a poll waits for work before answering with the retry code.
    pub poll_window: Duration,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlatform {
    /// Create an empty mock platform.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            work: Notify::new(),
            poll_window: Duration::from_millis(50),
        }
    }

    /// Set the poll window.
    pub fn with_poll_window(mut self, window: Duration) -> Self {
        self.poll_window = window;
        self
    }

    /// Deploy an action.
    pub async fn insert_action(&self, action: &ActionRef, definition: ActionDefinition) {
        let mut state = self.state.lock().await;
        state.actions.insert(action.clone(), definition);
    }

    /// Current definition of an action.
    pub async fn action(&self, action: &ActionRef) -> Option<ActionDefinition> {
        let state = self.state.lock().await;
        state.actions.get(action).cloned()
    }

    /// Result returned when the deployed (non-agent) code of `action` runs.
    pub async fn set_remote_result(&self, action: &ActionRef, result: Value) {
        let mut state = self.state.lock().await;
        state.remote_results.insert(action.clone(), result);
    }

    /// All calls received so far.
    pub async fn calls(&self) -> Vec<PlatformCall> {
        let state = self.state.lock().await;
        state.calls.clone()
    }

    /// Forget recorded calls.
    pub async fn clear_calls(&self) {
        let mut state = self.state.lock().await;
        state.calls.clear();
    }

    /// Number of poll invokes received.
    pub async fn poll_count(&self) -> usize {
        let state = self.state.lock().await;
        state.calls.iter().filter(|c| c.is_poll()).count()
    }

    /// Number of completion invokes received.
    pub async fn completion_count(&self) -> usize {
        let state = self.state.lock().await;
        state.calls.iter().filter(|c| c.is_completion()).count()
    }

    /// Number of ordinary invokes received.
    pub async fn caller_invoke_count(&self) -> usize {
        let state = self.state.lock().await;
        state.calls.iter().filter(|c| c.is_caller_invoke()).count()
    }

    /// Number of caller invocations not yet picked up by a poll.
    pub async fn queued_count(&self) -> usize {
        let state = self.state.lock().await;
        state.queue.len()
    }

    /// Result relayed for a forwarded activation.
    pub async fn result(&self, activation_id: &str) -> Option<Value> {
        let state = self.state.lock().await;
        state.results.get(activation_id).cloned()
    }

    /// All relayed results, keyed by activation id.
    pub async fn results(&self) -> HashMap<String, Value> {
        let state = self.state.lock().await;
        state.results.clone()
    }

    /// Make current and future polls answer with the stop code.
    pub async fn request_stop(&self) {
        let mut state = self.state.lock().await;
        state.stop_requested = true;
        drop(state);
        self.work.notify_waiters();
        self.work.notify_one();
    }

    /// Fail the next `count` completion invokes with a connection error.
    pub async fn fail_next_completions(&self, count: u32) {
        let mut state = self.state.lock().await;
        state.completion_failures = count;
    }

    // =========================================================================
    // Agent emulation
    // =========================================================================

    async fn record(&self, call: PlatformCall) {
        let mut state = self.state.lock().await;
        state.calls.push(call);
    }

    async fn poll(&self) -> Result<InvokeResponse> {
        let deadline = Instant::now() + self.poll_window;

        loop {
            {
                let mut state = self.state.lock().await;
                if state.stop_requested {
                    return Ok(InvokeResponse::application_error(json!({
                        "code": STOP_CODE,
                        "message": "Debugger stopped."
                    })));
                }
                if let Some(pending) = state.queue.pop_front() {
                    state.dispatched.insert(pending.id.clone());
                    let mut result = match pending.params {
                        Value::Object(map) => map,
                        _ => Map::new(),
                    };
                    result.insert(ACTIVATION_ID.to_string(), Value::String(pending.id));
                    return Ok(InvokeResponse::completed(Value::Object(result)));
                }
            }

            if tokio::time::timeout_at(deadline, self.work.notified())
                .await
                .is_err()
            {
                return Ok(InvokeResponse::application_error(json!({
                    "code": RETRY_CODE,
                    "message": "Please retry."
                })));
            }
        }
    }

    async fn complete(&self, activation_id: &str, params: &Value) -> Result<InvokeResponse> {
        let mut state = self.state.lock().await;

        if state.completion_failures > 0 {
            state.completion_failures -= 1;
            return Err(ClientError::Connection(
                "injected completion failure".to_string(),
            ));
        }

        if !state.dispatched.remove(activation_id) {
            return Ok(InvokeResponse::application_error(json!({
                "code": 404,
                "message": format!("unknown activation {}", activation_id)
            })));
        }

        let mut result = params.clone();
        if let Some(map) = result.as_object_mut() {
            map.remove(ACTIVATION_ID);
        }

        if let Some(relay) = state.relays.remove(activation_id) {
            let _ = relay.send(result.clone());
        }
        state.results.insert(activation_id.to_string(), result);

        Ok(InvokeResponse::completed(json!({})))
    }

    async fn enqueue(&self, params: &Value, blocking: bool) -> Result<InvokeResponse> {
        let (id, relay) = {
            let mut state = self.state.lock().await;
            state.next_id += 1;
            let id = format!("mock-activation-{}", state.next_id);
            state.queue.push_back(PendingActivation {
                id: id.clone(),
                params: params.clone(),
            });

            let relay = if blocking {
                let (tx, rx) = oneshot::channel();
                state.relays.insert(id.clone(), tx);
                Some(rx)
            } else {
                None
            };
            (id, relay)
        };
        self.work.notify_one();

        let Some(relay) = relay else {
            return Ok(InvokeResponse::accepted(id));
        };

        let result = relay
            .await
            .map_err(|_| ClientError::Connection("activation abandoned".to_string()))?;

        let response = match result.get("error") {
            Some(error) => InvokeResponse::application_error(error.clone()),
            None => InvokeResponse::completed(result),
        };
        Ok(response.with_activation_id(id))
    }
}

#[async_trait]
impl PlatformClient for MockPlatform {
    async fn get_action(&self, action: &ActionRef) -> Result<ActionDefinition> {
        self.record(PlatformCall::Get(action.clone())).await;
        let state = self.state.lock().await;
        state
            .actions
            .get(action)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(action.to_string()))
    }

    async fn update_action(
        &self,
        action: &ActionRef,
        definition: &ActionDefinition,
    ) -> Result<ActionDefinition> {
        self.record(PlatformCall::Update(action.clone(), definition.clone()))
            .await;
        let mut state = self.state.lock().await;
        state.actions.insert(action.clone(), definition.clone());
        Ok(definition.clone())
    }

    async fn delete_action(&self, action: &ActionRef) -> Result<()> {
        self.record(PlatformCall::Delete(action.clone())).await;
        let mut state = self.state.lock().await;
        state
            .actions
            .remove(action)
            .map(|_| ())
            .ok_or_else(|| ClientError::NotFound(action.to_string()))
    }

    async fn invoke(
        &self,
        action: &ActionRef,
        params: &Value,
        blocking: bool,
    ) -> Result<InvokeResponse> {
        self.record(PlatformCall::Invoke {
            action: action.clone(),
            params: params.clone(),
            blocking,
        })
        .await;

        {
            let state = self.state.lock().await;
            let definition = state
                .actions
                .get(action)
                .ok_or_else(|| ClientError::NotFound(action.to_string()))?;
            if !definition.has_annotation_true(MARKER_ANNOTATION) {
                let result = state
                    .remote_results
                    .get(action)
                    .cloned()
                    .unwrap_or_else(|| json!({}));
                return Ok(InvokeResponse::completed(result));
            }
        }

        if protocol::is_poll(params) {
            self.poll().await
        } else if let Some(id) = protocol::completion_id(params) {
            let id = id.to_string();
            self.complete(&id, params).await
        } else {
            self.enqueue(params, blocking).await
        }
    }
}
