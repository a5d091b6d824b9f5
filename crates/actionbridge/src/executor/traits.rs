// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Executor trait definitions.
//!
//! Defines the abstract interface for local execution environments.

use std::time::Duration;

use actionbridge_client::{ActionExec, ActionRef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::activation::Activation;
use crate::mount::MountDescriptor;
use crate::runtimes::RuntimeProfile;

/// Errors from executor infrastructure.
///
/// User code failures are not errors; they come back as a failed
/// [`ExecutionResult`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecutorError {
    /// `execute` or `restart` called without a provisioned instance.
    #[error("Executor not provisioned")]
    NotProvisioned,

    /// Container engine command failed.
    #[error("Container engine command '{command}' failed: {stderr}")]
    Engine {
        /// Command that failed.
        command: String,
        /// Standard error output.
        stderr: String,
    },

    /// Runtime did not come up in time.
    #[error("Runtime not ready after {0:?}")]
    NotReady(Duration),

    /// Runtime rejected the `/init` payload.
    #[error("Runtime initialization failed: {0}")]
    Init(String),

    /// HTTP exchange with the runtime failed.
    #[error("Runtime transport error: {0}")]
    Transport(String),

    /// Provisioning options cannot be served.
    #[error("Invalid provisioning options: {0}")]
    InvalidOptions(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for executor operations.
pub type Result<T> = std::result::Result<T, ExecutorError>;

/// Platform default action timeout.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Options for provisioning a local runtime.
#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    /// Session id (labels and names the instance).
    pub session_id: String,
    /// The action being debugged.
    pub action: ActionRef,
    /// Runtime profile.
    pub profile: RuntimeProfile,
    /// Mounted local source. `None` runs `inline` instead.
    pub mount: Option<MountDescriptor>,
    /// Deployed code to run when nothing is mounted.
    pub inline: Option<ActionExec>,
    /// Entry function name.
    pub main: String,
    /// Host port for the debugger protocol.
    pub debug_port: u16,
    /// The action's platform timeout, if the definition sets one.
    pub action_timeout: Option<Duration>,
}

impl ProvisionOptions {
    /// Container name for this session.
    pub fn instance_name(&self) -> String {
        format!(
            "actionbridge-{}",
            &self.session_id[..8.min(self.session_id.len())]
        )
    }

    /// Epoch-millisecond deadline handed to the runtime for a run starting at
    /// `now_ms`: the execution budget, else the action's platform timeout.
    pub fn run_deadline(&self, budget: Option<Duration>, now_ms: i64) -> i64 {
        let window = budget
            .or(self.action_timeout)
            .unwrap_or(DEFAULT_ACTION_TIMEOUT);
        now_ms + window.as_millis() as i64
    }

    /// The `/init` payload for these options.
    pub fn init_payload(&self) -> Result<Value> {
        match (&self.mount, &self.inline) {
            (Some(mount), _) => self
                .profile
                .init_for_mount(&self.action.name, &self.main, mount)
                .map_err(|e| ExecutorError::InvalidOptions(e.to_string())),
            (None, Some(exec)) => Ok(self.profile.init_inline(&self.action.name, exec)),
            (None, None) => Err(ExecutorError::InvalidOptions(
                "neither a source mount nor inline code".to_string(),
            )),
        }
    }
}

/// Outcome of running one activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Result document (`{"error": ...}` on failure).
    pub result: Value,
    /// Whether the user code succeeded.
    pub success: bool,
    /// Execution duration in milliseconds.
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// A successful run.
    pub fn success(result: Value, duration_ms: u64) -> Self {
        Self {
            result,
            success: true,
            duration_ms,
        }
    }

    /// A failed run with an error message.
    pub fn failure(message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            result: json!({ "error": message.into() }),
            success: false,
            duration_ms,
        }
    }

    /// A failed run with an error document produced by the runtime.
    pub fn failure_with(result: Value, duration_ms: u64) -> Self {
        let result = if result.get("error").is_some() {
            result
        } else {
            json!({ "error": result })
        };
        Self {
            result,
            success: false,
            duration_ms,
        }
    }
}

/// Local execution environment for forwarded activations.
///
/// Implementations hold their instance internally; one executor serves one
/// session. Callers guarantee at most one `execute` at a time.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Short name of the implementation.
    fn executor_type(&self) -> &'static str;

    /// Start the runtime and load the code, waiting for work.
    async fn provision(&self, options: &ProvisionOptions) -> Result<()>;

    /// Run one activation.
    ///
    /// `budget` bounds the run; exceeding it yields a failed result.
    async fn execute(&self, activation: &Activation, budget: Option<Duration>)
    -> Result<ExecutionResult>;

    /// Stop and remove the runtime. No-op when nothing is provisioned.
    async fn teardown(&self) -> Result<()>;

    /// Tear down and provision again with the last options.
    async fn restart(&self) -> Result<()>;

    /// Whether an instance is up.
    async fn is_provisioned(&self) -> bool;
}
