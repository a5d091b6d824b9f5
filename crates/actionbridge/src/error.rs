// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for actionbridge.

use std::fmt;

use actionbridge_client::ClientError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::executor::ExecutorError;
use crate::watcher::WatchError;

/// Lifecycle phase an error surfaced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Backup, install, mount resolution, provisioning.
    Start,
    /// Poll/forward loop.
    Run,
    /// Teardown and restore.
    Stop,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Start => write!(f, "start"),
            Phase::Run => write!(f, "run"),
            Phase::Stop => write!(f, "stop"),
        }
    }
}

/// Bridge errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BridgeError {
    /// The action is missing, unreachable, or in a state the bridge cannot work with.
    #[error("Remote state error for {action}: {message}")]
    RemoteState {
        /// Action reference.
        action: String,
        /// What went wrong.
        message: String,
    },

    /// Another session already owns the action.
    #[error("Action {0} is already under debug (marker annotation present); use --force to take it over")]
    InstallConflict(String),

    /// Unexpected transport or protocol response from the poll/complete channel.
    #[error("Channel error: {0}")]
    Channel(String),

    /// Local execution infrastructure failed.
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutorError),

    /// No backup exists to restore from.
    #[error("No backup found for {0}; the action may still carry the agent")]
    RestoreConflict(String),

    /// The entry file could not be located in the source path.
    #[error("Unsupported source layout: {0}")]
    UnsupportedLayout(String),

    /// The action cannot be replaced by the agent (sequence, blackbox).
    #[error("Unsupported action {action}: {reason}")]
    UnsupportedAction {
        /// Action reference.
        action: String,
        /// Why it is refused.
        reason: String,
    },

    /// No runtime profile is known for the action kind.
    #[error("Unsupported runtime kind '{0}' (pass --image to use a custom image)")]
    UnsupportedRuntime(String),

    /// Operation not legal in the current session state.
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// File watching failed.
    #[error("Watch error: {0}")]
    Watch(#[from] WatchError),

    /// Platform call failed.
    #[error("Platform error: {0}")]
    Client(#[from] ClientError),

    /// A background phase failed.
    #[error("{phase} phase failed: {message}")]
    Failed {
        /// Phase the failure happened in.
        phase: Phase,
        /// Error message.
        message: String,
    },
}

impl BridgeError {
    /// Build a [`BridgeError::RemoteState`].
    pub fn remote_state(action: impl fmt::Display, message: impl Into<String>) -> Self {
        BridgeError::RemoteState {
            action: action.to_string(),
            message: message.into(),
        }
    }

    /// Whether the error is a restore conflict (warning-level at stop).
    pub fn is_restore_conflict(&self) -> bool {
        matches!(self, BridgeError::RestoreConflict(_))
    }
}

/// Result type using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;
