// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Session context and lifecycle state.

use std::fmt;
use std::sync::Arc;

use actionbridge_client::{ActionRef, PlatformClient};
use chrono::{DateTime, Utc};

use crate::config::DebugConfig;

/// Lifecycle state of a debug session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, nothing touched yet.
    Idle,
    /// Backup, install and provisioning in progress.
    Starting,
    /// Agent installed and executor provisioned.
    Running,
    /// Teardown and restore in progress.
    Stopping,
    /// Cleanly stopped.
    Stopped,
    /// Failed; cleanup may or may not have run.
    Failed,
}

impl SessionState {
    /// Whether the session has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
            SessionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Everything one debug session needs, passed explicitly to each component.
#[derive(Clone)]
pub struct Session {
    /// Unique session id.
    pub id: String,
    /// The action under debug.
    pub action: ActionRef,
    /// Platform client.
    pub platform: Arc<dyn PlatformClient>,
    /// Session configuration.
    pub config: DebugConfig,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a session with a fresh id.
    pub fn new(action: ActionRef, platform: Arc<dyn PlatformClient>, config: DebugConfig) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            action,
            platform,
            config,
            created_at: Utc::now(),
        }
    }

    /// Deterministic reference of the backup action.
    pub fn backup_ref(&self) -> ActionRef {
        self.action.with_suffix(&self.config.backup_suffix)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("action", &self.action)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actionbridge_client::MockPlatform;

    #[test]
    fn test_backup_ref_is_deterministic() {
        let platform: Arc<dyn PlatformClient> = Arc::new(MockPlatform::new());
        let a = Session::new(ActionRef::new("guest", "hello"), platform.clone(), DebugConfig::default());
        let b = Session::new(ActionRef::new("guest", "hello"), platform, DebugConfig::default());

        assert_ne!(a.id, b.id);
        assert_eq!(a.backup_ref(), b.backup_ref());
        assert_eq!(a.backup_ref().name, "hello_actionbridge_backup");
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Stopped.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Running.is_terminal());
        assert_eq!(SessionState::Stopping.to_string(), "stopping");
    }
}
