// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Action state guard.
//!
//! Keeps the original action definition in a sibling action named
//! `<name>_<suffix>` for the lifetime of a session. The backup lives on the
//! platform, so a crashed session can be recovered from any machine.

use std::sync::Arc;

use actionbridge_client::protocol::MARKER_ANNOTATION;
use actionbridge_client::{ActionDefinition, ActionRef, ClientError, PlatformClient};
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};
use crate::session::Session;

/// Outcome of [`ActionStateGuard::backup`].
#[derive(Debug, Clone)]
pub struct Backup {
    /// The original definition.
    pub original: ActionDefinition,
    /// Whether an existing backup was kept instead of writing a new one.
    ///
    /// Set when the live action already carried the marker annotation.
    pub reused: bool,
}

/// Backs up and restores the remote action around a session.
pub struct ActionStateGuard {
    platform: Arc<dyn PlatformClient>,
    action: ActionRef,
    backup: ActionRef,
}

impl ActionStateGuard {
    /// Create a guard for `action` with backups stored as `<name>_<suffix>`.
    pub fn new(platform: Arc<dyn PlatformClient>, action: ActionRef, suffix: &str) -> Self {
        let backup = action.with_suffix(suffix);
        Self {
            platform,
            action,
            backup,
        }
    }

    /// Create a guard from a session context.
    pub fn from_session(session: &Session) -> Self {
        Self::new(
            session.platform.clone(),
            session.action.clone(),
            &session.config.backup_suffix,
        )
    }

    /// The guarded action.
    pub fn action(&self) -> &ActionRef {
        &self.action
    }

    /// Where the backup is stored.
    pub fn backup_ref(&self) -> &ActionRef {
        &self.backup
    }

    /// Capture the current definition under the backup name.
    ///
    /// A stale backup is overwritten, unless the live action still carries the
    /// agent marker: then the live code is the agent and the existing backup is
    /// the only copy of the original, so it is kept.
    pub async fn backup(&self) -> Result<Backup> {
        let live = self.platform.get_action(&self.action).await.map_err(|e| {
            if e.is_not_found() {
                BridgeError::remote_state(&self.action, "action does not exist")
            } else {
                BridgeError::remote_state(&self.action, e.to_string())
            }
        })?;

        if live.has_annotation_true(MARKER_ANNOTATION) {
            return match self.platform.get_action(&self.backup).await {
                Ok(original) => {
                    warn!(
                        action = %self.action,
                        backup = %self.backup,
                        "Action already carries the agent; keeping existing backup"
                    );
                    Ok(Backup {
                        original,
                        reused: true,
                    })
                }
                Err(e) if e.is_not_found() => Err(BridgeError::remote_state(
                    &self.action,
                    format!(
                        "action carries the agent marker but no backup exists at {}",
                        self.backup
                    ),
                )),
                Err(e) => Err(BridgeError::remote_state(&self.backup, e.to_string())),
            };
        }

        self.platform
            .update_action(&self.backup, &live)
            .await
            .map_err(|e| BridgeError::remote_state(&self.backup, e.to_string()))?;

        info!(
            action = %self.action,
            backup = %self.backup,
            kind = %live.kind(),
            "Backed up action"
        );

        Ok(Backup {
            original: live,
            reused: false,
        })
    }

    /// Whether a backup currently exists.
    pub async fn has_backup(&self) -> Result<bool> {
        match self.platform.get_action(&self.backup).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the backup back as the live action and delete the backup.
    ///
    /// Fails with [`BridgeError::RestoreConflict`] without touching anything
    /// when no backup exists.
    pub async fn restore(&self) -> Result<ActionDefinition> {
        let original = match self.platform.get_action(&self.backup).await {
            Ok(original) => original,
            Err(e) if e.is_not_found() => {
                return Err(BridgeError::RestoreConflict(self.action.to_string()));
            }
            Err(e) => return Err(BridgeError::remote_state(&self.backup, e.to_string())),
        };

        self.platform
            .update_action(&self.action, &original)
            .await
            .map_err(|e| BridgeError::remote_state(&self.action, e.to_string()))?;
        debug!(action = %self.action, "Original definition written back");

        match self.platform.delete_action(&self.backup).await {
            Ok(()) => {}
            // Already gone (concurrent restore): the live action is restored either way.
            Err(ClientError::NotFound(_)) => {}
            Err(e) => return Err(BridgeError::remote_state(&self.backup, e.to_string())),
        }

        info!(action = %self.action, "Restored original action");
        Ok(original)
    }
}
