// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Agent installer.
//!
//! Replaces the action's code with the polling agent (`agent/agent.js`) and
//! tags it with the marker annotation. Uninstalling is the guard's restore.

use std::sync::Arc;

use actionbridge_client::protocol::MARKER_ANNOTATION;
use actionbridge_client::{
    ActionDefinition, ActionExec, ActionLimits, ActionRef, PlatformClient,
};
use serde_json::Value;
use tracing::info;

use crate::config::AgentConfig;
use crate::error::{BridgeError, Result};
use crate::guard::Backup;
use crate::session::Session;

/// Source of the polling agent.
pub const AGENT_CODE: &str = include_str!("../agent/agent.js");

/// Installs the polling agent over an action.
pub struct AgentInstaller {
    platform: Arc<dyn PlatformClient>,
    action: ActionRef,
    config: AgentConfig,
}

impl AgentInstaller {
    /// Create an installer.
    pub fn new(platform: Arc<dyn PlatformClient>, action: ActionRef, config: AgentConfig) -> Self {
        Self {
            platform,
            action,
            config,
        }
    }

    /// Create an installer from a session context.
    pub fn from_session(session: &Session) -> Self {
        Self::new(
            session.platform.clone(),
            session.action.clone(),
            session.config.agent.clone(),
        )
    }

    /// Whether a definition is an installed agent.
    pub fn is_installed(definition: &ActionDefinition) -> bool {
        definition.has_annotation_true(MARKER_ANNOTATION)
    }

    /// Refuse actions the agent cannot stand in for.
    pub fn check_supported(action: &ActionRef, definition: &ActionDefinition) -> Result<()> {
        let reason = match definition.kind() {
            "sequence" => Some("sequences have no code of their own"),
            "blackbox" => Some("blackbox (docker image) actions are not supported"),
            _ if definition.exec.image.is_some() => {
                Some("actions with a custom image are not supported")
            }
            _ => None,
        };

        match reason {
            Some(reason) => Err(BridgeError::UnsupportedAction {
                action: action.to_string(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// The agent definition standing in for `original`.
    ///
    /// Default parameters are kept so forwarded activations still see them.
    pub fn agent_definition(&self, original: &ActionDefinition) -> ActionDefinition {
        let mut agent = ActionDefinition {
            exec: ActionExec {
                kind: self.config.kind.clone(),
                code: Some(AGENT_CODE.to_string()),
                main: Some("main".to_string()),
                ..Default::default()
            },
            parameters: original.parameters.clone(),
            annotations: original.annotations.clone(),
            limits: ActionLimits {
                timeout: Some(self.config.timeout_ms),
                memory: original.limits.memory,
                logs: original.limits.logs,
                concurrency: Some(self.config.concurrency),
            },
            publish: original.publish,
            ..Default::default()
        };
        // The runtime kind annotation of the original would be wrong for the agent.
        agent.remove_annotation("exec");
        agent.set_annotation(MARKER_ANNOTATION, Value::Bool(true));
        agent
    }

    /// Overwrite the live action with the agent.
    ///
    /// Fails with [`BridgeError::InstallConflict`] when the backup had to be
    /// reused (the action is already agent-installed) unless `force` is set.
    pub async fn install(&self, backup: &Backup, force: bool) -> Result<ActionDefinition> {
        if backup.reused && !force {
            return Err(BridgeError::InstallConflict(self.action.to_string()));
        }
        Self::check_supported(&self.action, &backup.original)?;

        let agent = self.agent_definition(&backup.original);
        let installed = self
            .platform
            .update_action(&self.action, &agent)
            .await
            .map_err(|e| BridgeError::remote_state(&self.action, e.to_string()))?;

        info!(
            action = %self.action,
            kind = %agent.kind(),
            forced = backup.reused,
            "Installed agent"
        );
        Ok(installed)
    }
}
