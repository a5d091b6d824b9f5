// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for actionbridge.
//!
//! Tunables are read from `ACTIONBRIDGE_*` environment variables; the CLI
//! overrides the session-specific fields afterwards.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde_json::Value;

/// Default backup name suffix (`<name>_actionbridge_backup`).
pub const DEFAULT_BACKUP_SUFFIX: &str = "actionbridge_backup";

/// What to do when the watched source changes.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeAction {
    /// Invoke the action through the platform (non-blocking) with these parameters.
    Invoke(Value),
    /// Run the parameters directly in the local executor.
    RunLocal(Value),
    /// Restart the local executor.
    Restart,
}

/// Poll/complete channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Extra attempts for a failed completion before the session fails.
    pub complete_retries: u32,
    /// Delay between completion attempts.
    pub complete_retry_delay: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            complete_retries: 3,
            complete_retry_delay: Duration::from_millis(500),
        }
    }
}

/// Agent stub installation configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Runtime kind the agent is installed with.
    pub kind: String,
    /// Per-container concurrency; the agent keeps its queue in container memory.
    pub concurrency: u64,
    /// Platform timeout of the agent action in milliseconds (bounds one long poll).
    pub timeout_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            kind: "nodejs:default".to_string(),
            concurrency: 200,
            timeout_ms: 300_000,
        }
    }
}

/// Debug session configuration.
#[derive(Debug, Clone)]
pub struct DebugConfig {
    /// Local source file or directory. `None` runs the deployed code locally.
    pub source: Option<PathBuf>,
    /// Entry file relative to `source` when it is a directory.
    pub entry: Option<String>,
    /// Present the source as a require-style package.
    pub packaged: bool,
    /// Host port for the debugger protocol. `None` uses the runtime's default.
    pub debug_port: Option<u16>,
    /// Container image override.
    pub image: Option<String>,
    /// Take over an action that already carries the marker annotation.
    pub force: bool,
    /// Suffix of the backup action name.
    pub backup_suffix: String,
    /// Local execution budget; raised to at least the action's own timeout.
    pub execution_timeout: Option<Duration>,
    /// How long `stop` waits for an in-flight execution.
    pub stop_grace: Duration,
    /// Reaction to source changes.
    pub on_change: Option<ChangeAction>,
    /// Shell command run before the change reaction.
    pub build_command: Option<String>,
    /// Debounce window for source change events.
    pub debounce: Duration,
    /// Channel settings.
    pub channel: ChannelConfig,
    /// Agent settings.
    pub agent: AgentConfig,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            source: None,
            entry: None,
            packaged: false,
            debug_port: None,
            image: None,
            force: false,
            backup_suffix: DEFAULT_BACKUP_SUFFIX.to_string(),
            execution_timeout: None,
            stop_grace: Duration::from_secs(10),
            on_change: None,
            build_command: None,
            debounce: Duration::from_millis(300),
            channel: ChannelConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

impl DebugConfig {
    /// Load tunables from environment variables.
    ///
    /// - `ACTIONBRIDGE_BACKUP_SUFFIX` (default: `actionbridge_backup`)
    /// - `ACTIONBRIDGE_EXECUTION_TIMEOUT_MS` (default: unset)
    /// - `ACTIONBRIDGE_STOP_GRACE_MS` (default: 10000)
    /// - `ACTIONBRIDGE_DEBOUNCE_MS` (default: 300)
    /// - `ACTIONBRIDGE_COMPLETE_RETRIES` (default: 3)
    /// - `ACTIONBRIDGE_AGENT_CONCURRENCY` (default: 200)
    /// - `ACTIONBRIDGE_AGENT_TIMEOUT_MS` (default: 300000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let backup_suffix = std::env::var("ACTIONBRIDGE_BACKUP_SUFFIX")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.backup_suffix);

        let execution_timeout = match std::env::var("ACTIONBRIDGE_EXECUTION_TIMEOUT_MS") {
            Ok(raw) => Some(Duration::from_millis(parse_value(
                "ACTIONBRIDGE_EXECUTION_TIMEOUT_MS",
                &raw,
            )?)),
            Err(_) => None,
        };

        Ok(Self {
            backup_suffix,
            execution_timeout,
            stop_grace: Duration::from_millis(env_or("ACTIONBRIDGE_STOP_GRACE_MS", 10_000)?),
            debounce: Duration::from_millis(env_or("ACTIONBRIDGE_DEBOUNCE_MS", 300)?),
            channel: ChannelConfig {
                complete_retries: env_or(
                    "ACTIONBRIDGE_COMPLETE_RETRIES",
                    defaults.channel.complete_retries,
                )?,
                ..defaults.channel
            },
            agent: AgentConfig {
                concurrency: env_or("ACTIONBRIDGE_AGENT_CONCURRENCY", defaults.agent.concurrency)?,
                timeout_ms: env_or("ACTIONBRIDGE_AGENT_TIMEOUT_MS", defaults.agent.timeout_ms)?,
                ..defaults.agent
            },
            ..defaults
        })
    }

    /// Set the local source path.
    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set the entry file.
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    /// Enable the require-style package layout.
    pub fn with_packaged(mut self, packaged: bool) -> Self {
        self.packaged = packaged;
        self
    }

    /// Set the host debug port.
    pub fn with_debug_port(mut self, port: u16) -> Self {
        self.debug_port = Some(port);
        self
    }

    /// Set the container image override.
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Allow taking over an action that is already under debug.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Set the local execution budget.
    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = Some(timeout);
        self
    }

    /// Set the stop grace period.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Set the source change reaction.
    pub fn with_on_change(mut self, action: ChangeAction) -> Self {
        self.on_change = Some(action);
        self
    }

    /// Set the build command run before the change reaction.
    pub fn with_build_command(mut self, command: impl Into<String>) -> Self {
        self.build_command = Some(command.into());
        self
    }

    /// Set the debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the channel configuration.
    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable holds a value that does not parse.
    #[error("Invalid value for {var}: {value}")]
    InvalidValue {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },
}

fn env_or<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => parse_value(var, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: raw.to_string(),
    })
}
