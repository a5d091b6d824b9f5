// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Actionbridge - Local Debugging for Serverless Actions
//!
//! Swaps a deployed action for a polling agent, runs every activation in a
//! local container with a debugger attached, and restores the action on exit.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use serde_json::Value;
use tracing::{error, info, warn};

use actionbridge::client::{ActionRef, PlatformClient, RestClient};
use actionbridge::{
    ChangeAction, ContainerExecutor, DebugConfig, Debugger, Phase, Session, SessionState,
};

#[derive(Parser)]
#[command(name = "actionbridge")]
#[command(about = "Debug a deployed action locally by forwarding its activations")]
#[command(version)]
struct Cli {
    /// Action to debug (`name`, `package/name` or `/namespace/name`)
    action: String,

    /// Local source file or directory to mount instead of the deployed code
    source: Option<PathBuf>,

    /// Host port for the debugger protocol (default: the runtime's port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Entry file, relative to the source directory
    #[arg(long)]
    entry: Option<String>,

    /// Treat the source as a packaged (dependency-bundling) project
    #[arg(long)]
    packaged: bool,

    /// On source change, invoke the action through the platform with these JSON parameters
    #[arg(long, value_name = "JSON", value_parser = parse_json, group = "on_change")]
    on_change_invoke: Option<Value>,

    /// On source change, run the action locally with these JSON parameters
    #[arg(long, value_name = "JSON", value_parser = parse_json, group = "on_change")]
    on_change_run: Option<Value>,

    /// On source change, restart the local runtime
    #[arg(long, group = "on_change")]
    on_change_restart: bool,

    /// Shell command to run after a change, before the change action
    #[arg(long, value_name = "COMMAND")]
    on_build: Option<String>,

    /// Take over an action another session left agent-installed
    #[arg(long)]
    force: bool,

    /// Container image to run instead of the runtime's default
    #[arg(long, env = "ACTIONBRIDGE_IMAGE")]
    image: Option<String>,

    /// Restore the action from its backup and exit
    #[arg(long)]
    cleanup: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {}", e))
}

impl Cli {
    fn change_action(&self) -> Option<ChangeAction> {
        if let Some(params) = &self.on_change_invoke {
            Some(ChangeAction::Invoke(params.clone()))
        } else if let Some(params) = &self.on_change_run {
            Some(ChangeAction::RunLocal(params.clone()))
        } else if self.on_change_restart {
            Some(ChangeAction::Restart)
        } else {
            None
        }
    }

    fn debug_config(&self) -> anyhow::Result<DebugConfig> {
        let mut config = DebugConfig::from_env()?
            .with_packaged(self.packaged)
            .with_force(self.force);

        if let Some(source) = &self.source {
            config = config.with_source(source);
        }
        if let Some(entry) = &self.entry {
            config = config.with_entry(entry);
        }
        if let Some(port) = self.port {
            config = config.with_debug_port(port);
        }
        if let Some(image) = &self.image {
            config = config.with_image(image);
        }
        if let Some(action) = self.change_action() {
            config = config.with_on_change(action);
        }
        if let Some(command) = &self.on_build {
            config = config.with_build_command(command);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose {
        "actionbridge=debug,actionbridge_client=debug"
    } else {
        "actionbridge=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    let client = RestClient::from_env().context("platform credentials")?;
    let action = ActionRef::parse(&cli.action, &client.config().namespace)?;
    let platform: Arc<dyn PlatformClient> = Arc::new(client);
    let session = Session::new(action, platform, cli.debug_config()?);

    if cli.cleanup {
        let restored = Debugger::recover(&session).await?;
        info!(action = %session.action, kind = restored.kind(), "Action restored from backup");
        return Ok(());
    }

    let executor = Arc::new(ContainerExecutor::from_env()?);
    let debugger = Debugger::new(session, executor);

    debugger
        .start()
        .await
        .with_context(|| format!("{} phase failed", Phase::Start))?;
    debugger.run().await?;

    info!(
        action = %debugger.session().action,
        "Forwarding activations; press Ctrl+C to stop"
    );

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received");
            Ok(())
        }
        result = debugger.wait() => result,
    };

    let report = debugger
        .stop()
        .await
        .with_context(|| format!("{} phase failed", Phase::Stop))?;
    for warning in &report.warnings {
        warn!("{}", warning);
    }

    let stats = debugger.stats();
    info!(
        forwarded = stats.forwarded,
        completed = stats.completed,
        restored = report.restored,
        "Actionbridge shut down"
    );

    if let Err(e) = outcome {
        error!(error = %e, "Session failed");
        return Err(e.into());
    }
    if report.final_state == SessionState::Failed {
        bail!("session ended in failed state");
    }

    Ok(())
}
