// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Actionbridge - Local Debugging for Serverless Actions
//!
//! This crate lets a developer debug a deployed action on their own machine.
//! The deployed code is swapped for a small polling agent; every invocation
//! the platform receives is pulled down by the bridge, run in a local
//! container with the developer's source mounted and a debugger port open,
//! and the result is posted back so the original caller gets it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   invoke    ┌──────────────────────────────┐
//! │    Caller    │────────────>│  Platform (agent installed)  │
//! └──────────────┘<────────────│  queue ─ poll ─ complete     │
//!                     result   └──────────────────────────────┘
//!                                   ▲ long poll    │ work
//!                                   │ completion   ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                       actionbridge (This Crate)                       │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐   │
//! │  │   Action    │  │   Agent     │  │ Activation  │  │   Change    │   │
//! │  │   Guard     │  │  Installer  │  │  Channel    │  │  Watcher    │   │
//! │  └─────────────┘  └─────────────┘  └─────────────┘  └─────────────┘   │
//! │                              │ one at a time                          │
//! │                              ▼                                        │
//! │                    ┌───────────────────┐                              │
//! │                    │     Executor      │  (container or mock)         │
//! │                    └───────────────────┘                              │
//! └──────────────────────────────────────────────────────────────────────┘
//!                                   │ /init, /run
//!                                   ▼
//!                    ┌─────────────────────────────┐
//!                    │ Local runtime container     │
//!                    │ source at /code, debug port │
//!                    └─────────────────────────────┘
//! ```
//!
//! # Session Lifecycle
//!
//! | Step | Component | Effect |
//! |------|-----------|--------|
//! | Backup | [`ActionStateGuard`] | Copy the live definition to `<name>_actionbridge_backup` |
//! | Install | [`AgentInstaller`] | Replace the code with the polling agent |
//! | Resolve | [`SourceMountResolver`] | Map the local source to `/code` |
//! | Provision | [`Executor`] | Start the runtime and load the code |
//! | Run | [`ActivationChannel`] | Poll, execute, complete |
//! | Stop | [`Debugger::stop`] | Tear down and restore the original action |
//!
//! A session that crashed before restoring can be repaired with
//! [`Debugger::recover`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use actionbridge::{ContainerExecutor, DebugConfig, Debugger, Session};
//! use actionbridge::client::{ActionRef, RestClient};
//!
//! let platform = Arc::new(RestClient::from_env()?);
//! let action = ActionRef::parse("hello", "_")?;
//! let config = DebugConfig::default().with_source("./hello");
//! let session = Session::new(action, platform, config);
//!
//! let debugger = Debugger::new(session, Arc::new(ContainerExecutor::from_env()?));
//! debugger.start().await?;
//! debugger.run().await?;
//! tokio::signal::ctrl_c().await?;
//! debugger.stop().await?;
//! ```

pub mod activation;
pub mod agent;
pub mod channel;
pub mod config;
pub mod debugger;
pub mod error;
pub mod executor;
pub mod guard;
pub mod mount;
pub mod runtimes;
pub mod session;
pub mod watcher;

/// The platform client this crate drives.
pub use actionbridge_client as client;

pub use activation::{Activation, ActivationSource, ActivationState};
pub use agent::AgentInstaller;
pub use channel::{
    ActivationChannel, ActivationHandler, ChannelStatsSnapshot, PollOutcome, ServeExit,
};
pub use config::{AgentConfig, ChangeAction, ChannelConfig, ConfigError, DebugConfig};
pub use debugger::{Debugger, StopReport};
pub use error::{BridgeError, Phase, Result};
pub use executor::{
    ContainerExecutor, ContainerExecutorConfig, ExecutionResult, Executor, ExecutorError,
    MockExecutor, ProvisionOptions,
};
pub use guard::{ActionStateGuard, Backup};
pub use mount::{MountDescriptor, MountLayout, SourceMountResolver};
pub use runtimes::{RuntimeFamily, RuntimeProfile, profile_for};
pub use session::{Session, SessionState};
pub use watcher::{ChangeHandler, ChangeWatcher, WatchError, WatchSignal};
