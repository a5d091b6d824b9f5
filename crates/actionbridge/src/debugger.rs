// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Debugger: the session lifecycle.
//!
//! ```text
//! Idle ──start──> Starting ──ok──> Running ──stop──> Stopping ──> Stopped
//!                    │                 │                 │
//!                    └──err (rolled    └──loop error ────┴──> Failed
//!                        back)──> Failed   (stop runs automatically)
//! ```
//!
//! `start` backs up the action, installs the agent, resolves the source
//! mount and provisions the executor, rolling back whatever succeeded if a
//! step fails. `run` spawns the poll loop and the change watcher. `stop`
//! cancels both, tears the executor down and restores the action.
//!
//! The poll loop, the change watcher's local runs and executor restarts all
//! take the same single execution slot, so user code never runs twice at once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use actionbridge_client::ActionDefinition;
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{Mutex, Semaphore, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::activation::{Activation, ActivationState};
use crate::agent::AgentInstaller;
use crate::channel::{ActivationChannel, ActivationHandler, ChannelStatsSnapshot, ServeExit};
use crate::config::ChangeAction;
use crate::error::{BridgeError, Phase, Result};
use crate::executor::{Executor, ProvisionOptions};
use crate::guard::ActionStateGuard;
use crate::mount::{MountDescriptor, SourceMountResolver};
use crate::runtimes;
use crate::session::{Session, SessionState};
use crate::watcher::{ChangeHandler, ChangeWatcher};

/// What `stop` did.
#[derive(Debug, Clone, PartialEq)]
pub struct StopReport {
    /// Whether the original action was written back.
    pub restored: bool,
    /// Problems that did not prevent stopping (e.g. missing backup).
    pub warnings: Vec<String>,
    /// State the session ended in.
    pub final_state: SessionState,
}

#[derive(Default)]
struct RunState {
    owns_backup: bool,
    provisioned: bool,
    started: bool,
    original: Option<ActionDefinition>,
    mount: Option<MountDescriptor>,
    watcher: Option<ChangeWatcher>,
    loop_task: Option<JoinHandle<()>>,
    watch_task: Option<JoinHandle<()>>,
}

struct Inner {
    session: Session,
    executor: Arc<dyn Executor>,
    guard: ActionStateGuard,
    installer: AgentInstaller,
    channel: ActivationChannel,
    state: watch::Sender<SessionState>,
    done: watch::Sender<bool>,
    slot: Semaphore,
    cancel: CancellationToken,
    budget: OnceLock<Option<Duration>>,
    failure: Mutex<Option<String>>,
    superseded: AtomicBool,
    run: Mutex<RunState>,
}

/// A debug session over one action.
pub struct Debugger {
    inner: Arc<Inner>,
}

impl Debugger {
    /// Create a debugger; the change watcher (if configured) watches the
    /// resolved source mount.
    pub fn new(session: Session, executor: Arc<dyn Executor>) -> Self {
        Self::build(session, executor, None)
    }

    /// Create a debugger whose change watcher is fed by `watcher`.
    pub fn with_watcher(
        session: Session,
        executor: Arc<dyn Executor>,
        watcher: ChangeWatcher,
    ) -> Self {
        Self::build(session, executor, Some(watcher))
    }

    fn build(session: Session, executor: Arc<dyn Executor>, watcher: Option<ChangeWatcher>) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        let (done, _) = watch::channel(false);

        let inner = Inner {
            guard: ActionStateGuard::from_session(&session),
            installer: AgentInstaller::from_session(&session),
            channel: ActivationChannel::from_session(&session),
            session,
            executor,
            state,
            done,
            slot: Semaphore::new(1),
            cancel: CancellationToken::new(),
            budget: OnceLock::new(),
            failure: Mutex::new(None),
            superseded: AtomicBool::new(false),
            run: Mutex::new(RunState {
                watcher,
                ..Default::default()
            }),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Restore an action left agent-installed by a crashed session.
    pub async fn recover(session: &Session) -> Result<ActionDefinition> {
        let guard = ActionStateGuard::from_session(session);
        info!(
            action = %session.action,
            backup = %guard.backup_ref(),
            "Recovering action from backup"
        );
        guard.restore().await
    }

    /// Session context.
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Poll loop counters.
    pub fn stats(&self) -> ChannelStatsSnapshot {
        self.inner.channel.stats()
    }

    /// Local execution budget in effect, if any.
    pub fn execution_budget(&self) -> Option<Duration> {
        self.inner.budget.get().copied().flatten()
    }

    /// Resolved source mount, once started.
    pub async fn mount(&self) -> Option<MountDescriptor> {
        self.inner.run.lock().await.mount.clone()
    }

    /// The definition captured by the backup, once started.
    pub async fn original(&self) -> Option<ActionDefinition> {
        self.inner.run.lock().await.original.clone()
    }

    /// Back up, install the agent, resolve the mount and provision.
    ///
    /// On failure everything that succeeded is rolled back and the session
    /// ends in `Failed`.
    pub async fn start(&self) -> Result<()> {
        let inner = &self.inner;
        if !inner.transition(SessionState::Idle, SessionState::Starting) {
            return Err(BridgeError::InvalidState(format!(
                "start requires an idle session (state: {})",
                self.state()
            )));
        }

        info!(
            session_id = %inner.session.id,
            action = %inner.session.action,
            "Starting debug session"
        );

        let mut run = inner.run.lock().await;
        match inner.start_steps(&mut run).await {
            Ok(()) => {
                drop(run);
                inner.state.send_replace(SessionState::Running);
                info!(action = %inner.session.action, "Debug session ready");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Start failed; rolling back");
                inner.rollback(&mut run).await;
                drop(run);
                inner.state.send_replace(SessionState::Failed);
                Err(e)
            }
        }
    }

    /// Spawn the poll loop and the change watcher. Returns immediately.
    pub async fn run(&self) -> Result<()> {
        let inner = &self.inner;
        let mut run = inner.run.lock().await;
        if self.state() != SessionState::Running || run.started {
            return Err(BridgeError::InvalidState(format!(
                "run requires a started session that is not yet running (state: {})",
                self.state()
            )));
        }
        run.started = true;

        let loop_inner = inner.clone();
        run.loop_task = Some(tokio::spawn(async move { loop_inner.poll_loop().await }));

        let config = &inner.session.config;
        if let Some(action) = config.on_change.clone() {
            let watcher = match run.watcher.take() {
                Some(watcher) => Some(watcher),
                None => match &run.mount {
                    Some(mount) => match ChangeWatcher::watch(mount.watch_root(), config.debounce) {
                        Ok(watcher) => Some(watcher),
                        Err(e) => {
                            warn!(error = %e, "Could not watch source; continuing without watcher");
                            None
                        }
                    },
                    None => {
                        warn!("No local source to watch; change action disabled");
                        None
                    }
                },
            };

            if let Some(watcher) = watcher {
                let handler: Arc<dyn ChangeHandler> = inner.clone();
                run.watch_task = Some(tokio::spawn(watcher.run(
                    action,
                    config.build_command.clone(),
                    handler,
                    inner.cancel.child_token(),
                )));
            }
        }

        info!(action = %inner.session.action, "Debugger running");
        Ok(())
    }

    /// Cancel the loops, tear down the executor and restore the action.
    ///
    /// Safe to call repeatedly; a no-op once stopped.
    pub async fn stop(&self) -> Result<StopReport> {
        self.inner.stop().await
    }

    /// Wait for the poll loop to end.
    ///
    /// `Err` carries the loop's failure.
    pub async fn wait(&self) -> Result<()> {
        if !self.inner.run.lock().await.started {
            return Err(BridgeError::InvalidState(
                "wait requires a running session".to_string(),
            ));
        }

        let mut done = self.inner.done.subscribe();
        let _ = done.wait_for(|finished| *finished).await;

        match self.inner.failure.lock().await.clone() {
            Some(message) => Err(BridgeError::Failed {
                phase: Phase::Run,
                message,
            }),
            None => Ok(()),
        }
    }
}

impl Inner {
    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    async fn start_steps(&self, run: &mut RunState) -> Result<()> {
        let config = &self.session.config;

        let backup = self.guard.backup().await?;
        run.owns_backup = !backup.reused;
        run.original = Some(backup.original.clone());

        self.installer.install(&backup, config.force).await?;
        // A forced takeover now answers for the existing backup as well.
        run.owns_backup = true;

        let original = &backup.original;
        let profile = runtimes::profile_for(original.kind(), config.image.as_deref())?;
        let mount = match &config.source {
            Some(source) => Some(
                SourceMountResolver::new(config.entry.clone(), config.packaged)
                    .resolve(source, &profile)?,
            ),
            None => None,
        };

        let options = ProvisionOptions {
            session_id: self.session.id.clone(),
            action: self.session.action.clone(),
            debug_port: config.debug_port.unwrap_or(profile.debug_port),
            main: original
                .exec
                .main
                .clone()
                .unwrap_or_else(|| "main".to_string()),
            inline: mount.is_none().then(|| original.exec.clone()),
            mount: mount.clone(),
            action_timeout: original.timeout(),
            profile,
        };

        self.executor.provision(&options).await?;
        run.provisioned = true;
        run.mount = mount;

        let budget = config
            .execution_timeout
            .map(|budget| original.timeout().map_or(budget, |t| budget.max(t)));
        let _ = self.budget.set(budget);

        info!(
            executor = self.executor.executor_type(),
            debug_port = options.debug_port,
            image = %options.profile.image,
            source = ?run.mount.as_ref().map(|m| m.host_path.display().to_string()),
            "Local runtime provisioned"
        );
        Ok(())
    }

    async fn rollback(&self, run: &mut RunState) {
        if run.provisioned {
            if let Err(e) = self.executor.teardown().await {
                warn!(error = %e, "Rollback: executor teardown failed");
            }
            run.provisioned = false;
        }

        if run.owns_backup {
            match self.guard.restore().await {
                Ok(_) => info!("Rollback: original action restored"),
                Err(e) => warn!(error = %e, "Rollback: restore failed"),
            }
            run.owns_backup = false;
        }
    }

    async fn poll_loop(self: Arc<Self>) {
        match self.channel.serve(&self.cancel, self.as_ref()).await {
            Ok(ServeExit::Cancelled) => debug!("Poll loop cancelled"),
            Ok(ServeExit::Stopped) => {
                warn!("Another session took over this action; ending without restoring it");
                self.superseded.store(true, Ordering::SeqCst);
                self.spawn_stop();
            }
            Err(e) => {
                error!(error = %e, "Poll loop failed; stopping session");
                *self.failure.lock().await = Some(e.to_string());
                self.spawn_stop();
            }
        }
        self.done.send_replace(true);
    }

    fn spawn_stop(self: &Arc<Self>) {
        let inner = self.clone();
        tokio::spawn(async move {
            if let Err(e) = inner.stop().await {
                error!(error = %e, "Automatic stop failed");
            }
        });
    }

    async fn stop(&self) -> Result<StopReport> {
        let mut rx = self.state.subscribe();
        let previous = loop {
            let current = *rx.borrow_and_update();
            match current {
                SessionState::Idle => {
                    return Err(BridgeError::InvalidState(
                        "session was never started".to_string(),
                    ));
                }
                SessionState::Stopped => {
                    return Ok(StopReport {
                        restored: false,
                        warnings: Vec::new(),
                        final_state: SessionState::Stopped,
                    });
                }
                SessionState::Starting | SessionState::Stopping => {
                    if rx.changed().await.is_err() {
                        return Err(BridgeError::InvalidState(
                            "session state channel closed".to_string(),
                        ));
                    }
                }
                SessionState::Running | SessionState::Failed => {
                    if self.transition(current, SessionState::Stopping) {
                        break current;
                    }
                }
            }
        };

        info!(action = %self.session.action, "Stopping debug session");
        self.cancel.cancel();

        let (loop_task, watch_task) = {
            let mut run = self.run.lock().await;
            (run.loop_task.take(), run.watch_task.take())
        };
        let grace = self.session.config.stop_grace;
        if let Some(task) = loop_task {
            join_with_grace("poll loop", task, grace).await;
        }
        if let Some(task) = watch_task {
            join_with_grace("change watcher", task, grace).await;
        }
        self.done.send_replace(true);

        let mut failed = previous == SessionState::Failed || self.failure.lock().await.is_some();
        let mut warnings = Vec::new();
        let mut restored = false;
        let mut restore_error = None;

        let mut run = self.run.lock().await;
        if run.provisioned {
            if let Err(e) = self.executor.teardown().await {
                warn!(error = %e, "Executor teardown failed");
                warnings.push(e.to_string());
            }
            run.provisioned = false;
        }

        if run.owns_backup && !self.superseded.load(Ordering::SeqCst) {
            match self.guard.restore().await {
                Ok(_) => {
                    restored = true;
                    run.owns_backup = false;
                }
                Err(e) if e.is_restore_conflict() => {
                    warn!(error = %e, "Action could not be restored");
                    warnings.push(e.to_string());
                    run.owns_backup = false;
                }
                Err(e) => {
                    error!(error = %e, "Restore failed");
                    failed = true;
                    restore_error = Some(e);
                }
            }
        }
        drop(run);

        let final_state = if failed {
            SessionState::Failed
        } else {
            SessionState::Stopped
        };
        self.state.send_replace(final_state);
        info!(state = %final_state, restored, "Debug session ended");

        match restore_error {
            Some(e) => Err(e),
            None => Ok(StopReport {
                restored,
                warnings,
                final_state,
            }),
        }
    }

    async fn execute_in_slot(&self, activation: &mut Activation) -> Result<()> {
        activation.advance(ActivationState::Executing)?;
        let budget = self.budget.get().copied().flatten();

        match self.executor.execute(activation, budget).await {
            Ok(outcome) => {
                info!(
                    activation_id = %activation.id,
                    success = outcome.success,
                    duration_ms = outcome.duration_ms,
                    "Execution finished"
                );
                activation.finish(outcome.result, outcome.success)
            }
            Err(e) => {
                warn!(activation_id = %activation.id, error = %e, "Local execution failed");
                activation.finish(
                    json!({ "error": format!("actionbridge: local execution failed: {}", e) }),
                    false,
                )
            }
        }
    }
}

async fn join_with_grace(name: &str, mut task: JoinHandle<()>, grace: Duration) {
    match tokio::time::timeout(grace, &mut task).await {
        Ok(_) => debug!(task = name, "Task finished"),
        Err(_) => {
            warn!(
                task = name,
                grace_ms = grace.as_millis() as u64,
                "Task did not finish within the grace period; aborting it"
            );
            task.abort();
        }
    }
}

#[async_trait]
impl ActivationHandler for Inner {
    async fn handle(&self, activation: &mut Activation) -> Result<()> {
        let _permit = self
            .slot
            .acquire()
            .await
            .map_err(|_| BridgeError::InvalidState("execution slot closed".to_string()))?;
        self.execute_in_slot(activation).await
    }
}

#[async_trait]
impl ChangeHandler for Inner {
    async fn on_change(&self, action: &ChangeAction) -> Result<()> {
        match action {
            ChangeAction::Invoke(params) => {
                let response = self
                    .session
                    .platform
                    .invoke(&self.session.action, params, false)
                    .await?;
                info!(
                    activation_id = ?response.activation_id,
                    "Triggered invocation after source change"
                );
            }
            ChangeAction::RunLocal(params) => {
                let mut activation = Activation::synthetic(params.clone());
                activation.advance(ActivationState::Dispatched)?;
                self.handle(&mut activation).await?;
                info!(
                    activation_id = %activation.id,
                    result = %activation.result.clone().unwrap_or_default(),
                    "Local run finished"
                );
            }
            ChangeAction::Restart => {
                let _permit = self
                    .slot
                    .acquire()
                    .await
                    .map_err(|_| BridgeError::InvalidState("execution slot closed".to_string()))?;
                self.executor.restart().await?;
                info!("Runtime restarted after source change");
            }
        }
        Ok(())
    }
}
