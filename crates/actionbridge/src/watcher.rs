// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Change watcher.
//!
//! Observes the mounted source and fires the configured [`ChangeAction`]
//! once per burst of file events. Watch failures disable the watcher; they
//! never end the session.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ChangeAction;

/// Errors from setting up a watch.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The notification backend failed.
    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),

    /// The path to watch does not exist.
    #[error("Path does not exist: {0}")]
    PathMissing(PathBuf),
}

/// Raw signal from the notification backend.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchSignal {
    /// Files were created, modified or removed.
    Changed(Vec<PathBuf>),
    /// The backend reported an error.
    Failed(String),
}

/// Reacts to debounced source changes.
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    /// Perform `action`.
    async fn on_change(&self, action: &ChangeAction) -> crate::error::Result<()>;
}

/// Debounced stream of source changes.
pub struct ChangeWatcher {
    rx: mpsc::Receiver<WatchSignal>,
    root: Option<PathBuf>,
    debounce: Duration,
    _watcher: Option<RecommendedWatcher>,
}

impl ChangeWatcher {
    /// Watch `root` recursively.
    pub fn watch(root: &Path, debounce: Duration) -> Result<Self, WatchError> {
        if !root.exists() {
            return Err(WatchError::PathMissing(root.to_path_buf()));
        }

        let (tx, rx) = mpsc::channel(64);
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if matches!(
                        event.kind,
                        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                    ) {
                        let _ = tx.try_send(WatchSignal::Changed(event.paths));
                    }
                }
                Err(err) => {
                    let _ = tx.try_send(WatchSignal::Failed(err.to_string()));
                }
            },
            notify::Config::default(),
        )?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        debug!(root = %root.display(), "File watch registered");

        Ok(Self {
            rx,
            root: Some(root.to_path_buf()),
            debounce,
            _watcher: Some(watcher),
        })
    }

    /// Build a watcher fed from an arbitrary signal stream.
    pub fn from_events(rx: mpsc::Receiver<WatchSignal>, debounce: Duration) -> Self {
        Self {
            rx,
            root: None,
            debounce,
            _watcher: None,
        }
    }

    /// Watched directory, if backed by the file system.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Wait for the next burst of changes.
    ///
    /// Events arriving within the debounce window of each other collapse into
    /// one. Returns `None` once cancelled or disabled.
    pub async fn next_change(&mut self, cancel: &CancellationToken) -> Option<Vec<PathBuf>> {
        let mut paths = loop {
            let signal = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                signal = self.rx.recv() => signal?,
            };
            match signal {
                WatchSignal::Changed(paths) => {
                    let relevant: Vec<PathBuf> =
                        paths.into_iter().filter(|p| !is_ignored(p)).collect();
                    if !relevant.is_empty() {
                        break relevant;
                    }
                }
                WatchSignal::Failed(message) => {
                    warn!(error = %message, "File watcher failed; disabling it");
                    return None;
                }
            }
        };

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(self.debounce) => break,
                signal = self.rx.recv() => match signal {
                    Some(WatchSignal::Changed(more)) => {
                        paths.extend(more.into_iter().filter(|p| !is_ignored(p)));
                    }
                    Some(WatchSignal::Failed(message)) => {
                        warn!(error = %message, "File watcher failed; disabling it");
                        return None;
                    }
                    None => break,
                },
            }
        }

        if let Some(root) = &self.root
            && !root.exists()
        {
            warn!(root = %root.display(), "Watched path was removed; disabling watcher");
            return None;
        }

        paths.sort();
        paths.dedup();
        Some(paths)
    }

    /// Drop signals queued while the handler was busy.
    fn drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }

    /// React to changes until cancelled or disabled.
    pub async fn run(
        mut self,
        action: ChangeAction,
        build_command: Option<String>,
        handler: Arc<dyn ChangeHandler>,
        cancel: CancellationToken,
    ) {
        info!(root = ?self.root, action = ?action, "Watching for source changes");

        while let Some(paths) = self.next_change(&cancel).await {
            info!(files = paths.len(), first = ?paths.first(), "Source changed");

            if let Some(command) = &build_command {
                let built = run_build(command, self.root.as_deref()).await;
                // The build itself usually touches watched files.
                self.drain();
                if !built {
                    continue;
                }
            }
            if cancel.is_cancelled() {
                break;
            }

            if let Err(e) = handler.on_change(&action).await {
                warn!(error = %e, "Change action failed");
            }
        }

        debug!("Change watcher stopped");
    }
}

fn is_ignored(path: &Path) -> bool {
    path.components().any(|c| match c {
        Component::Normal(part) => part == ".git" || part == "node_modules",
        _ => false,
    })
}

/// Run a build command through `sh -c`. Returns whether it succeeded.
pub async fn run_build(command: &str, dir: Option<&Path>) -> bool {
    info!(command, "Running build command");
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }

    match cmd.status().await {
        Ok(status) if status.success() => true,
        Ok(status) => {
            warn!(command, status = %status, "Build failed; skipping change action");
            false
        }
        Err(e) => {
            warn!(command, error = %e, "Build could not be started; skipping change action");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignored_paths() {
        assert!(is_ignored(Path::new("/src/node_modules/x/index.js")));
        assert!(is_ignored(Path::new("/src/.git/HEAD")));
        assert!(!is_ignored(Path::new("/src/lib/index.js")));
    }

    #[tokio::test]
    async fn test_run_build() {
        assert!(run_build("true", None).await);
        assert!(!run_build("exit 3", None).await);
    }
}
