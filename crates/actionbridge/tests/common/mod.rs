// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for actionbridge tests.
//!
//! Provides an in-memory platform with a deployed action, temporary source
//! trees and session builders.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use actionbridge::client::{ActionDefinition, ActionRef, MockPlatform, PlatformClient};
use actionbridge::{ChannelConfig, DebugConfig, Session, SessionState};
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::watch;

/// Code of the deployed action in every fixture.
pub const DEPLOYED_CODE: &str = "function main(params) { return { remote: true }; }";

/// The deployed action before any session touches it.
pub fn deployed_definition() -> ActionDefinition {
    let mut definition = ActionDefinition::new("nodejs:20", DEPLOYED_CODE)
        .with_parameter("greeting", json!("hello"));
    definition.exec.main = Some("main".to_string());
    definition.set_annotation("exec", json!("nodejs:20"));
    definition.set_annotation("web-export", json!(true));
    definition.limits.timeout = Some(60_000);
    definition.limits.memory = Some(256);
    definition.version = Some("0.0.1".to_string());
    definition
}

/// Test context: a mock platform with `guest/hello` deployed.
pub struct TestContext {
    pub platform: Arc<MockPlatform>,
    pub action: ActionRef,
    pub original: ActionDefinition,
}

impl TestContext {
    pub async fn new() -> Self {
        let platform = Arc::new(MockPlatform::new().with_poll_window(Duration::from_millis(30)));
        let action = ActionRef::new("guest", "hello");
        let original = deployed_definition();
        platform.insert_action(&action, original.clone()).await;
        platform
            .set_remote_result(&action, json!({"remote": true}))
            .await;

        Self {
            platform,
            action,
            original,
        }
    }

    /// A session over the fixture action.
    pub fn session(&self, config: DebugConfig) -> Session {
        let platform: Arc<dyn PlatformClient> = self.platform.clone();
        Session::new(self.action.clone(), platform, config)
    }

    /// Config tuned for fast tests.
    pub fn config(&self) -> DebugConfig {
        DebugConfig::default()
            .with_stop_grace(Duration::from_secs(2))
            .with_channel(ChannelConfig {
                complete_retries: 2,
                complete_retry_delay: Duration::from_millis(10),
            })
    }

    /// Live definition of the fixture action.
    pub async fn live(&self) -> Option<ActionDefinition> {
        self.platform.action(&self.action).await
    }

    /// Backup definition of the fixture action, if any.
    pub async fn backup(&self) -> Option<ActionDefinition> {
        self.platform
            .action(&self.action.with_suffix(actionbridge::config::DEFAULT_BACKUP_SUFFIX))
            .await
    }
}

/// A temporary node source tree with `index.js` at the root.
pub fn flat_source() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "index.js", "exports.main = (p) => p;");
    dir
}

/// Write `contents` to `root/relative`, creating parent directories.
pub fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

/// Wait until `rx` reports `state`.
pub async fn wait_for_state(rx: &mut watch::Receiver<SessionState>, state: SessionState) {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed");
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
