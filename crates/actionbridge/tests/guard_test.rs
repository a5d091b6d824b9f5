// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for backup/restore and agent installation against the mock platform.

mod common;

use std::sync::Arc;

use actionbridge::client::protocol::MARKER_ANNOTATION;
use actionbridge::client::{ActionDefinition, ActionRef, PlatformCall, PlatformClient};
use actionbridge::{ActionStateGuard, AgentConfig, AgentInstaller, BridgeError};
use common::TestContext;
use serde_json::json;

fn guard(ctx: &TestContext) -> ActionStateGuard {
    let platform: Arc<dyn PlatformClient> = ctx.platform.clone();
    ActionStateGuard::new(platform, ctx.action.clone(), "actionbridge_backup")
}

fn installer(ctx: &TestContext) -> AgentInstaller {
    let platform: Arc<dyn PlatformClient> = ctx.platform.clone();
    AgentInstaller::new(platform, ctx.action.clone(), AgentConfig::default())
}

// ============================================================================
// Backup Tests
// ============================================================================

#[tokio::test]
async fn test_backup_copies_live_definition() {
    let ctx = TestContext::new().await;
    let guard = guard(&ctx);

    let backup = guard.backup().await.unwrap();

    assert!(!backup.reused);
    assert_eq!(backup.original, ctx.original);
    assert_eq!(guard.backup_ref().name, "hello_actionbridge_backup");
    assert_eq!(ctx.backup().await, Some(ctx.original.clone()));
    assert!(guard.has_backup().await.unwrap());
}

#[tokio::test]
async fn test_backup_overwrites_stale_backup() {
    let ctx = TestContext::new().await;
    let guard = guard(&ctx);
    ctx.platform
        .insert_action(
            guard.backup_ref(),
            ActionDefinition::new("nodejs:20", "stale"),
        )
        .await;

    guard.backup().await.unwrap();

    assert_eq!(ctx.backup().await, Some(ctx.original.clone()));
}

#[tokio::test]
async fn test_backup_missing_action() {
    let ctx = TestContext::new().await;
    let platform: Arc<dyn PlatformClient> = ctx.platform.clone();
    let guard = ActionStateGuard::new(platform, ActionRef::new("guest", "absent"), "bk");

    let err = guard.backup().await.unwrap_err();
    assert!(matches!(err, BridgeError::RemoteState { .. }));
    assert!(err.to_string().contains("does not exist"));
}

#[tokio::test]
async fn test_backup_reuses_existing_when_marker_present() {
    let ctx = TestContext::new().await;
    let guard = guard(&ctx);
    guard.backup().await.unwrap();

    // Simulate a crashed session: agent live, backup holds the original.
    let mut agent = ctx.original.clone();
    agent.set_annotation(MARKER_ANNOTATION, json!(true));
    ctx.platform.insert_action(&ctx.action, agent).await;

    let backup = guard.backup().await.unwrap();
    assert!(backup.reused);
    assert_eq!(backup.original, ctx.original);
}

#[tokio::test]
async fn test_backup_marker_without_backup_is_remote_state_error() {
    let ctx = TestContext::new().await;
    let mut agent = ctx.original.clone();
    agent.set_annotation(MARKER_ANNOTATION, json!(true));
    ctx.platform.insert_action(&ctx.action, agent).await;

    let err = guard(&ctx).backup().await.unwrap_err();
    assert!(matches!(err, BridgeError::RemoteState { .. }));
    assert!(err.to_string().contains("no backup exists"));
}

// ============================================================================
// Restore Tests
// ============================================================================

#[tokio::test]
async fn test_restore_is_byte_identical_and_deletes_backup() {
    let ctx = TestContext::new().await;
    let guard = guard(&ctx);
    let backup = guard.backup().await.unwrap();
    installer(&ctx).install(&backup, false).await.unwrap();
    assert!(ctx.live().await.unwrap().has_annotation_true(MARKER_ANNOTATION));

    let restored = guard.restore().await.unwrap();

    let live = ctx.live().await.unwrap();
    assert_eq!(live, ctx.original);
    assert!(live.same_content(&restored));
    assert_eq!(ctx.backup().await, None);
    assert!(!guard.has_backup().await.unwrap());
}

#[tokio::test]
async fn test_restore_without_backup_conflicts_without_mutation() {
    let ctx = TestContext::new().await;
    let guard = guard(&ctx);

    let err = guard.restore().await.unwrap_err();

    assert!(err.is_restore_conflict());
    assert_eq!(ctx.live().await, Some(ctx.original.clone()));
    let calls = ctx.platform.calls().await;
    assert!(calls.iter().all(|c| !c.is_mutation()), "calls: {calls:?}");
}

#[tokio::test]
async fn test_restore_twice_second_conflicts() {
    let ctx = TestContext::new().await;
    let guard = guard(&ctx);
    guard.backup().await.unwrap();

    guard.restore().await.unwrap();
    ctx.platform.clear_calls().await;
    let err = guard.restore().await.unwrap_err();

    assert!(err.is_restore_conflict());
    assert_eq!(ctx.platform.calls().await.len(), 1);
}

// ============================================================================
// Install Tests
// ============================================================================

#[tokio::test]
async fn test_install_replaces_code_and_keeps_parameters() {
    let ctx = TestContext::new().await;
    let backup = guard(&ctx).backup().await.unwrap();

    installer(&ctx).install(&backup, false).await.unwrap();

    let live = ctx.live().await.unwrap();
    assert!(AgentInstaller::is_installed(&live));
    assert_eq!(live.kind(), "nodejs:default");
    assert_ne!(live.exec.code, ctx.original.exec.code);
    assert_eq!(live.parameters, ctx.original.parameters);
    assert_eq!(live.annotation("web-export"), Some(&json!(true)));
    assert_eq!(live.annotation("exec"), None);
    assert_eq!(live.limits.timeout, Some(300_000));
    assert_eq!(live.limits.concurrency, Some(200));
    assert_eq!(live.limits.memory, Some(256));
}

#[tokio::test]
async fn test_install_conflict_on_reused_backup() {
    let ctx = TestContext::new().await;
    let guard = guard(&ctx);
    let backup = guard.backup().await.unwrap();
    installer(&ctx).install(&backup, false).await.unwrap();

    let reused = guard.backup().await.unwrap();
    assert!(reused.reused);
    ctx.platform.clear_calls().await;

    let err = installer(&ctx).install(&reused, false).await.unwrap_err();
    assert!(matches!(err, BridgeError::InstallConflict(_)));
    assert!(ctx.platform.calls().await.is_empty());

    installer(&ctx).install(&reused, true).await.unwrap();
    let updates = ctx
        .platform
        .calls()
        .await
        .into_iter()
        .filter(|c| matches!(c, PlatformCall::Update(..)))
        .count();
    assert_eq!(updates, 1);
}

#[tokio::test]
async fn test_install_rejects_sequence() {
    let ctx = TestContext::new().await;
    let mut sequence = ActionDefinition::new("sequence", "");
    sequence.exec.code = None;
    sequence.exec.components = Some(vec!["/guest/a".into(), "/guest/b".into()]);
    ctx.platform.insert_action(&ctx.action, sequence).await;

    let backup = guard(&ctx).backup().await.unwrap();
    let err = installer(&ctx).install(&backup, false).await.unwrap_err();

    assert!(matches!(err, BridgeError::UnsupportedAction { .. }));
    assert_eq!(ctx.live().await.unwrap().kind(), "sequence");
}
