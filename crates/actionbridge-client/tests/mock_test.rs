// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the in-memory platform's agent emulation.

use std::sync::Arc;
use std::time::Duration;

use actionbridge_client::protocol::{MARKER_ANNOTATION, RETRY_CODE, STOP_CODE};
use actionbridge_client::{ActionDefinition, ActionRef, MockPlatform, PlatformClient};
use serde_json::{Value, json};

async fn platform_with_agent() -> (Arc<MockPlatform>, ActionRef) {
    let platform = Arc::new(MockPlatform::new().with_poll_window(Duration::from_millis(20)));
    let action = ActionRef::new("guest", "hello");
    let mut agent = ActionDefinition::new("nodejs:default", "agent");
    agent.set_annotation(MARKER_ANNOTATION, Value::Bool(true));
    platform.insert_action(&action, agent).await;
    (platform, action)
}

#[tokio::test]
async fn test_blocking_caller_receives_relayed_result() {
    let (platform, action) = platform_with_agent().await;

    let caller = {
        let platform = platform.clone();
        let action = action.clone();
        tokio::spawn(async move { platform.invoke(&action, &json!({"name": "x"}), true).await })
    };

    // Poll until the caller's invocation shows up.
    let work = loop {
        let response = platform
            .invoke(&action, &json!({"$waitForActivation": true}), true)
            .await
            .unwrap();
        if response.status == 200 {
            break response;
        }
        assert_eq!(response.error_code(), Some(RETRY_CODE));
    };

    let result = work.result.unwrap();
    assert_eq!(result["name"], "x");
    let id = result["$activationId"].as_str().unwrap().to_string();

    let ack = platform
        .invoke(&action, &json!({"$activationId": id, "msg": "local"}), true)
        .await
        .unwrap();
    assert_eq!(ack.status, 200);

    let response = caller.await.unwrap().unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.result, Some(json!({"msg": "local"})));
    assert_eq!(platform.result(&id).await, Some(json!({"msg": "local"})));
}

#[tokio::test]
async fn test_relayed_error_result_is_application_error() {
    let (platform, action) = platform_with_agent().await;

    let caller = {
        let platform = platform.clone();
        let action = action.clone();
        tokio::spawn(async move { platform.invoke(&action, &json!({}), true).await })
    };

    let work = loop {
        let response = platform
            .invoke(&action, &json!({"$waitForActivation": true}), true)
            .await
            .unwrap();
        if response.status == 200 {
            break response;
        }
    };
    let id = work.result.unwrap()["$activationId"].clone();

    platform
        .invoke(&action, &json!({"$activationId": id, "error": "boom"}), true)
        .await
        .unwrap();

    let response = caller.await.unwrap().unwrap();
    assert_eq!(response.status, 502);
    assert_eq!(response.error(), Some(&json!("boom")));
}

#[tokio::test]
async fn test_non_blocking_caller_is_accepted_and_queued() {
    let (platform, action) = platform_with_agent().await;

    let response = platform.invoke(&action, &json!({"a": 1}), false).await.unwrap();
    assert_eq!(response.status, 202);
    assert!(response.activation_id.is_some());
    assert_eq!(platform.queued_count().await, 1);
    assert_eq!(platform.caller_invoke_count().await, 1);
}

#[tokio::test]
async fn test_stop_request_answers_polls_with_stop_code() {
    let (platform, action) = platform_with_agent().await;
    platform.request_stop().await;

    let response = platform
        .invoke(&action, &json!({"$waitForActivation": true}), true)
        .await
        .unwrap();
    assert_eq!(response.error_code(), Some(STOP_CODE));
}

#[tokio::test]
async fn test_injected_completion_failures() {
    let (platform, action) = platform_with_agent().await;
    platform.invoke(&action, &json!({}), false).await.unwrap();
    let work = platform
        .invoke(&action, &json!({"$waitForActivation": true}), true)
        .await
        .unwrap();
    let id = work.result.unwrap()["$activationId"].clone();

    platform.fail_next_completions(1).await;
    let first = platform
        .invoke(&action, &json!({"$activationId": id.clone()}), true)
        .await;
    assert!(first.is_err());

    let second = platform
        .invoke(&action, &json!({"$activationId": id}), true)
        .await
        .unwrap();
    assert_eq!(second.status, 200);
    assert_eq!(platform.completion_count().await, 2);
}

#[tokio::test]
async fn test_mutations_are_recorded() {
    let platform = MockPlatform::new();
    let action = ActionRef::new("guest", "hello");
    let def = ActionDefinition::new("nodejs:18", "code");

    platform.update_action(&action, &def).await.unwrap();
    platform.get_action(&action).await.unwrap();
    platform.delete_action(&action).await.unwrap();

    let calls = platform.calls().await;
    assert_eq!(calls.len(), 3);
    assert_eq!(calls.iter().filter(|c| c.is_mutation()).count(), 2);
    assert!(platform.action(&action).await.is_none());
}
