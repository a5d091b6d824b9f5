// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Type tests for actionbridge-client.

use actionbridge_client::{ActionDefinition, ActionRef, InvokeResponse, protocol};
use serde_json::{Value, json};
use std::time::Duration;

// ============================================================================
// ActionRef
// ============================================================================

#[test]
fn test_action_ref_parse_forms() {
    let plain = ActionRef::parse("hello", "guest").unwrap();
    assert_eq!(plain, ActionRef::new("guest", "hello"));

    let packaged = ActionRef::parse("utils/hello", "guest").unwrap();
    assert_eq!(packaged, ActionRef::new("guest", "utils/hello"));

    let qualified = ActionRef::parse("/other/hello", "guest").unwrap();
    assert_eq!(qualified, ActionRef::new("other", "hello"));

    let full = ActionRef::parse("/other/utils/hello", "guest").unwrap();
    assert_eq!(full, ActionRef::new("other", "utils/hello"));
}

#[test]
fn test_action_ref_parse_rejects_garbage() {
    assert!(ActionRef::parse("", "guest").is_err());
    assert!(ActionRef::parse("a/b/c", "guest").is_err());
    assert!(ActionRef::parse("/onlyns", "guest").is_err());
    assert!(ActionRef::parse("/ns//x", "guest").is_err());
}

#[test]
fn test_action_ref_suffix_and_display() {
    let action = ActionRef::new("guest", "hello");
    let backup = action.with_suffix("actionbridge_backup");
    assert_eq!(backup.name, "hello_actionbridge_backup");
    assert_eq!(backup.namespace, "guest");
    assert_eq!(action.to_string(), "/guest/hello");
}

// ============================================================================
// ActionDefinition
// ============================================================================

#[test]
fn test_definition_deserializes_platform_document() {
    let doc = json!({
        "namespace": "guest",
        "name": "hello",
        "version": "0.0.3",
        "exec": {"kind": "nodejs:18", "code": "function main(){}", "binary": false},
        "parameters": [{"key": "greeting", "value": "hi"}],
        "annotations": [{"key": "exec", "value": "nodejs:18"}],
        "limits": {"timeout": 60000, "memory": 256, "logs": 10, "concurrency": 1},
        "publish": false,
        "updated": 1700000000000u64
    });

    let def: ActionDefinition = serde_json::from_value(doc).unwrap();
    assert_eq!(def.kind(), "nodejs:18");
    assert_eq!(def.timeout(), Some(Duration::from_secs(60)));
    assert_eq!(def.parameters[0].value, json!("hi"));
    assert!(def.extra.contains_key("updated"));
}

#[test]
fn test_definition_annotations() {
    let mut def = ActionDefinition::new("nodejs:18", "code");
    assert!(!def.has_annotation_true(protocol::MARKER_ANNOTATION));

    def.set_annotation(protocol::MARKER_ANNOTATION, Value::Bool(true));
    assert!(def.has_annotation_true(protocol::MARKER_ANNOTATION));

    def.set_annotation(protocol::MARKER_ANNOTATION, json!("yes"));
    assert!(!def.has_annotation_true(protocol::MARKER_ANNOTATION));
    assert_eq!(def.annotations.len(), 1);

    def.remove_annotation(protocol::MARKER_ANNOTATION);
    assert!(def.annotation(protocol::MARKER_ANNOTATION).is_none());
}

#[test]
fn test_same_content_ignores_platform_fields() {
    let mut a = ActionDefinition::new("python:3", "def main(a): return a");
    let mut b = a.clone();
    a.version = Some("0.0.1".to_string());
    b.version = Some("0.0.7".to_string());
    b.namespace = Some("guest".to_string());
    assert!(a.same_content(&b));

    b.exec.code = Some("changed".to_string());
    assert!(!a.same_content(&b));
}

#[test]
fn test_to_update_drops_platform_fields() {
    let mut def = ActionDefinition::new("nodejs:18", "code").with_parameter("x", json!(1));
    def.version = Some("0.0.1".to_string());
    def.extra.insert("updated".to_string(), json!(1));

    let body = serde_json::to_value(def.to_update()).unwrap();
    assert!(body.get("version").is_none());
    assert!(body.get("updated").is_none());
    assert_eq!(body["exec"]["kind"], "nodejs:18");
    assert_eq!(body["parameters"][0]["key"], "x");
}

// ============================================================================
// InvokeResponse
// ============================================================================

#[test]
fn test_invoke_response_from_record() {
    let body = json!({
        "activationId": "abc",
        "response": {"result": {"error": {"code": 42}}, "success": false}
    });
    let response = InvokeResponse::from_record(502, &body);
    assert_eq!(response.activation_id.as_deref(), Some("abc"));
    assert!(!response.success);
    assert_eq!(response.error_code(), Some(protocol::RETRY_CODE));
}

#[test]
fn test_invoke_response_accepted_record() {
    let response = InvokeResponse::from_record(202, &json!({"activationId": "xyz"}));
    assert_eq!(response.status, 202);
    assert!(response.result.is_none());
    assert!(response.error().is_none());
}

#[test]
fn test_protocol_helpers() {
    assert!(protocol::is_poll(&json!({"$waitForActivation": true})));
    assert!(!protocol::is_poll(&json!({"$waitForActivation": false})));
    assert!(!protocol::is_poll(&json!({"name": "x"})));
    assert_eq!(
        protocol::completion_id(&json!({"$activationId": "a1", "ok": true})),
        Some("a1")
    );
    assert_eq!(protocol::completion_id(&json!({})), None);
}
