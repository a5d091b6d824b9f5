// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error type tests for actionbridge-client.

use actionbridge_client::ClientError;

#[test]
fn test_config_error_display() {
    let err = ClientError::Config("missing host".to_string());
    assert!(err.to_string().contains("configuration error"));
    assert!(err.to_string().contains("missing host"));
}

#[test]
fn test_not_found_error_display() {
    let err = ClientError::NotFound("/_/hello".to_string());
    assert!(err.to_string().contains("action not found"));
    assert!(err.to_string().contains("/_/hello"));
    assert!(err.is_not_found());
}

#[test]
fn test_timeout_error_display() {
    let err = ClientError::Timeout(5000);
    assert!(err.to_string().contains("timed out"));
    assert!(err.to_string().contains("5000"));
    assert!(!err.is_not_found());
}

#[test]
fn test_server_error_display() {
    let err = ClientError::Server {
        status: 500,
        message: "Internal error".to_string(),
    };
    let display = err.to_string();
    assert!(display.contains("server error"));
    assert!(display.contains("500"));
    assert!(display.contains("Internal error"));
}

#[test]
fn test_conflict_error_display() {
    let err = ClientError::Conflict("document update conflict".to_string());
    assert!(err.to_string().contains("conflict"));
}

#[test]
fn test_unauthorized_error_display() {
    let err = ClientError::Unauthorized("bad key".to_string());
    assert!(err.to_string().contains("unauthorized"));
    assert!(err.to_string().contains("bad key"));
}

#[test]
fn test_from_serde_json_error() {
    let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let err: ClientError = json_err.into();
    assert!(matches!(err, ClientError::Serialization(_)));
}
