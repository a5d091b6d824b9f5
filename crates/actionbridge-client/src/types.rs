// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Types for actionbridge-client.
//!
//! These mirror the platform's JSON documents closely enough that a definition
//! fetched with `get_action` can be written back unchanged with `update_action`.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ClientError, Result};

// ============================================================================
// Action reference
// ============================================================================

/// Namespace + name identifying a deployed action.
///
/// The name may contain a package segment (`pkg/action`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionRef {
    /// Namespace the action lives in (`_` means the caller's default namespace).
    pub namespace: String,
    /// Action name, optionally prefixed by a package.
    pub name: String,
}

impl ActionRef {
    /// Create a reference from its parts.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse `name`, `pkg/name`, `/ns/name` or `/ns/pkg/name`.
    ///
    /// Unqualified names resolve against `default_namespace`.
    pub fn parse(input: &str, default_namespace: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ClientError::InvalidInput("empty action name".to_string()));
        }

        if let Some(qualified) = input.strip_prefix('/') {
            let parts: Vec<&str> = qualified.split('/').collect();
            if parts.len() < 2 || parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
                return Err(ClientError::InvalidInput(format!(
                    "invalid qualified action name: {}",
                    input
                )));
            }
            return Ok(Self::new(parts[0], parts[1..].join("/")));
        }

        let parts: Vec<&str> = input.split('/').collect();
        if parts.len() > 2 || parts.iter().any(|p| p.is_empty()) {
            return Err(ClientError::InvalidInput(format!(
                "invalid action name: {}",
                input
            )));
        }
        Ok(Self::new(default_namespace, input))
    }

    /// Reference to a sibling action named `<name>_<suffix>` in the same namespace.
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self::new(&self.namespace, format!("{}_{}", self.name, suffix))
    }

    /// Percent-encoded path segments for the action name.
    pub(crate) fn encoded_name(&self) -> String {
        self.name
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.namespace, self.name)
    }
}

// ============================================================================
// Action definition
// ============================================================================

/// A key/value pair as used for parameters and annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    /// Key.
    pub key: String,
    /// Arbitrary JSON value.
    pub value: Value,
}

impl KeyValue {
    /// Create a key/value pair.
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Executable part of an action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionExec {
    /// Runtime kind, e.g. `nodejs:18`, `python:3`, `sequence`, `blackbox`.
    pub kind: String,
    /// Source code, or base64 zip when `binary` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Whether `code` is a base64 encoded archive.
    #[serde(default)]
    pub binary: bool,
    /// Entry function name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
    /// Container image for blackbox actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Component actions of a sequence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<String>>,
}

/// Resource limits of an action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionLimits {
    /// Execution timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Memory in megabytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,
    /// Log size in megabytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<u64>,
    /// Maximum concurrent activations per container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<u64>,
}

/// The platform's full description of an action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionDefinition {
    /// Namespace reported by the platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Name reported by the platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Semantic version maintained by the platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Code and runtime kind.
    pub exec: ActionExec,
    /// Default parameters.
    #[serde(default)]
    pub parameters: Vec<KeyValue>,
    /// Annotations.
    #[serde(default)]
    pub annotations: Vec<KeyValue>,
    /// Limits.
    #[serde(default)]
    pub limits: ActionLimits,
    /// Whether the action is shared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish: Option<bool>,
    /// Fields this client does not model, kept for round-tripping.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of an action update (PUT). Only fields the platform accepts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionUpdate {
    /// Code and runtime kind.
    pub exec: ActionExec,
    /// Default parameters.
    pub parameters: Vec<KeyValue>,
    /// Annotations.
    pub annotations: Vec<KeyValue>,
    /// Limits.
    pub limits: ActionLimits,
    /// Whether the action is shared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<bool>,
}

impl ActionDefinition {
    /// Create a definition from code and kind.
    pub fn new(kind: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            exec: ActionExec {
                kind: kind.into(),
                code: Some(code.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Runtime kind.
    pub fn kind(&self) -> &str {
        &self.exec.kind
    }

    /// Platform execution timeout, if the definition carries one.
    pub fn timeout(&self) -> Option<Duration> {
        self.limits.timeout.map(Duration::from_millis)
    }

    /// Look up an annotation value.
    pub fn annotation(&self, key: &str) -> Option<&Value> {
        self.annotations
            .iter()
            .find(|kv| kv.key == key)
            .map(|kv| &kv.value)
    }

    /// Whether an annotation is present and literally `true`.
    pub fn has_annotation_true(&self, key: &str) -> bool {
        matches!(self.annotation(key), Some(Value::Bool(true)))
    }

    /// Set an annotation, replacing an existing value.
    pub fn set_annotation(&mut self, key: &str, value: Value) {
        match self.annotations.iter_mut().find(|kv| kv.key == key) {
            Some(kv) => kv.value = value,
            None => self.annotations.push(KeyValue::new(key, value)),
        }
    }

    /// Remove an annotation if present.
    pub fn remove_annotation(&mut self, key: &str) {
        self.annotations.retain(|kv| kv.key != key);
    }

    /// Set a default parameter, replacing an existing value.
    pub fn with_parameter(mut self, key: &str, value: Value) -> Self {
        match self.parameters.iter_mut().find(|kv| kv.key == key) {
            Some(kv) => kv.value = value,
            None => self.parameters.push(KeyValue::new(key, value)),
        }
        self
    }

    /// Whether two definitions carry the same deployable content.
    ///
    /// Platform-maintained fields (version, namespace, name) are ignored.
    pub fn same_content(&self, other: &ActionDefinition) -> bool {
        self.exec == other.exec
            && self.parameters == other.parameters
            && self.annotations == other.annotations
            && self.limits == other.limits
    }

    /// Body for writing this definition back to the platform.
    pub fn to_update(&self) -> ActionUpdate {
        ActionUpdate {
            exec: self.exec.clone(),
            parameters: self.parameters.clone(),
            annotations: self.annotations.clone(),
            limits: self.limits.clone(),
            publish: self.publish,
        }
    }
}

// ============================================================================
// Invoke response
// ============================================================================

/// Transport-level outcome of an invoke.
///
/// `status` follows the platform's conventions: 200 completed, 202 accepted
/// (non-blocking, or the blocking window elapsed), 502 application error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeResponse {
    /// HTTP status of the invoke call.
    pub status: u16,
    /// Activation id assigned by the platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_id: Option<String>,
    /// Result document of the activation, when it completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Whether the activation completed successfully.
    pub success: bool,
}

impl InvokeResponse {
    /// A completed activation with a result.
    pub fn completed(result: Value) -> Self {
        Self {
            status: 200,
            activation_id: None,
            result: Some(result),
            success: true,
        }
    }

    /// An accepted activation (non-blocking invoke, or blocking window elapsed).
    pub fn accepted(activation_id: impl Into<String>) -> Self {
        Self {
            status: 202,
            activation_id: Some(activation_id.into()),
            result: None,
            success: false,
        }
    }

    /// An activation whose action returned an error object.
    pub fn application_error(error: Value) -> Self {
        Self {
            status: 502,
            activation_id: None,
            result: Some(serde_json::json!({ "error": error })),
            success: false,
        }
    }

    /// Attach the activation id.
    pub fn with_activation_id(mut self, activation_id: impl Into<String>) -> Self {
        self.activation_id = Some(activation_id.into());
        self
    }

    /// Build from an activation record as returned by a blocking invoke.
    ///
    /// Record shape: `{"activationId": "...", "response": {"result": {...}, "success": bool}}`.
    /// A 202 body only carries `activationId`.
    pub fn from_record(status: u16, body: &Value) -> Self {
        let activation_id = body
            .get("activationId")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let response = body.get("response");
        let result = response.and_then(|r| r.get("result")).cloned();
        let success = response
            .and_then(|r| r.get("success"))
            .and_then(|v| v.as_bool())
            .unwrap_or(status == 200);

        Self {
            status,
            activation_id,
            result,
            success,
        }
    }

    /// The `error` member of the result, if any.
    pub fn error(&self) -> Option<&Value> {
        self.result.as_ref().and_then(|r| r.get("error"))
    }

    /// Numeric application error code (`result.error.code`).
    pub fn error_code(&self) -> Option<i64> {
        self.error()
            .and_then(|e| e.get("code"))
            .and_then(|c| c.as_i64())
    }
}
