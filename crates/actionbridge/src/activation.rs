// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Forwarded activations.

use actionbridge_client::protocol::ACTIVATION_ID;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{BridgeError, Result};

/// Where an activation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationSource {
    /// Received through a poll.
    Platform,
    /// Synthesized by the change watcher.
    Watcher,
}

/// Activation lifecycle: `received -> dispatched -> executing -> completed | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationState {
    /// Handed to the bridge by the agent.
    Received,
    /// Passed to the execution path.
    Dispatched,
    /// Running in the local executor.
    Executing,
    /// Finished with a result.
    Completed,
    /// Finished with an error result.
    Failed,
}

impl ActivationState {
    /// Whether `next` is a legal successor of this state.
    pub fn can_advance_to(&self, next: ActivationState) -> bool {
        use ActivationState::*;
        matches!(
            (self, next),
            (Received, Dispatched)
                | (Dispatched, Executing)
                | (Executing, Completed)
                | (Executing, Failed)
        )
    }
}

/// One unit of forwarded work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activation {
    /// Activation id assigned by the platform (or `local-*` for synthetic ones).
    pub id: String,
    /// Input parameters, reserved keys removed.
    pub params: Value,
    /// Origin.
    pub source: ActivationSource,
    /// Current lifecycle state.
    pub state: ActivationState,
    /// When the bridge received it.
    pub received_at: DateTime<Utc>,
    /// Result document once finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl Activation {
    /// Build from the result of a poll that returned work.
    ///
    /// Returns `None` when the result carries no `$activationId`.
    pub fn from_poll_result(result: &Value) -> Option<Self> {
        let mut params: Map<String, Value> = result.as_object()?.clone();
        let id = match params.remove(ACTIVATION_ID)? {
            Value::String(id) if !id.is_empty() => id,
            _ => return None,
        };

        Some(Self {
            id,
            params: Value::Object(params),
            source: ActivationSource::Platform,
            state: ActivationState::Received,
            received_at: Utc::now(),
            result: None,
        })
    }

    /// Synthesize a local activation (change watcher `RunLocal`).
    pub fn synthetic(params: Value) -> Self {
        Self {
            id: format!("local-{}", uuid::Uuid::new_v4()),
            params,
            source: ActivationSource::Watcher,
            state: ActivationState::Received,
            received_at: Utc::now(),
            result: None,
        }
    }

    /// Move to the next lifecycle state.
    pub fn advance(&mut self, next: ActivationState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(BridgeError::InvalidState(format!(
                "activation {} cannot move from {:?} to {:?}",
                self.id, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Record the result and finish the activation.
    pub fn finish(&mut self, result: Value, success: bool) -> Result<()> {
        let next = if success {
            ActivationState::Completed
        } else {
            ActivationState::Failed
        };
        self.advance(next)?;
        self.result = Some(result);
        Ok(())
    }

    /// Whether the activation has finished.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            ActivationState::Completed | ActivationState::Failed
        )
    }

    /// Body of the completion invoke: the result plus `$activationId`.
    ///
    /// Non-object results are wrapped as `{"result": value}`.
    pub fn completion_payload(&self) -> Value {
        let mut body = match self.result.clone() {
            Some(Value::Object(map)) => map,
            Some(Value::Null) | None => Map::new(),
            Some(other) => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                map
            }
        };
        body.insert(ACTIVATION_ID.to_string(), json!(self.id));
        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_poll_result_strips_reserved_key() {
        let act = Activation::from_poll_result(&json!({
            "$activationId": "abc",
            "name": "world"
        }))
        .unwrap();

        assert_eq!(act.id, "abc");
        assert_eq!(act.params, json!({"name": "world"}));
        assert_eq!(act.state, ActivationState::Received);
        assert_eq!(act.source, ActivationSource::Platform);
    }

    #[test]
    fn test_from_poll_result_requires_id() {
        assert!(Activation::from_poll_result(&json!({"name": "world"})).is_none());
        assert!(Activation::from_poll_result(&json!({"$activationId": 5})).is_none());
        assert!(Activation::from_poll_result(&json!("text")).is_none());
    }

    #[test]
    fn test_lifecycle_order_is_enforced() {
        let mut act = Activation::synthetic(json!({}));
        assert!(act.advance(ActivationState::Executing).is_err());
        act.advance(ActivationState::Dispatched).unwrap();
        act.advance(ActivationState::Executing).unwrap();
        act.finish(json!({"ok": true}), true).unwrap();
        assert_eq!(act.state, ActivationState::Completed);
        assert!(act.is_finished());
        assert!(act.finish(json!({}), false).is_err());
    }

    #[test]
    fn test_completion_payload() {
        let mut act = Activation::from_poll_result(&json!({"$activationId": "a1"})).unwrap();
        act.advance(ActivationState::Dispatched).unwrap();
        act.advance(ActivationState::Executing).unwrap();
        act.finish(json!({"msg": "hi"}), true).unwrap();
        assert_eq!(
            act.completion_payload(),
            json!({"msg": "hi", "$activationId": "a1"})
        );

        let mut scalar = Activation::from_poll_result(&json!({"$activationId": "a2"})).unwrap();
        scalar.state = ActivationState::Executing;
        scalar.finish(json!(7), true).unwrap();
        assert_eq!(
            scalar.completion_payload(),
            json!({"result": 7, "$activationId": "a2"})
        );
    }
}
