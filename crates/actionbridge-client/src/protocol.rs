// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire contract between the bridge and the installed agent stub.
//!
//! | Direction | Body | Meaning |
//! |-----------|------|---------|
//! | bridge -> agent | `{"$waitForActivation": true}` | long poll for the next caller invocation |
//! | agent -> bridge | 200 `{"$activationId": id, ...params}` | work |
//! | agent -> bridge | 502 `{"error": {"code": 42}}` | no work yet, poll again |
//! | agent -> bridge | 502 `{"error": {"code": 43}}` | stop polling |
//! | bridge -> agent | `{"$activationId": id, ...result}` | complete a forwarded activation |

/// Parameter key marking a poll invoke.
pub const WAIT_FOR_ACTIVATION: &str = "$waitForActivation";

/// Parameter/result key carrying the forwarded activation id.
pub const ACTIVATION_ID: &str = "$activationId";

/// Application error code meaning "no work yet, poll again".
pub const RETRY_CODE: i64 = 42;

/// Application error code meaning "stop polling".
pub const STOP_CODE: i64 = 43;

/// Annotation key flagging an action as currently agent-installed.
pub const MARKER_ANNOTATION: &str = "actionbridge";

/// Whether invoke parameters are a poll request.
pub fn is_poll(params: &serde_json::Value) -> bool {
    params
        .get(WAIT_FOR_ACTIVATION)
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// Activation id carried by a completion request, if any.
pub fn completion_id(params: &serde_json::Value) -> Option<&str> {
    params.get(ACTIVATION_ID).and_then(|v| v.as_str())
}
