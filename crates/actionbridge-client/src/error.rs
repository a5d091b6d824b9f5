// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for actionbridge-client.

use thiserror::Error;

/// Result type using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the platform.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration error (missing or invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// The requested action (or backup) does not exist.
    #[error("action not found: {0}")]
    NotFound(String),

    /// Credentials were rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The platform refused an update because of a conflicting write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Request timed out on the client side.
    #[error("request timed out after {0}ms")]
    Timeout(u64),

    /// Platform returned an unexpected error status.
    #[error("server error [{status}]: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Error message extracted from the body.
        message: String,
    },

    /// Transport failed before a response arrived.
    #[error("connection error: {0}")]
    Connection(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ClientError {
    /// Whether the error means the action is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Serialization(err.to_string())
        } else {
            ClientError::Connection(err.to_string())
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Config(err.to_string())
    }
}
