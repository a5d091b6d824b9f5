// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Platform client trait and its REST implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::types::{ActionDefinition, ActionRef, InvokeResponse};

/// Operations the bridge needs from the platform.
///
/// Implementations must be safe to share between the poll loop, the change
/// watcher and the session-control surface.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Fetch an action including its code.
    ///
    /// Returns [`ClientError::NotFound`] when the action does not exist.
    async fn get_action(&self, action: &ActionRef) -> Result<ActionDefinition>;

    /// Create or overwrite an action.
    async fn update_action(
        &self,
        action: &ActionRef,
        definition: &ActionDefinition,
    ) -> Result<ActionDefinition>;

    /// Delete an action.
    async fn delete_action(&self, action: &ActionRef) -> Result<()>;

    /// Invoke an action with the given parameters.
    ///
    /// With `blocking` set the call waits for the activation to finish (or for
    /// the platform's blocking window to elapse, reported as status 202).
    async fn invoke(
        &self,
        action: &ActionRef,
        params: &Value,
        blocking: bool,
    ) -> Result<InvokeResponse>;
}

/// REST client for the platform API.
pub struct RestClient {
    http: reqwest::Client,
    config: ClientConfig,
    user: String,
    key: String,
}

impl RestClient {
    /// Create a client with the given configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let (user, key) = config.credentials()?;
        let (user, key) = (user.to_string(), key.to_string());

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            user,
            key,
        })
    }

    /// Create a client from environment variables / properties file.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    fn action_url(&self, action: &ActionRef) -> String {
        format!(
            "{}/api/v1/namespaces/{}/actions/{}",
            self.config.api_host,
            urlencoding::encode(&action.namespace),
            action.encoded_name()
        )
    }

    fn request(&self, method: Method, url: &str, timeout: Duration) -> RequestBuilder {
        self.http
            .request(method, url)
            .basic_auth(&self.user, Some(&self.key))
            .timeout(timeout)
    }

    async fn send(&self, request: RequestBuilder, timeout: Duration) -> Result<Response> {
        request.send().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout(timeout.as_millis() as u64)
            } else {
                ClientError::Connection(e.to_string())
            }
        })
    }

    /// Map a non-success response to an error.
    async fn error_from(action: &ActionRef, response: Response) -> ClientError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or(body);

        match status {
            StatusCode::NOT_FOUND => ClientError::NotFound(action.to_string()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Unauthorized(message),
            StatusCode::CONFLICT => ClientError::Conflict(message),
            _ => ClientError::Server {
                status: status.as_u16(),
                message,
            },
        }
    }
}

#[async_trait]
impl PlatformClient for RestClient {
    #[instrument(skip(self), fields(action = %action))]
    async fn get_action(&self, action: &ActionRef) -> Result<ActionDefinition> {
        let url = format!("{}?code=true", self.action_url(action));
        let timeout = self.config.request_timeout;
        let response = self
            .send(self.request(Method::GET, &url, timeout), timeout)
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(action, response).await);
        }

        let definition: ActionDefinition = response.json().await?;
        debug!(kind = %definition.exec.kind, "Fetched action");
        Ok(definition)
    }

    #[instrument(skip(self, definition), fields(action = %action))]
    async fn update_action(
        &self,
        action: &ActionRef,
        definition: &ActionDefinition,
    ) -> Result<ActionDefinition> {
        let url = format!("{}?overwrite=true", self.action_url(action));
        let timeout = self.config.request_timeout;
        let request = self
            .request(Method::PUT, &url, timeout)
            .json(&definition.to_update());
        let response = self.send(request, timeout).await?;

        if !response.status().is_success() {
            return Err(Self::error_from(action, response).await);
        }

        let updated: ActionDefinition = response.json().await?;
        debug!(version = ?updated.version, "Updated action");
        Ok(updated)
    }

    #[instrument(skip(self), fields(action = %action))]
    async fn delete_action(&self, action: &ActionRef) -> Result<()> {
        let url = self.action_url(action);
        let timeout = self.config.request_timeout;
        let response = self
            .send(self.request(Method::DELETE, &url, timeout), timeout)
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(action, response).await);
        }

        debug!("Deleted action");
        Ok(())
    }

    #[instrument(skip(self, params), fields(action = %action))]
    async fn invoke(
        &self,
        action: &ActionRef,
        params: &Value,
        blocking: bool,
    ) -> Result<InvokeResponse> {
        let url = format!("{}?blocking={}", self.action_url(action), blocking);
        let timeout = if blocking {
            self.config.request_timeout + self.config.blocking_grace
        } else {
            self.config.request_timeout
        };
        let request = self.request(Method::POST, &url, timeout).json(params);
        let response = self.send(request, timeout).await?;

        let status = response.status();
        match status.as_u16() {
            200 | 202 | 502 => {
                let body: Value = response.json().await?;
                let invoke = InvokeResponse::from_record(status.as_u16(), &body);
                debug!(
                    status = invoke.status,
                    activation_id = ?invoke.activation_id,
                    "Invoke returned"
                );
                Ok(invoke)
            }
            _ => Err(Self::error_from(action, response).await),
        }
    }
}
