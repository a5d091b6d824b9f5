// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the platform client.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ClientError, Result};

/// Namespace placeholder resolved by the platform to the caller's namespace.
pub const DEFAULT_NAMESPACE: &str = "_";

/// Configuration for the platform client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the platform API, e.g. `https://openwhisk.example.com`.
    pub api_host: String,
    /// Credentials in `user:key` form (sent as basic auth).
    pub auth: String,
    /// Default namespace for unqualified action names.
    pub namespace: String,
    /// Skip TLS certificate verification (development only).
    pub insecure: bool,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Timeout for non-blocking requests.
    pub request_timeout: Duration,
    /// Extra time granted to blocking invokes on top of the request timeout.
    ///
    /// Blocking invokes legitimately stay open for the platform's whole
    /// blocking window, so they must not be cut short on the client side.
    pub blocking_grace: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_host: "https://localhost".to_string(),
            auth: String::new(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            insecure: false,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            blocking_grace: Duration::from_secs(90),
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given host and credentials.
    pub fn new(api_host: impl Into<String>, auth: impl Into<String>) -> Self {
        Self {
            api_host: normalize_host(&api_host.into()),
            auth: auth.into(),
            ..Self::default()
        }
    }

    /// Create a configuration from environment variables, falling back to a
    /// properties file.
    ///
    /// Environment variables:
    /// - `WSK_APIHOST`: API host (required unless present in the properties file)
    /// - `WSK_AUTH`: `user:key` credentials (required unless present in the properties file)
    /// - `WSK_NAMESPACE`: default namespace (default: `_`)
    /// - `WSK_INSECURE`: skip TLS verification (default: false)
    /// - `WSK_CONFIG_FILE`: properties file (default: `~/.wskprops`)
    /// - `ACTIONBRIDGE_REQUEST_TIMEOUT_MS`: request timeout (default: 30000)
    pub fn from_env() -> Result<Self> {
        let props_path = std::env::var("WSK_CONFIG_FILE")
            .map(PathBuf::from)
            .ok()
            .or_else(|| std::env::var("HOME").ok().map(|h| Path::new(&h).join(".wskprops")));

        let props = match props_path {
            Some(path) if path.exists() => read_properties(&path)?,
            _ => HashMap::new(),
        };

        let lookup = |env_key: &str, prop_key: &str| -> Option<String> {
            std::env::var(env_key)
                .ok()
                .or_else(|| props.get(prop_key).cloned())
                .filter(|v| !v.trim().is_empty())
        };

        let api_host = lookup("WSK_APIHOST", "APIHOST")
            .ok_or_else(|| ClientError::Config("WSK_APIHOST (or APIHOST) is required".to_string()))?;
        let auth = lookup("WSK_AUTH", "AUTH")
            .ok_or_else(|| ClientError::Config("WSK_AUTH (or AUTH) is required".to_string()))?;
        let namespace =
            lookup("WSK_NAMESPACE", "NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        let insecure = std::env::var("WSK_INSECURE")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false);

        let request_timeout_ms: u64 = std::env::var("ACTIONBRIDGE_REQUEST_TIMEOUT_MS")
            .unwrap_or_else(|_| "30000".to_string())
            .parse()
            .map_err(|e| {
                ClientError::Config(format!("invalid ACTIONBRIDGE_REQUEST_TIMEOUT_MS: {}", e))
            })?;

        Ok(Self {
            api_host: normalize_host(&api_host),
            auth,
            namespace,
            insecure,
            request_timeout: Duration::from_millis(request_timeout_ms),
            ..Self::default()
        })
    }

    /// Set the default namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Enable or disable TLS verification skipping.
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the extra time granted to blocking invokes.
    pub fn with_blocking_grace(mut self, grace: Duration) -> Self {
        self.blocking_grace = grace;
        self
    }

    /// Split the credentials into user and key.
    pub fn credentials(&self) -> Result<(&str, &str)> {
        self.auth
            .split_once(':')
            .ok_or_else(|| ClientError::Config("auth must have the form user:key".to_string()))
    }
}

/// Read a `KEY=VALUE` properties file.
pub fn read_properties(path: &Path) -> Result<HashMap<String, String>> {
    let iter = dotenvy::from_path_iter(path).map_err(|e| {
        ClientError::Config(format!("failed to read {}: {}", path.display(), e))
    })?;

    let mut props = HashMap::new();
    for item in iter {
        let (key, value) = item.map_err(|e| {
            ClientError::Config(format!("invalid entry in {}: {}", path.display(), e))
        })?;
        props.insert(key, value);
    }
    Ok(props)
}

/// Prefix a bare host with `https://` and drop a trailing slash.
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.namespace, "_");
        assert!(!config.insecure);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("example.com"), "https://example.com");
        assert_eq!(normalize_host("http://localhost:3233/"), "http://localhost:3233");
        assert_eq!(normalize_host(" https://a.b "), "https://a.b");
    }

    #[test]
    fn test_builder_methods() {
        let config = ClientConfig::new("ow.example.com", "user:key")
            .with_namespace("guest")
            .with_insecure(true)
            .with_connect_timeout(Duration::from_secs(5))
            .with_request_timeout(Duration::from_secs(60))
            .with_blocking_grace(Duration::from_secs(10));

        assert_eq!(config.api_host, "https://ow.example.com");
        assert_eq!(config.namespace, "guest");
        assert!(config.insecure);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.blocking_grace, Duration::from_secs(10));
    }

    #[test]
    fn test_credentials_split() {
        let config = ClientConfig::new("h", "abc:def");
        assert_eq!(config.credentials().unwrap(), ("abc", "def"));

        let config = ClientConfig::new("h", "nocolon");
        assert!(config.credentials().is_err());
    }
}
