// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Container executor.
//!
//! Runs the action's runtime image through the container engine CLI
//! (`docker` by default) and talks to the runtime's action proxy over HTTP:
//!
//! 1. remove stale containers labelled for the same action
//! 2. `run -d --rm` with the debug port published and the source mounted read-only
//! 3. look up the host port of the proxy (8080) and wait until it answers
//! 4. `POST /init` once, then `POST /run` per activation

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::traits::*;
use crate::activation::Activation;
use crate::mount::CONTAINER_ROOT;

/// Label carrying the debugged action on every container this executor starts.
pub const ACTION_LABEL: &str = "actionbridge.action";

/// Container executor configuration.
#[derive(Debug, Clone)]
pub struct ContainerExecutorConfig {
    /// Container engine binary.
    pub engine: String,
    /// Port of the runtime's action proxy inside the container.
    pub proxy_port: u16,
    /// How long to wait for the proxy to answer after start.
    pub ready_timeout: Duration,
    /// Interval between readiness probes.
    pub ready_poll_interval: Duration,
    /// Timeout of the `/init` call.
    pub init_timeout: Duration,
    /// Extra arguments for `run` (e.g. `--network host`).
    pub extra_run_args: Vec<String>,
}

impl Default for ContainerExecutorConfig {
    fn default() -> Self {
        Self {
            engine: "docker".to_string(),
            proxy_port: 8080,
            ready_timeout: Duration::from_secs(30),
            ready_poll_interval: Duration::from_millis(250),
            init_timeout: Duration::from_secs(60),
            extra_run_args: Vec::new(),
        }
    }
}

impl ContainerExecutorConfig {
    /// Create configuration from environment variables.
    ///
    /// - `ACTIONBRIDGE_ENGINE`: engine binary (default: `docker`)
    /// - `ACTIONBRIDGE_READY_TIMEOUT_SECS`: readiness wait (default: 30)
    /// - `ACTIONBRIDGE_ENGINE_ARGS`: whitespace-separated extra `run` arguments
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            engine: std::env::var("ACTIONBRIDGE_ENGINE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.engine),
            ready_timeout: std::env::var("ACTIONBRIDGE_READY_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.ready_timeout),
            extra_run_args: std::env::var("ACTIONBRIDGE_ENGINE_ARGS")
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            ..defaults
        }
    }
}

#[derive(Debug, Clone)]
struct RunningContainer {
    id: String,
    base_url: String,
}

/// Executor backed by a runtime container.
pub struct ContainerExecutor {
    config: ContainerExecutorConfig,
    http: reqwest::Client,
    running: Mutex<Option<RunningContainer>>,
    last_options: Mutex<Option<ProvisionOptions>>,
}

impl ContainerExecutor {
    /// Create a container executor.
    pub fn new(config: ContainerExecutorConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ExecutorError::Transport(e.to_string()))?;
        Ok(Self {
            config,
            http,
            running: Mutex::new(None),
            last_options: Mutex::new(None),
        })
    }

    /// Create a container executor configured from the environment.
    pub fn from_env() -> Result<Self> {
        Self::new(ContainerExecutorConfig::from_env())
    }

    /// Arguments of the `run` command for `options`.
    pub fn run_args(&self, options: &ProvisionOptions) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            options.instance_name(),
            "--label".to_string(),
            format!("{}={}", ACTION_LABEL, options.action),
            "-p".to_string(),
            format!("127.0.0.1::{}", self.config.proxy_port),
            "-p".to_string(),
            format!(
                "127.0.0.1:{}:{}",
                options.debug_port, options.profile.debug_port
            ),
        ];

        if let Some(mount) = &options.mount {
            args.push("-v".to_string());
            args.push(format!(
                "{}:{}:ro",
                mount.host_path.display(),
                CONTAINER_ROOT
            ));
        }

        args.extend(self.config.extra_run_args.iter().cloned());
        args.push(options.profile.image.clone());
        if let Some(command) = options.profile.debug_command() {
            args.extend(command);
        }
        args
    }

    /// Run an engine command and return its trimmed stdout.
    async fn engine(&self, args: &[String]) -> Result<String> {
        debug!(engine = %self.config.engine, args = ?args, "Running engine command");
        let output = Command::new(&self.config.engine)
            .args(args)
            .output()
            .await?;

        if !output.status.success() {
            return Err(ExecutorError::Engine {
                command: format!("{} {}", self.config.engine, args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Remove containers left behind by an earlier session on the same action.
    async fn remove_stale(&self, options: &ProvisionOptions) -> Result<()> {
        let filter = format!("label={}={}", ACTION_LABEL, options.action);
        let ids = self
            .engine(&["ps".into(), "-aq".into(), "--filter".into(), filter])
            .await?;

        let ids: Vec<String> = ids.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect();
        if ids.is_empty() {
            return Ok(());
        }

        warn!(count = ids.len(), action = %options.action, "Removing stale containers");
        let mut args = vec!["rm".to_string(), "-f".to_string()];
        args.extend(ids);
        self.engine(&args).await?;
        Ok(())
    }

    async fn remove(&self, id: &str) {
        if let Err(e) = self.engine(&["rm".into(), "-f".into(), id.to_string()]).await {
            warn!(container_id = %id, error = %e, "Failed to remove container");
        }
    }

    async fn proxy_url(&self, id: &str) -> Result<String> {
        let output = self
            .engine(&[
                "port".into(),
                id.to_string(),
                format!("{}/tcp", self.config.proxy_port),
            ])
            .await?;
        let port = parse_port(&output).ok_or_else(|| ExecutorError::Engine {
            command: "port".to_string(),
            stderr: format!("unexpected port output: {}", output),
        })?;
        Ok(format!("http://127.0.0.1:{}", port))
    }

    async fn wait_ready(&self, base_url: &str) -> Result<()> {
        let deadline = Instant::now() + self.config.ready_timeout;
        loop {
            // Any HTTP answer means the proxy is listening.
            if self.http.get(base_url).send().await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ExecutorError::NotReady(self.config.ready_timeout));
            }
            tokio::time::sleep(self.config.ready_poll_interval).await;
        }
    }

    async fn init(&self, base_url: &str, payload: &Value) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/init", base_url))
            .timeout(self.config.init_timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| ExecutorError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutorError::Init(format!("status {}: {}", status, body)));
        }
        Ok(())
    }

    async fn start(&self, options: &ProvisionOptions) -> Result<RunningContainer> {
        let payload = options.init_payload()?;
        self.remove_stale(options).await?;

        let id = self.engine(&self.run_args(options)).await?;
        info!(
            container_id = %id,
            image = %options.profile.image,
            debug_port = options.debug_port,
            "Container started"
        );

        let ready = async {
            let base_url = self.proxy_url(&id).await?;
            self.wait_ready(&base_url).await?;
            self.init(&base_url, &payload).await?;
            Ok::<_, ExecutorError>(base_url)
        };

        match ready.await {
            Ok(base_url) => Ok(RunningContainer { id, base_url }),
            Err(e) => {
                self.remove(&id).await;
                Err(e)
            }
        }
    }
}

/// Host port from `port` output such as `127.0.0.1:49153` or `[::]:49153`.
fn parse_port(output: &str) -> Option<u16> {
    output.lines().next()?.trim().rsplit(':').next()?.parse().ok()
}

#[async_trait]
impl Executor for ContainerExecutor {
    fn executor_type(&self) -> &'static str {
        "container"
    }

    async fn provision(&self, options: &ProvisionOptions) -> Result<()> {
        self.teardown().await?;

        let container = self.start(options).await?;
        info!(container_id = %container.id, url = %container.base_url, "Runtime initialized");

        *self.running.lock().await = Some(container);
        *self.last_options.lock().await = Some(options.clone());
        Ok(())
    }

    async fn execute(
        &self,
        activation: &Activation,
        budget: Option<Duration>,
    ) -> Result<ExecutionResult> {
        let container = self
            .running
            .lock()
            .await
            .clone()
            .ok_or(ExecutorError::NotProvisioned)?;
        let options = self
            .last_options
            .lock()
            .await
            .clone()
            .ok_or(ExecutorError::NotProvisioned)?;

        let deadline = options.run_deadline(budget, chrono::Utc::now().timestamp_millis());
        let body = json!({
            "value": activation.params,
            "action_name": options.action.to_string(),
            "namespace": options.action.namespace,
            "activation_id": activation.id,
            "deadline": deadline.to_string(),
        });

        let started = Instant::now();
        let request = self
            .http
            .post(format!("{}/run", container.base_url))
            .json(&body)
            .send();

        let response = match budget {
            Some(budget) => match tokio::time::timeout(budget, request).await {
                Ok(response) => response,
                Err(_) => {
                    warn!(activation_id = %activation.id, budget_ms = budget.as_millis() as u64, "Execution exceeded budget");
                    return Ok(ExecutionResult::failure(
                        format!("execution exceeded {} ms", budget.as_millis()),
                        started.elapsed().as_millis() as u64,
                    ));
                }
            },
            None => request.await,
        }
        .map_err(|e| ExecutorError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ExecutorError::Transport(e.to_string()))?;
        let duration_ms = started.elapsed().as_millis() as u64;
        let value = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        if status.is_success() && value.get("error").is_none() {
            Ok(ExecutionResult::success(value, duration_ms))
        } else {
            Ok(ExecutionResult::failure_with(value, duration_ms))
        }
    }

    async fn teardown(&self) -> Result<()> {
        let Some(container) = self.running.lock().await.take() else {
            return Ok(());
        };
        self.engine(&["rm".into(), "-f".into(), container.id.clone()])
            .await?;
        info!(container_id = %container.id, "Container removed");
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        let options = self
            .last_options
            .lock()
            .await
            .clone()
            .ok_or(ExecutorError::NotProvisioned)?;
        info!("Restarting runtime container");
        self.provision(&options).await
    }

    async fn is_provisioned(&self) -> bool {
        self.running.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::{MountDescriptor, MountLayout};
    use crate::runtimes::profile_for;
    use actionbridge_client::ActionRef;
    use std::path::PathBuf;

    fn options(mount: bool) -> ProvisionOptions {
        ProvisionOptions {
            session_id: "0123456789abcdef".to_string(),
            action: ActionRef::new("guest", "hello"),
            profile: profile_for("nodejs:18", None).unwrap(),
            mount: mount.then(|| MountDescriptor {
                host_path: PathBuf::from("/work/src"),
                entry: PathBuf::from("index.js"),
                layout: MountLayout::Flat,
            }),
            inline: None,
            main: "main".to_string(),
            debug_port: 9339,
            action_timeout: None,
        }
    }

    #[test]
    fn test_run_args() {
        let executor = ContainerExecutor::new(ContainerExecutorConfig::default()).unwrap();
        let args = executor.run_args(&options(true));

        assert_eq!(&args[..3], ["run", "-d", "--rm"]);
        assert!(args.contains(&"actionbridge-01234567".to_string()));
        assert!(args.contains(&"actionbridge.action=/guest/hello".to_string()));
        assert!(args.contains(&"127.0.0.1::8080".to_string()));
        assert!(args.contains(&"127.0.0.1:9339:9229".to_string()));
        assert!(args.contains(&"/work/src:/code:ro".to_string()));

        let image = args
            .iter()
            .position(|a| a == "openwhisk/action-nodejs-v18")
            .unwrap();
        assert_eq!(args[image + 1], "node");
        assert!(args[image + 1..].contains(&"--inspect=0.0.0.0:9229".to_string()));
    }

    #[test]
    fn test_run_args_without_mount() {
        let executor = ContainerExecutor::new(ContainerExecutorConfig {
            extra_run_args: vec!["--network".to_string(), "host".to_string()],
            ..Default::default()
        })
        .unwrap();
        let args = executor.run_args(&options(false));
        assert!(!args.contains(&"-v".to_string()));
        assert!(args.contains(&"--network".to_string()));
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port("127.0.0.1:49153"), Some(49153));
        assert_eq!(parse_port("0.0.0.0:32768\n[::]:32768"), Some(32768));
        assert_eq!(parse_port(""), None);
        assert_eq!(parse_port("garbage"), None);
    }

    #[tokio::test]
    async fn test_execute_requires_provision() {
        let executor = ContainerExecutor::new(ContainerExecutorConfig::default()).unwrap();
        let activation = Activation::synthetic(json!({}));
        assert!(matches!(
            executor.execute(&activation, None).await,
            Err(ExecutorError::NotProvisioned)
        ));
        assert!(!executor.is_provisioned().await);
        executor.teardown().await.unwrap();
    }
}
