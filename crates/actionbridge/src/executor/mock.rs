// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock executor for testing.
//!
//! Runs a closure in-process instead of a container and records how it was
//! driven (provisions, teardowns, concurrency).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::traits::*;
use crate::activation::Activation;

type Handler = Arc<dyn Fn(&Value) -> std::result::Result<Value, String> + Send + Sync>;

/// Mock executor for testing.
pub struct MockExecutor {
    handler: Handler,
    /// Simulated execution time.
    pub execution_delay: Duration,
    /// If true, `provision` fails.
    pub fail_provision: bool,
    provisioned: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    provisions: AtomicUsize,
    teardowns: AtomicUsize,
    executed: Mutex<Vec<Activation>>,
    last_options: Mutex<Option<ProvisionOptions>>,
}

impl MockExecutor {
    /// Create a mock executor running `handler` for every activation.
    ///
    /// `Err(message)` from the handler becomes a failed result.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            execution_delay: Duration::ZERO,
            fail_provision: false,
            provisioned: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            provisions: AtomicUsize::new(0),
            teardowns: AtomicUsize::new(0),
            executed: Mutex::new(Vec::new()),
            last_options: Mutex::new(None),
        }
    }

    /// A mock executor that returns the parameters unchanged.
    pub fn echo() -> Self {
        Self::new(|params| Ok(params.clone()))
    }

    /// Set the simulated execution time.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.execution_delay = delay;
        self
    }

    /// Make `provision` fail.
    pub fn failing_provision(mut self) -> Self {
        self.fail_provision = true;
        self
    }

    /// Highest number of concurrent executions observed.
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Number of successful provisions (including restarts).
    pub fn provision_count(&self) -> usize {
        self.provisions.load(Ordering::SeqCst)
    }

    /// Number of teardowns of a provisioned instance.
    pub fn teardown_count(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }

    /// Activations executed so far, in order.
    pub async fn executed(&self) -> Vec<Activation> {
        self.executed.lock().await.clone()
    }

    /// Options of the last provision.
    pub async fn last_options(&self) -> Option<ProvisionOptions> {
        self.last_options.lock().await.clone()
    }
}

#[async_trait]
impl Executor for MockExecutor {
    fn executor_type(&self) -> &'static str {
        "mock"
    }

    async fn provision(&self, options: &ProvisionOptions) -> Result<()> {
        if self.fail_provision {
            return Err(ExecutorError::Engine {
                command: "mock run".to_string(),
                stderr: "Mock provision failure".to_string(),
            });
        }
        options.init_payload()?;

        *self.last_options.lock().await = Some(options.clone());
        self.provisioned.store(true, Ordering::SeqCst);
        self.provisions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn execute(
        &self,
        activation: &Activation,
        budget: Option<Duration>,
    ) -> Result<ExecutionResult> {
        if !self.provisioned.load(Ordering::SeqCst) {
            return Err(ExecutorError::NotProvisioned);
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let started = Instant::now();

        let timed_out = match budget {
            Some(budget) if budget < self.execution_delay => {
                tokio::time::sleep(budget).await;
                true
            }
            _ => {
                if !self.execution_delay.is_zero() {
                    tokio::time::sleep(self.execution_delay).await;
                }
                false
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let result = if timed_out {
            ExecutionResult::failure(
                format!("execution exceeded {} ms", budget.unwrap_or_default().as_millis()),
                duration_ms,
            )
        } else {
            match (self.handler)(&activation.params) {
                Ok(value) => ExecutionResult::success(value, duration_ms),
                Err(message) => ExecutionResult::failure(message, duration_ms),
            }
        };

        self.executed.lock().await.push(activation.clone());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(result)
    }

    async fn teardown(&self) -> Result<()> {
        if self.provisioned.swap(false, Ordering::SeqCst) {
            self.teardowns.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        let options = self
            .last_options
            .lock()
            .await
            .clone()
            .ok_or(ExecutorError::NotProvisioned)?;
        self.teardown().await?;
        self.provision(&options).await
    }

    async fn is_provisioned(&self) -> bool {
        self.provisioned.load(Ordering::SeqCst)
    }
}
