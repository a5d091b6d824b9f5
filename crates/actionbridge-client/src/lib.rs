// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! actionbridge client
//!
//! Thin client for the serverless platform's action API, used by the
//! `actionbridge` debugger to read, replace, restore and invoke actions.
//!
//! # Architecture
//!
//! Everything the debugger needs from the platform goes through the
//! [`PlatformClient`] trait:
//! - `get_action` / `update_action` / `delete_action` for swapping code
//! - `invoke` for polls, completions and self-invocations
//!
//! [`RestClient`] implements it over HTTP; [`MockPlatform`] implements it in
//! memory and emulates the installed agent stub for tests.
//!
//! # Example
//!
//! ```no_run
//! use actionbridge_client::{ActionRef, PlatformClient, RestClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RestClient::from_env()?;
//! let action = ActionRef::parse("hello", &client.config().namespace)?;
//!
//! let definition = client.get_action(&action).await?;
//! println!("{} runs on {}", action, definition.kind());
//!
//! let response = client
//!     .invoke(&action, &serde_json::json!({"name": "world"}), true)
//!     .await?;
//! println!("status {}: {:?}", response.status, response.result);
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod mock;
pub mod protocol;
mod types;

pub use client::{PlatformClient, RestClient};
pub use config::{ClientConfig, DEFAULT_NAMESPACE, read_properties};
pub use error::{ClientError, Result};
pub use mock::{MockPlatform, PlatformCall};
pub use types::{
    ActionDefinition, ActionExec, ActionLimits, ActionRef, ActionUpdate, InvokeResponse, KeyValue,
};
