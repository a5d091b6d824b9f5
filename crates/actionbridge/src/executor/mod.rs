// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Local executor implementations.
//!
//! Provides different backends for running forwarded activations:
//! - `ContainerExecutor`: runs the action's runtime image through the container engine CLI
//! - `MockExecutor`: runs a closure in-process, for tests

pub mod container;
pub mod mock;
pub mod traits;

pub use container::{ContainerExecutor, ContainerExecutorConfig};
pub use mock::MockExecutor;
pub use traits::*;
