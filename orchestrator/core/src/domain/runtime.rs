// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Task executor seam.
//!
//! The engine never performs a task's work itself. It hands the [`Task`] to a
//! [`TaskExecutor`] and treats any returned error as retryable.

use async_trait::async_trait;

use crate::domain::task::Task;

#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Run `task` to completion, returning an opaque result payload.
    async fn execute(&self, task: &Task) -> anyhow::Result<serde_json::Value>;
}
