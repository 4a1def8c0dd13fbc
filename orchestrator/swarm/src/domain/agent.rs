// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Registry Types
//!
//! - [`AgentInfo`]: a registered worker with its capabilities and capacity.
//! - [`TaskClaim`]: a time-bounded exclusive lease of one task by one agent.
//! - [`AgentMatcher`]: optional fallback picker used to pre-populate
//!   `assigned_to` when no agent can be claimed through the coordinator.
//!
//! Neither type is persisted with the project. Both live only inside the
//! `AgentCoordinator`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use taskmesh_core::domain::task::Task;

/// A registered worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub agent_id: String,
    pub capabilities: BTreeSet<String>,
    pub max_concurrent_tasks: usize,
    pub current_task_count: usize,
    pub last_heartbeat: DateTime<Utc>,
    pub is_active: bool,
}

impl AgentInfo {
    pub fn new<I, S>(agent_id: impl Into<String>, capabilities: I, max_concurrent_tasks: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            agent_id: agent_id.into(),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            max_concurrent_tasks,
            current_task_count: 0,
            last_heartbeat: Utc::now(),
            is_active: true,
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.current_task_count < self.max_concurrent_tasks
    }

    /// True when every `required` tag is in this agent's capability set.
    pub fn satisfies(&self, required: &[String]) -> bool {
        required.iter().all(|c| self.capabilities.contains(c))
    }
}

/// Exclusive lease of `task_id` by `agent_id` until `lease_expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskClaim {
    pub task_id: String,
    pub agent_id: String,
    pub claimed_at: DateTime<Utc>,
    pub lease_expires_at: DateTime<Utc>,
    /// Task version the claimant observed, if it supplied one.
    pub claim_version: Option<u64>,
}

impl TaskClaim {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.lease_expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimError {
    #[error("Agent '{0}' is not registered")]
    AgentNotRegistered(String),

    #[error("Agent '{0}' is inactive")]
    AgentInactive(String),

    #[error("Agent '{agent_id}' is at capacity ({max_concurrent} concurrent tasks)")]
    AtCapacity { agent_id: String, max_concurrent: usize },

    #[error("Task '{task_id}' is already claimed by agent '{holder}'")]
    AlreadyClaimed { task_id: String, holder: String },
}

/// Pure fallback picker: choose one of `available` for `task`.
pub trait AgentMatcher: Send + Sync {
    fn assign_agent(&self, task: &Task, available: &[String]) -> Option<String>;
}
