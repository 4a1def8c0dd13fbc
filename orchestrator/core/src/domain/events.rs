// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::task::TaskState;

/// Lifecycle of a single orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrchestrationEvent {
    RunStarted {
        project_id: String,
        total_tasks: usize,
        ready_tasks: usize,
        started_at: DateTime<Utc>,
    },
    TaskStarted {
        project_id: String,
        task_id: String,
        assigned_to: String,
        started_at: DateTime<Utc>,
    },
    TaskRetrying {
        project_id: String,
        task_id: String,
        attempt: u32,
        max_retries: u32,
        error: String,
        delay_ms: u64,
    },
    TaskCompleted {
        project_id: String,
        task_id: String,
        attempts: u32,
        completed_at: DateTime<Utc>,
    },
    TaskBlocked {
        project_id: String,
        task_id: String,
        reason: String,
        blocked_at: DateTime<Utc>,
    },
    TaskSkipped {
        project_id: String,
        task_id: String,
        state: TaskState,
    },
    RunFinished {
        project_id: String,
        status: String,
        completed_tasks: usize,
        failed_tasks: usize,
        skipped_tasks: usize,
        finished_at: DateTime<Utc>,
    },
}

/// Agent registry, claim and protocol-level notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CoordinationEvent {
    AgentRegistered {
        agent_id: String,
        capabilities: Vec<String>,
        registered_at: DateTime<Utc>,
    },
    AgentUnregistered {
        agent_id: String,
        released_claims: usize,
        unregistered_at: DateTime<Utc>,
    },
    TaskClaimed {
        task_id: String,
        agent_id: String,
        lease_expires_at: DateTime<Utc>,
    },
    ClaimReleased {
        task_id: String,
        agent_id: String,
        released_at: DateTime<Utc>,
    },
    ClaimExpired {
        task_id: String,
        agent_id: String,
        expired_at: DateTime<Utc>,
    },
    DeadlockDetected {
        tasks: Vec<String>,
        severity: String,
        detected_at: DateTime<Utc>,
    },
    ConflictEscalated {
        conflict_id: uuid::Uuid,
        task_id: String,
        escalated_at: DateTime<Utc>,
    },
}
