// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Conflict Types
//!
//! A conflict is two version-divergent proposed updates to the same task.
//! Each [`ConflictType`] maps to exactly one default [`ResolutionStrategy`]
//! through a fixed `match`, so resolution behaviour is visible in one place:
//!
//! | Conflict | Strategy |
//! |----------|----------|
//! | `VERSION_MISMATCH` | `MERGE_CHANGES` |
//! | `CONCURRENT_STATE_CHANGE` | `LAST_WRITER_WINS` |
//! | `ASSIGNMENT_CONFLICT` | `ESCALATE_TO_HUMAN` |
//! | `DEPENDENCY_CONFLICT` | `MERGE_CHANGES` |
//! | `METADATA_CONFLICT` | `MERGE_CHANGES` |

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use taskmesh_core::domain::task::{Task, TaskState};
use taskmesh_core::domain::transition::TransitionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    VersionMismatch,
    ConcurrentStateChange,
    AssignmentConflict,
    DependencyConflict,
    MetadataConflict,
}

impl ConflictType {
    pub fn default_strategy(&self) -> ResolutionStrategy {
        match self {
            ConflictType::VersionMismatch => ResolutionStrategy::MergeChanges,
            ConflictType::ConcurrentStateChange => ResolutionStrategy::LastWriterWins,
            ConflictType::AssignmentConflict => ResolutionStrategy::EscalateToHuman,
            ConflictType::DependencyConflict => ResolutionStrategy::MergeChanges,
            ConflictType::MetadataConflict => ResolutionStrategy::MergeChanges,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::VersionMismatch => "VERSION_MISMATCH",
            ConflictType::ConcurrentStateChange => "CONCURRENT_STATE_CHANGE",
            ConflictType::AssignmentConflict => "ASSIGNMENT_CONFLICT",
            ConflictType::DependencyConflict => "DEPENDENCY_CONFLICT",
            ConflictType::MetadataConflict => "METADATA_CONFLICT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStrategy {
    LastWriterWins,
    FirstWriterWins,
    MergeChanges,
    EscalateToHuman,
    RejectConflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStatus {
    Open,
    Resolved,
    Escalated,
    Failed,
}

/// Field-level changes proposed by one agent. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<TaskState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtask_ids: Option<Vec<String>>,
    /// Keys to upsert; existing keys not named here are kept.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl TaskPatch {
    /// Overwrite every field this patch names onto a copy of `base`.
    ///
    /// Version and timestamps are left for the caller to stamp.
    pub fn overwrite_onto(&self, base: &Task) -> Task {
        let mut task = base.clone();
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(state) = self.state {
            task.state = state;
        }
        if let Some(agent) = &self.assigned_to {
            task.assigned_to = Some(agent.clone());
        }
        if let Some(reason) = &self.blocking_reason {
            task.blocking_reason = Some(reason.clone());
        }
        if let Some(deps) = &self.depends_on {
            task.depends_on = deps.clone();
        }
        if let Some(subtasks) = &self.subtask_ids {
            task.subtask_ids = subtasks.clone();
        }
        for (key, value) in &self.metadata {
            task.metadata.insert(key.clone(), value.clone());
        }
        task
    }
}

/// One agent's proposed update to a task, based on `previous_version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskModification {
    pub modification_id: Uuid,
    pub task_id: String,
    pub agent_id: String,
    pub previous_version: u64,
    pub timestamp: DateTime<Utc>,
    pub patch: TaskPatch,
}

impl TaskModification {
    pub fn new(
        task_id: impl Into<String>,
        agent_id: impl Into<String>,
        previous_version: u64,
        patch: TaskPatch,
    ) -> Self {
        Self {
            modification_id: Uuid::new_v4(),
            task_id: task_id.into(),
            agent_id: agent_id.into(),
            previous_version,
            timestamp: Utc::now(),
            patch,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Audit record of one detected conflict. Only the resolution fields are
/// ever filled in after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub conflict_id: Uuid,
    pub task_id: String,
    pub conflict_type: ConflictType,
    pub strategy: ResolutionStrategy,
    pub status: ConflictStatus,
    /// Current version first, then each modification's base version.
    pub competing_versions: Vec<u64>,
    pub agents: Vec<String>,
    pub detected_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_snapshot: Option<serde_json::Value>,
}

impl ConflictRecord {
    pub fn open(conflict_type: ConflictType, current: &Task, modifications: &[TaskModification]) -> Self {
        let mut competing_versions = vec![current.version];
        competing_versions.extend(modifications.iter().map(|m| m.previous_version));
        let mut agents: Vec<String> = current.assigned_to.iter().cloned().collect();
        for m in modifications {
            if !agents.contains(&m.agent_id) {
                agents.push(m.agent_id.clone());
            }
        }

        Self {
            conflict_id: Uuid::new_v4(),
            task_id: current.id.clone(),
            conflict_type,
            strategy: conflict_type.default_strategy(),
            status: ConflictStatus::Open,
            competing_versions,
            agents,
            detected_at: Utc::now(),
            resolved_at: None,
            resolved_version: None,
            escalation_snapshot: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConflictError {
    #[error("Conflict {conflict_id} on task '{task_id}' escalated for human review")]
    Escalated { conflict_id: Uuid, task_id: String },

    #[error("Conflict {conflict_id} on task '{task_id}' rejected")]
    Rejected { conflict_id: Uuid, task_id: String },

    #[error("No modifications supplied for conflict {0}")]
    NoModifications(Uuid),

    #[error("Conflict on task '{task_id}' unresolved after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        task_id: String,
        attempts: u32,
        last_error: String,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl ConflictError {
    /// Escalation is terminal: waiting and retrying cannot resolve it.
    pub fn is_escalation(&self) -> bool {
        matches!(self, ConflictError::Escalated { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictStatistics {
    pub total: usize,
    pub by_type: BTreeMap<ConflictType, usize>,
    pub by_status: BTreeMap<ConflictStatus, usize>,
}
