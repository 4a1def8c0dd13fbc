// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Task & Project Aggregates
//!
//! Defines the unit of schedulable work ([`Task`]) and the collection that
//! exclusively owns it ([`Project`]).
//!
//! ## Versioning
//!
//! Every accepted mutation of a `Task` produces a new value whose `version`
//! is exactly one greater than its predecessor. [`Project::commit`] enforces
//! this: a write whose version does not directly follow the stored record is
//! rejected with a [`ConcurrencyError`] instead of overwriting it.
//!
//! Tasks are never mutated in place by the engine. The state machine and the
//! conflict resolver both produce fresh values so the previous version stays
//! inspectable for audit and rollback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Metadata key holding the capability tags an agent needs to run a task.
pub const REQUIRED_CAPABILITIES_KEY: &str = "required_capabilities";

/// Lifecycle state of a [`Task`].
///
/// Serialized in SCREAMING_SNAKE_CASE; the legacy `PENDING` spelling is
/// accepted as an alias of `NOT_STARTED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    #[serde(alias = "PENDING")]
    NotStarted,
    Assigned,
    InProgress,
    Completed,
    Blocked,
    Cancelled,
}

impl TaskState {
    /// Terminal states have no outgoing edges.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::NotStarted => "NOT_STARTED",
            TaskState::Assigned => "ASSIGNED",
            TaskState::InProgress => "IN_PROGRESS",
            TaskState::Completed => "COMPLETED",
            TaskState::Blocked => "BLOCKED",
            TaskState::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A schedulable unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,

    /// Ids of tasks that must be COMPLETED before this one may start.
    /// Order is preserved; duplicates are never stored.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Ids of tasks spawned/owned by this one.
    #[serde(default)]
    pub subtask_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    /// Optimistic concurrency counter, starts at 1.
    pub version: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_at: Option<DateTime<Utc>>,

    /// Required (non-empty) to enter BLOCKED, must be cleared to leave it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking_reason: Option<String>,

    /// Integration-specific data (e.g. `required_capabilities`).
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            depends_on: Vec::new(),
            subtask_ids: Vec::new(),
            parent_id: None,
            state: TaskState::NotStarted,
            assigned_to: None,
            version: 1,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            blocked_at: None,
            blocking_reason: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dep in deps {
            self.add_dependency(dep);
        }
        self
    }

    pub fn with_assignee(mut self, agent_id: impl Into<String>) -> Self {
        self.assigned_to = Some(agent_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_required_capabilities<I, S>(self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let caps: Vec<serde_json::Value> = capabilities
            .into_iter()
            .map(|c| serde_json::Value::String(c.into()))
            .collect();
        self.with_metadata(REQUIRED_CAPABILITIES_KEY, serde_json::Value::Array(caps))
    }

    /// Append a dependency, keeping the list duplicate-free. Returns `false`
    /// when the dependency was already present.
    pub fn add_dependency(&mut self, dep: impl Into<String>) -> bool {
        let dep = dep.into();
        if self.depends_on.contains(&dep) {
            return false;
        }
        self.depends_on.push(dep);
        true
    }

    /// Capability tags listed under `metadata.required_capabilities`.
    /// Non-string entries are ignored.
    pub fn required_capabilities(&self) -> Vec<String> {
        match self.metadata.get(REQUIRED_CAPABILITIES_KEY) {
            Some(serde_json::Value::Array(values)) => values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(serde_json::Value::String(single)) => vec![single.clone()],
            _ => Vec::new(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state == TaskState::Completed
    }
}

/// Optimistic-lock violation: the writer's expected version is stale.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Version conflict on task '{task_id}': expected {expected}, found {actual}")]
pub struct ConcurrencyError {
    pub task_id: String,
    pub expected: u64,
    pub actual: u64,
}

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Task '{0}' already exists in project")]
    DuplicateTask(String),

    #[error("Task '{0}' not found in project")]
    TaskNotFound(String),

    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),
}

/// Named collection of tasks keyed by id. Owns its tasks exclusively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tasks: BTreeMap<String, Task>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            tasks: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Insert a new task. Existing ids are never overwritten.
    pub fn add_task(&mut self, task: Task) -> Result<(), ProjectError> {
        if self.tasks.contains_key(&task.id) {
            return Err(ProjectError::DuplicateTask(task.id));
        }
        self.tasks.insert(task.id.clone(), task);
        self.touch();
        Ok(())
    }

    pub fn get_task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Replace a stored task with its successor value.
    ///
    /// The successor must carry exactly `stored.version + 1`; anything else
    /// means another writer got there first and the write is rejected.
    pub fn commit(&mut self, task: Task) -> Result<(), ProjectError> {
        let stored = self
            .tasks
            .get(&task.id)
            .ok_or_else(|| ProjectError::TaskNotFound(task.id.clone()))?;

        if task.version != stored.version + 1 {
            return Err(ConcurrencyError {
                task_id: task.id.clone(),
                expected: stored.version + 1,
                actual: task.version,
            }
            .into());
        }

        self.tasks.insert(task.id.clone(), task);
        self.touch();
        Ok(())
    }

    /// Link `child` under `parent`: sets the child's `parent_id` and appends
    /// it to the parent's `subtask_ids`. Both records get a version bump.
    pub fn add_subtask(&mut self, parent_id: &str, child_id: &str) -> Result<(), ProjectError> {
        if !self.tasks.contains_key(child_id) {
            return Err(ProjectError::TaskNotFound(child_id.to_string()));
        }
        let now = Utc::now();

        let parent = self
            .tasks
            .get_mut(parent_id)
            .ok_or_else(|| ProjectError::TaskNotFound(parent_id.to_string()))?;
        if !parent.subtask_ids.iter().any(|s| s == child_id) {
            parent.subtask_ids.push(child_id.to_string());
            parent.version += 1;
            parent.updated_at = now;
        }

        if let Some(child) = self.tasks.get_mut(child_id) {
            if child.parent_id.as_deref() != Some(parent_id) {
                child.parent_id = Some(parent_id.to_string());
                child.version += 1;
                child.updated_at = now;
            }
        }

        self.touch();
        Ok(())
    }

    pub fn tasks_in_state(&self, state: TaskState) -> Vec<&Task> {
        self.tasks.values().filter(|t| t.state == state).collect()
    }

    /// Fraction of tasks COMPLETED, `1.0` for an empty project.
    pub fn completion_ratio(&self) -> f64 {
        if self.tasks.is_empty() {
            return 1.0;
        }
        let done = self.tasks.values().filter(|t| t.is_completed()).count();
        done as f64 / self.tasks.len() as f64
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
