// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Conflict Resolver
//!
//! Detects divergent modifications to a task and resolves them with the
//! strategy fixed for each [`ConflictType`]. Every detected conflict leaves a
//! [`ConflictRecord`] in the resolver's history.
//!
//! ## Flow
//!
//! ```text
//! apply_modification_with_retry(current, m)
//!   ├─ detect_conflict == None  → apply m directly (state change validated)
//!   └─ Some(type)               → open record, resolve against
//!                                 [snapshot(current), m] up to max_retries
//!                                 ├─ Escalated → returned at once
//!                                 └─ other err → back off, try again
//! ```

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use taskmesh_core::domain::config::ConflictConfig;
use taskmesh_core::domain::events::CoordinationEvent;
use taskmesh_core::domain::task::{Task, TaskState};
use taskmesh_core::domain::transition::StateTransitionMachine;
use taskmesh_core::infrastructure::event_bus::EventBus;

use crate::domain::conflict::{
    ConflictError, ConflictRecord, ConflictStatistics, ConflictStatus, ConflictType, ResolutionStrategy,
    TaskModification, TaskPatch,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ConflictSettings {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for ConflictSettings {
    fn default() -> Self {
        Self::from(&ConflictConfig::default())
    }
}

impl From<&ConflictConfig> for ConflictSettings {
    fn from(config: &ConflictConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            base_backoff: config.base_backoff(),
        }
    }
}

pub struct ConflictResolver {
    settings: ConflictSettings,
    machine: StateTransitionMachine,
    history: Mutex<Vec<ConflictRecord>>,
    event_bus: Option<EventBus>,
}

impl ConflictResolver {
    pub fn new(settings: ConflictSettings) -> Self {
        Self {
            settings,
            machine: StateTransitionMachine::new(),
            history: Mutex::new(Vec::new()),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn detect_conflict(&self, current: &Task, modification: &TaskModification) -> Option<ConflictType> {
        let patch = &modification.patch;

        if current.version != modification.previous_version {
            return Some(ConflictType::VersionMismatch);
        }

        if let Some(state) = patch.state {
            if state != current.state && current.updated_at > modification.timestamp {
                return Some(ConflictType::ConcurrentStateChange);
            }
        }

        if let (Some(ours), Some(theirs)) = (&current.assigned_to, &patch.assigned_to) {
            if ours != theirs {
                return Some(ConflictType::AssignmentConflict);
            }
        }

        if let Some(deps) = &patch.depends_on {
            if !current.depends_on.is_empty() && !deps.is_empty() && as_set(deps) != as_set(&current.depends_on) {
                return Some(ConflictType::DependencyConflict);
            }
        }

        let metadata_clash = patch
            .metadata
            .iter()
            .any(|(key, value)| current.metadata.get(key).is_some_and(|existing| existing != value));
        if metadata_clash {
            return Some(ConflictType::MetadataConflict);
        }

        None
    }

    /// Resolve `modifications` against `current` using `record.strategy`.
    ///
    /// The record is updated with the outcome and stored in the history.
    pub fn resolve_conflict(
        &self,
        record: &mut ConflictRecord,
        current: &Task,
        modifications: &[TaskModification],
    ) -> Result<Task, ConflictError> {
        if modifications.is_empty() {
            return Err(ConflictError::NoModifications(record.conflict_id));
        }

        let outcome = match record.strategy {
            ResolutionStrategy::LastWriterWins => {
                let winner = modifications.iter().max_by_key(|m| m.timestamp);
                winner.map(|m| self.overwrite(current, &m.patch)).transpose()
            }
            ResolutionStrategy::FirstWriterWins => {
                let winner = modifications.iter().min_by_key(|m| m.timestamp);
                winner.map(|m| self.overwrite(current, &m.patch)).transpose()
            }
            ResolutionStrategy::MergeChanges => self.merge(current, modifications).map(Some),
            ResolutionStrategy::EscalateToHuman => {
                self.escalate(record, current, modifications);
                return Err(ConflictError::Escalated {
                    conflict_id: record.conflict_id,
                    task_id: record.task_id.clone(),
                });
            }
            ResolutionStrategy::RejectConflict => {
                record.status = ConflictStatus::Failed;
                record.resolved_at = Some(Utc::now());
                self.store(record);
                warn!(conflict_id = %record.conflict_id, task_id = %record.task_id, "Conflict rejected");
                return Err(ConflictError::Rejected {
                    conflict_id: record.conflict_id,
                    task_id: record.task_id.clone(),
                });
            }
        };

        match outcome {
            Ok(Some(task)) => {
                record.status = ConflictStatus::Resolved;
                record.resolved_at = Some(Utc::now());
                record.resolved_version = Some(task.version);
                self.store(record);
                info!(
                    conflict_id = %record.conflict_id,
                    task_id = %task.id,
                    strategy = ?record.strategy,
                    version = task.version,
                    "Conflict resolved"
                );
                Ok(task)
            }
            Ok(None) => Err(ConflictError::NoModifications(record.conflict_id)),
            Err(err) => {
                record.status = ConflictStatus::Failed;
                self.store(record);
                Err(err)
            }
        }
    }

    /// Apply `modification` to `current`, resolving a conflict if one is detected.
    pub async fn apply_modification_with_retry(
        &self,
        current: &Task,
        modification: &TaskModification,
    ) -> Result<Task, ConflictError> {
        let Some(conflict_type) = self.detect_conflict(current, modification) else {
            return self.apply_modification(current, modification);
        };

        let mut record = ConflictRecord::open(conflict_type, current, std::slice::from_ref(modification));
        metrics::counter!("taskmesh_conflicts_total", "type" => conflict_type.as_str()).increment(1);
        warn!(
            conflict_id = %record.conflict_id,
            task_id = %current.id,
            conflict_type = conflict_type.as_str(),
            agent_id = %modification.agent_id,
            "Conflict detected"
        );
        self.store(&record);

        let competing = [snapshot_of(current), modification.clone()];
        let mut last_error = None;
        for attempt in 0..self.settings.max_retries {
            match self.resolve_conflict(&mut record, current, &competing) {
                Ok(task) => return Ok(task),
                Err(err) if err.is_escalation() => return Err(err),
                Err(err) => {
                    let delay = self.settings.base_backoff * 2u32.saturating_pow(attempt);
                    debug!(
                        conflict_id = %record.conflict_id,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Conflict resolution attempt failed"
                    );
                    last_error = Some(err);
                    if attempt + 1 < self.settings.max_retries {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(ConflictError::RetriesExhausted {
            task_id: current.id.clone(),
            attempts: self.settings.max_retries,
            last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    /// Apply a non-conflicting modification. Any state change must be a
    /// legal edge of the state machine.
    pub fn apply_modification(&self, current: &Task, modification: &TaskModification) -> Result<Task, ConflictError> {
        let mut patch = modification.patch.clone();
        let target_state = patch.state.take();
        let staged = patch.overwrite_onto(current);

        let next = match target_state {
            Some(state) if state != current.state => self.machine.transition_task(&staged, state, None)?,
            _ => {
                let mut next = staged;
                next.version = current.version + 1;
                next.updated_at = Utc::now();
                next
            }
        };

        debug!(task_id = %next.id, agent_id = %modification.agent_id, version = next.version, "Modification applied");
        Ok(next)
    }

    pub fn history(&self) -> Vec<ConflictRecord> {
        self.history.lock().clone()
    }

    pub fn escalated(&self) -> Vec<ConflictRecord> {
        self.history
            .lock()
            .iter()
            .filter(|r| r.status == ConflictStatus::Escalated)
            .cloned()
            .collect()
    }

    pub fn record(&self, conflict_id: Uuid) -> Option<ConflictRecord> {
        self.history.lock().iter().find(|r| r.conflict_id == conflict_id).cloned()
    }

    pub fn statistics(&self) -> ConflictStatistics {
        let history = self.history.lock();
        let mut stats = ConflictStatistics {
            total: history.len(),
            ..Default::default()
        };
        for record in history.iter() {
            *stats.by_type.entry(record.conflict_type).or_default() += 1;
            *stats.by_status.entry(record.status).or_default() += 1;
        }
        stats
    }

    fn overwrite(&self, current: &Task, patch: &TaskPatch) -> Result<Task, ConflictError> {
        let mut patch = patch.clone();
        let target = patch.state.take().unwrap_or(current.state);
        let candidate = patch.overwrite_onto(current);
        self.settle(current, candidate, target)
    }

    fn merge(&self, current: &Task, modifications: &[TaskModification]) -> Result<Task, ConflictError> {
        let mut ordered: Vec<&TaskModification> = modifications.iter().collect();
        ordered.sort_by_key(|m| m.timestamp);

        let mut merged = current.clone();
        for modification in ordered {
            let patch = &modification.patch;
            for (key, value) in &patch.metadata {
                merged.metadata.insert(key.clone(), value.clone());
            }
            if let Some(deps) = &patch.depends_on {
                union_into(&mut merged.depends_on, deps);
            }
            if let Some(subtasks) = &patch.subtask_ids {
                union_into(&mut merged.subtask_ids, subtasks);
            }

            if let Some(title) = patch.title.as_ref().filter(|t| **t != current.title) {
                merged.title = title.clone();
            }
            if let Some(description) = patch.description.as_ref().filter(|d| **d != current.description) {
                merged.description = description.clone();
            }
            if let Some(state) = patch.state.filter(|s| *s != current.state) {
                merged.state = state;
            }
            if let Some(agent) = patch.assigned_to.as_ref().filter(|a| current.assigned_to.as_ref() != Some(*a)) {
                merged.assigned_to = Some(agent.clone());
            }
            if let Some(reason) = patch
                .blocking_reason
                .as_ref()
                .filter(|r| current.blocking_reason.as_ref() != Some(*r))
            {
                merged.blocking_reason = Some(reason.clone());
            }
        }

        let target = merged.state;
        merged.state = current.state;
        self.settle(current, merged, target)
    }

    /// Move a resolved candidate (still in `current.state`) into `target`
    /// through the state machine, then stamp a single version bump.
    fn settle(&self, current: &Task, candidate: Task, target: TaskState) -> Result<Task, ConflictError> {
        let mut next = if target == current.state {
            candidate
        } else {
            self.machine.transition_task(&candidate, target, None)?
        };
        next.created_at = current.created_at;
        next.version = current.version + 1;
        next.updated_at = Utc::now();
        Ok(next)
    }

    fn escalate(&self, record: &mut ConflictRecord, current: &Task, modifications: &[TaskModification]) {
        record.status = ConflictStatus::Escalated;
        record.escalation_snapshot = Some(serde_json::json!({
            "conflict_id": record.conflict_id,
            "conflict_type": record.conflict_type,
            "current": current,
            "modifications": modifications,
        }));
        self.store(record);

        warn!(
            conflict_id = %record.conflict_id,
            task_id = %record.task_id,
            agents = ?record.agents,
            "Conflict escalated for human review"
        );
        if let Some(bus) = &self.event_bus {
            bus.publish_coordination_event(CoordinationEvent::ConflictEscalated {
                conflict_id: record.conflict_id,
                task_id: record.task_id.clone(),
                escalated_at: Utc::now(),
            });
        }
    }

    /// Insert or replace by conflict id.
    fn store(&self, record: &ConflictRecord) {
        let mut history = self.history.lock();
        match history.iter_mut().find(|r| r.conflict_id == record.conflict_id) {
            Some(existing) => *existing = record.clone(),
            None => history.push(record.clone()),
        }
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new(ConflictSettings::default())
    }
}

/// The stored task expressed as a modification, stamped at its last update.
fn snapshot_of(task: &Task) -> TaskModification {
    let patch = TaskPatch {
        title: Some(task.title.clone()),
        description: Some(task.description.clone()),
        state: Some(task.state),
        assigned_to: task.assigned_to.clone(),
        blocking_reason: task.blocking_reason.clone(),
        depends_on: Some(task.depends_on.clone()),
        subtask_ids: Some(task.subtask_ids.clone()),
        metadata: task.metadata.clone(),
    };
    let agent = task.assigned_to.clone().unwrap_or_else(|| "stored".to_string());
    TaskModification::new(task.id.clone(), agent, task.version, patch).at(task.updated_at)
}

fn as_set(items: &[String]) -> BTreeSet<&str> {
    items.iter().map(String::as_str).collect()
}

fn union_into(target: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use std::collections::BTreeMap;
    use taskmesh_core::domain::transition::TransitionError;

    fn fast() -> ConflictResolver {
        ConflictResolver::new(ConflictSettings {
            max_retries: 3,
            base_backoff: Duration::from_millis(1),
        })
    }

    fn patch_deps(deps: &[&str]) -> TaskPatch {
        TaskPatch {
            depends_on: Some(deps.iter().map(|d| d.to_string()).collect()),
            ..Default::default()
        }
    }

    #[test]
    fn test_detection_order() {
        let resolver = fast();
        let current = Task::new("t", "T").with_assignee("alice").with_dependencies(["a"]);

        let stale = TaskModification::new("t", "bob", 0, TaskPatch::default());
        assert_eq!(resolver.detect_conflict(&current, &stale), Some(ConflictType::VersionMismatch));

        let old_state = TaskModification::new(
            "t",
            "bob",
            1,
            TaskPatch {
                state: Some(TaskState::Assigned),
                ..Default::default()
            },
        )
        .at(current.updated_at - ChronoDuration::seconds(5));
        assert_eq!(
            resolver.detect_conflict(&current, &old_state),
            Some(ConflictType::ConcurrentStateChange)
        );

        let reassign = TaskModification::new(
            "t",
            "bob",
            1,
            TaskPatch {
                assigned_to: Some("bob".into()),
                ..Default::default()
            },
        );
        assert_eq!(
            resolver.detect_conflict(&current, &reassign),
            Some(ConflictType::AssignmentConflict)
        );

        let deps = TaskModification::new("t", "bob", 1, patch_deps(&["b"]));
        assert_eq!(resolver.detect_conflict(&current, &deps), Some(ConflictType::DependencyConflict));

        let same_deps = TaskModification::new("t", "bob", 1, patch_deps(&["a"]));
        assert_eq!(resolver.detect_conflict(&current, &same_deps), None);
    }

    #[test]
    fn test_metadata_overlap_is_a_conflict() {
        let resolver = fast();
        let current = Task::new("t", "T").with_metadata("priority", json!("low"));
        let modification = TaskModification::new(
            "t",
            "bob",
            1,
            TaskPatch {
                metadata: BTreeMap::from([("priority".to_string(), json!("high"))]),
                ..Default::default()
            },
        );
        assert_eq!(
            resolver.detect_conflict(&current, &modification),
            Some(ConflictType::MetadataConflict)
        );
    }

    #[tokio::test]
    async fn test_clean_modification_applies_directly() {
        let resolver = fast();
        let current = Task::new("t", "T").with_assignee("alice");
        let modification = TaskModification::new(
            "t",
            "alice",
            1,
            TaskPatch {
                state: Some(TaskState::InProgress),
                description: Some("started".into()),
                ..Default::default()
            },
        );

        let next = resolver.apply_modification_with_retry(&current, &modification).await.unwrap();
        assert_eq!(next.version, 2);
        assert_eq!(next.state, TaskState::InProgress);
        assert!(next.started_at.is_some());
        assert!(resolver.history().is_empty());
    }

    #[test]
    fn test_direct_apply_rejects_illegal_state() {
        let resolver = fast();
        let current = Task::new("t", "T");
        let modification = TaskModification::new(
            "t",
            "bob",
            1,
            TaskPatch {
                state: Some(TaskState::Completed),
                ..Default::default()
            },
        );
        assert!(matches!(
            resolver.apply_modification(&current, &modification),
            Err(ConflictError::Transition(TransitionError::InvalidTransition { .. }))
        ));
    }

    #[tokio::test]
    async fn test_stale_write_is_merged_not_lost() {
        let resolver = fast();
        let mut current = Task::new("t", "T").with_dependencies(["a"]);
        current.version = 3;

        let modification = TaskModification::new("t", "bob", 2, patch_deps(&["b"]));
        let merged = resolver.apply_modification_with_retry(&current, &modification).await.unwrap();

        assert_eq!(merged.version, 4);
        assert_eq!(merged.depends_on, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(merged.created_at, current.created_at);

        let history = resolver.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].conflict_type, ConflictType::VersionMismatch);
        assert_eq!(history[0].status, ConflictStatus::Resolved);
        assert_eq!(history[0].resolved_version, Some(4));
    }

    #[tokio::test]
    async fn test_assignment_conflict_escalates_without_retry() {
        let resolver = fast();
        let current = Task::new("t", "T").with_assignee("alice");
        let modification = TaskModification::new(
            "t",
            "bob",
            1,
            TaskPatch {
                assigned_to: Some("bob".into()),
                ..Default::default()
            },
        );

        let err = resolver
            .apply_modification_with_retry(&current, &modification)
            .await
            .unwrap_err();
        assert!(err.is_escalation());

        let escalated = resolver.escalated();
        assert_eq!(escalated.len(), 1);
        let snapshot = escalated[0].escalation_snapshot.as_ref().unwrap();
        assert_eq!(snapshot["current"]["assigned_to"], json!("alice"));
        assert_eq!(snapshot["modifications"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_state_change_last_writer_wins() {
        let resolver = fast();
        let mut current = Task::new("t", "T").with_assignee("alice");
        current.state = TaskState::InProgress;

        // Stored record is newer than the proposal, so the stored state wins
        let modification = TaskModification::new(
            "t",
            "alice",
            1,
            TaskPatch {
                state: Some(TaskState::Assigned),
                ..Default::default()
            },
        )
        .at(current.updated_at - ChronoDuration::seconds(1));

        let resolved = resolver.apply_modification_with_retry(&current, &modification).await.unwrap();
        assert_eq!(resolved.state, TaskState::InProgress);
        assert_eq!(resolved.version, 2);
    }

    #[test]
    fn test_first_writer_wins_and_reject() {
        let resolver = fast();
        let current = Task::new("t", "T");
        let now = Utc::now();
        let early = TaskModification::new(
            "t",
            "a",
            1,
            TaskPatch {
                title: Some("early".into()),
                ..Default::default()
            },
        )
        .at(now - ChronoDuration::seconds(2));
        let late = TaskModification::new(
            "t",
            "b",
            1,
            TaskPatch {
                title: Some("late".into()),
                ..Default::default()
            },
        )
        .at(now);

        let mods = [late.clone(), early.clone()];
        let mut record = ConflictRecord::open(ConflictType::VersionMismatch, &current, &mods);
        record.strategy = ResolutionStrategy::FirstWriterWins;
        assert_eq!(resolver.resolve_conflict(&mut record, &current, &mods).unwrap().title, "early");

        record.strategy = ResolutionStrategy::LastWriterWins;
        assert_eq!(resolver.resolve_conflict(&mut record, &current, &mods).unwrap().title, "late");

        let mut rejected = ConflictRecord::open(ConflictType::VersionMismatch, &current, &mods);
        rejected.strategy = ResolutionStrategy::RejectConflict;
        assert!(matches!(
            resolver.resolve_conflict(&mut rejected, &current, &mods),
            Err(ConflictError::Rejected { .. })
        ));
        assert!(matches!(
            resolver.resolve_conflict(&mut rejected, &current, &[]),
            Err(ConflictError::NoModifications(_))
        ));
    }

    #[tokio::test]
    async fn test_unmergeable_state_exhausts_retries() {
        let resolver = fast();
        let mut current = Task::new("t", "T");
        current.state = TaskState::Completed;
        current.version = 5;

        let modification = TaskModification::new(
            "t",
            "bob",
            4,
            TaskPatch {
                state: Some(TaskState::NotStarted),
                ..Default::default()
            },
        );

        let err = resolver
            .apply_modification_with_retry(&current, &modification)
            .await
            .unwrap_err();
        assert!(matches!(err, ConflictError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(resolver.history()[0].status, ConflictStatus::Failed);
    }

    fn in_progress() -> Task {
        let machine = StateTransitionMachine::new();
        let task = machine.assign(&Task::new("t", "T"), "alice", None).unwrap();
        machine.transition_task(&task, TaskState::InProgress, None).unwrap()
    }

    fn patch_state(state: TaskState) -> TaskPatch {
        TaskPatch {
            state: Some(state),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_merged_block_without_reason_fails_guard() {
        let resolver = fast();
        let current = in_progress();
        assert_eq!(current.version, 3);

        let stale = TaskModification::new("t", "bob", 2, patch_state(TaskState::Blocked));
        let mods = [stale.clone()];
        let mut record = ConflictRecord::open(ConflictType::VersionMismatch, &current, &mods);
        assert_eq!(record.strategy, ResolutionStrategy::MergeChanges);
        assert!(matches!(
            resolver.resolve_conflict(&mut record, &current, &mods),
            Err(ConflictError::Transition(TransitionError::GuardFailed { .. }))
        ));
        assert_eq!(resolver.record(record.conflict_id).unwrap().status, ConflictStatus::Failed);

        let err = resolver.apply_modification_with_retry(&current, &stale).await.unwrap_err();
        assert!(matches!(err, ConflictError::RetriesExhausted { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_merged_block_with_reason_stamps_blocked_at() {
        let resolver = fast();
        let current = in_progress();
        let stale = TaskModification::new(
            "t",
            "bob",
            2,
            TaskPatch {
                state: Some(TaskState::Blocked),
                blocking_reason: Some("waiting on review".into()),
                ..Default::default()
            },
        );

        let merged = resolver.apply_modification_with_retry(&current, &stale).await.unwrap();
        assert_eq!(merged.state, TaskState::Blocked);
        assert_eq!(merged.blocking_reason.as_deref(), Some("waiting on review"));
        assert!(merged.blocked_at.is_some());
        assert_eq!(merged.version, current.version + 1);
    }

    #[test]
    fn test_merged_start_stamps_started_at() {
        let resolver = fast();
        let mut current = Task::new("t", "T");
        current.version = 2;

        let mods = [TaskModification::new(
            "t",
            "bob",
            1,
            TaskPatch {
                state: Some(TaskState::InProgress),
                assigned_to: Some("bob".into()),
                ..Default::default()
            },
        )];
        let mut record = ConflictRecord::open(ConflictType::VersionMismatch, &current, &mods);
        let merged = resolver.resolve_conflict(&mut record, &current, &mods).unwrap();

        assert_eq!(merged.state, TaskState::InProgress);
        assert_eq!(merged.assigned_to.as_deref(), Some("bob"));
        assert!(merged.started_at.is_some());
        assert_eq!(merged.version, 3);
        assert_eq!(record.resolved_version, Some(3));
    }

    #[test]
    fn test_merged_start_without_assignee_fails_guard() {
        let resolver = fast();
        let mut current = Task::new("t", "T");
        current.version = 2;

        let mods = [TaskModification::new("t", "bob", 1, patch_state(TaskState::InProgress))];
        let mut record = ConflictRecord::open(ConflictType::VersionMismatch, &current, &mods);
        assert!(matches!(
            resolver.resolve_conflict(&mut record, &current, &mods),
            Err(ConflictError::Transition(TransitionError::GuardFailed { .. }))
        ));
    }

    #[test]
    fn test_winning_overwrite_runs_state_guards() {
        let resolver = fast();
        let current = in_progress();
        let mods = [
            TaskModification::new("t", "bob", 2, patch_state(TaskState::Blocked)),
            TaskModification::new("t", "carol", 2, patch_state(TaskState::Completed))
                .at(current.updated_at - ChronoDuration::seconds(5)),
        ];

        let mut record = ConflictRecord::open(ConflictType::ConcurrentStateChange, &current, &mods);
        record.strategy = ResolutionStrategy::LastWriterWins;
        assert!(matches!(
            resolver.resolve_conflict(&mut record, &current, &mods),
            Err(ConflictError::Transition(TransitionError::GuardFailed { .. }))
        ));

        record.strategy = ResolutionStrategy::FirstWriterWins;
        let completed = resolver.resolve_conflict(&mut record, &current, &mods).unwrap();
        assert_eq!(completed.state, TaskState::Completed);
        assert!(completed.completed_at.is_some());
        assert_eq!(completed.version, current.version + 1);
    }

    #[test]
    fn test_statistics_by_type_and_status() {
        let resolver = fast();
        let current = Task::new("t", "T");
        let mods = [TaskModification::new("t", "a", 0, TaskPatch::default())];

        let mut merged = ConflictRecord::open(ConflictType::VersionMismatch, &current, &mods);
        resolver.resolve_conflict(&mut merged, &current, &mods).unwrap();
        let mut escalated = ConflictRecord::open(ConflictType::AssignmentConflict, &current, &mods);
        let _ = resolver.resolve_conflict(&mut escalated, &current, &mods);

        let stats = resolver.statistics();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_type[&ConflictType::VersionMismatch], 1);
        assert_eq!(stats.by_status[&ConflictStatus::Escalated], 1);
        assert_eq!(stats.by_status[&ConflictStatus::Resolved], 1);
    }
}
