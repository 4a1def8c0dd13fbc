// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Task State Transition Machine
//!
//! Validates and applies [`TaskState`] changes under optimistic locking.
//!
//! ## Transition Table
//!
//! | From | To | Guard | Side effect |
//! |------|----|-------|-------------|
//! | NOT_STARTED | ASSIGNED | assignee set | - |
//! | NOT_STARTED | IN_PROGRESS | assignee set | stamp `started_at` |
//! | ASSIGNED | IN_PROGRESS | - | stamp `started_at` |
//! | ASSIGNED | NOT_STARTED | - | clear `assigned_to` |
//! | IN_PROGRESS | COMPLETED | - | stamp `completed_at` |
//! | IN_PROGRESS | BLOCKED | non-empty `blocking_reason` | stamp `blocked_at` |
//! | IN_PROGRESS | CANCELLED | - | stamp `cancelled_at` |
//! | BLOCKED | IN_PROGRESS | `blocking_reason` cleared | - |
//! | BLOCKED | CANCELLED | - | stamp `cancelled_at` |
//!
//! The table is a fixed `match`, not a runtime-patchable registry.
//!
//! Every accepted transition returns a **new** [`Task`] with `version + 1`
//! and a fresh `updated_at`; the caller's value is never touched.

use crate::domain::task::{ConcurrencyError, Task, TaskState};
use chrono::{DateTime, Utc};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    RequiresAssignee,
    RequiresBlockingReason,
    RequiresBlockingReasonCleared,
}

impl Guard {
    fn check(&self, task: &Task) -> Result<(), String> {
        match self {
            Guard::RequiresAssignee => match task.assigned_to.as_deref() {
                Some(agent) if !agent.trim().is_empty() => Ok(()),
                _ => Err("task has no assignee".to_string()),
            },
            Guard::RequiresBlockingReason => match task.blocking_reason.as_deref() {
                Some(reason) if !reason.trim().is_empty() => Ok(()),
                _ => Err("blocking_reason must be provided".to_string()),
            },
            Guard::RequiresBlockingReasonCleared => match task.blocking_reason.as_deref() {
                Some(reason) if !reason.trim().is_empty() => {
                    Err(format!("task is still blocked: {}", reason))
                }
                _ => Ok(()),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    StampStarted,
    StampCompleted,
    StampCancelled,
    StampBlocked,
    ClearAssignee,
}

impl SideEffect {
    fn apply(&self, task: &mut Task, now: DateTime<Utc>) -> Result<(), String> {
        let stamp = |field: &mut Option<DateTime<Utc>>, created: DateTime<Utc>| {
            if now < created {
                return Err(format!(
                    "timestamp {} precedes task creation at {}",
                    now, created
                ));
            }
            *field = Some(now);
            Ok(())
        };

        match self {
            SideEffect::StampStarted => stamp(&mut task.started_at, task.created_at),
            SideEffect::StampCompleted => stamp(&mut task.completed_at, task.created_at),
            SideEffect::StampCancelled => stamp(&mut task.cancelled_at, task.created_at),
            SideEffect::StampBlocked => stamp(&mut task.blocked_at, task.created_at),
            SideEffect::ClearAssignee => {
                task.assigned_to = None;
                Ok(())
            }
        }
    }
}

/// One edge of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: TaskState,
    pub to: TaskState,
    pub guard: Option<Guard>,
    pub side_effect: Option<SideEffect>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("Invalid transition for task '{task_id}': {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskState,
        to: TaskState,
    },

    #[error("Guard rejected transition for task '{task_id}' ({from} -> {to}): {reason}")]
    GuardFailed {
        task_id: String,
        from: TaskState,
        to: TaskState,
        reason: String,
    },

    #[error("Side effect failed for task '{task_id}' ({from} -> {to}): {reason}")]
    SideEffectFailed {
        task_id: String,
        from: TaskState,
        to: TaskState,
        reason: String,
    },

    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),
}

/// Stateless validator/applier for task state changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateTransitionMachine;

impl StateTransitionMachine {
    pub fn new() -> Self {
        Self
    }

    /// Look up the edge `from -> to`.
    pub fn rule(from: TaskState, to: TaskState) -> Option<TransitionRule> {
        use TaskState::*;

        let (guard, side_effect) = match (from, to) {
            (NotStarted, Assigned) => (Some(Guard::RequiresAssignee), None),
            (NotStarted, InProgress) => (Some(Guard::RequiresAssignee), Some(SideEffect::StampStarted)),
            (Assigned, InProgress) => (None, Some(SideEffect::StampStarted)),
            (Assigned, NotStarted) => (None, Some(SideEffect::ClearAssignee)),
            (InProgress, Completed) => (None, Some(SideEffect::StampCompleted)),
            (InProgress, Blocked) => (Some(Guard::RequiresBlockingReason), Some(SideEffect::StampBlocked)),
            (InProgress, Cancelled) => (None, Some(SideEffect::StampCancelled)),
            (Blocked, InProgress) => (Some(Guard::RequiresBlockingReasonCleared), None),
            (Blocked, Cancelled) => (None, Some(SideEffect::StampCancelled)),
            _ => return None,
        };

        Some(TransitionRule {
            from,
            to,
            guard,
            side_effect,
        })
    }

    /// States reachable from `from` in one step (guards not evaluated).
    pub fn valid_transitions(from: TaskState) -> Vec<TaskState> {
        use TaskState::*;
        [NotStarted, Assigned, InProgress, Completed, Blocked, Cancelled]
            .into_iter()
            .filter(|to| Self::rule(from, *to).is_some())
            .collect()
    }

    /// Whether `task` may move to `to`. Same-state is always a permitted no-op.
    pub fn can_transition(&self, task: &Task, to: TaskState) -> (bool, String) {
        match self.validate(task, to) {
            Ok(_) => (true, String::new()),
            Err(e) => (false, e.to_string()),
        }
    }

    fn validate(&self, task: &Task, to: TaskState) -> Result<Option<TransitionRule>, TransitionError> {
        if task.state == to {
            return Ok(None);
        }

        let rule = Self::rule(task.state, to).ok_or_else(|| TransitionError::InvalidTransition {
            task_id: task.id.clone(),
            from: task.state,
            to,
        })?;

        if let Some(guard) = rule.guard {
            guard.check(task).map_err(|reason| TransitionError::GuardFailed {
                task_id: task.id.clone(),
                from: task.state,
                to,
                reason,
            })?;
        }

        Ok(Some(rule))
    }

    /// Produce the successor of `task` in state `to`.
    ///
    /// Fails with [`TransitionError::Concurrency`] when `expected_version` is
    /// given and stale. A same-state request returns an unchanged copy.
    pub fn transition_task(
        &self,
        task: &Task,
        to: TaskState,
        expected_version: Option<u64>,
    ) -> Result<Task, TransitionError> {
        if let Some(expected) = expected_version {
            if expected != task.version {
                return Err(ConcurrencyError {
                    task_id: task.id.clone(),
                    expected,
                    actual: task.version,
                }
                .into());
            }
        }

        let Some(rule) = self.validate(task, to)? else {
            return Ok(task.clone());
        };

        let now = Utc::now();
        let mut next = task.clone();
        if let Some(effect) = rule.side_effect {
            effect
                .apply(&mut next, now)
                .map_err(|reason| TransitionError::SideEffectFailed {
                    task_id: task.id.clone(),
                    from: task.state,
                    to,
                    reason,
                })?;
        }

        next.state = to;
        next.updated_at = now;
        next.version = task.version + 1;

        debug!(
            task_id = %task.id,
            from = %task.state,
            to = %to,
            version = next.version,
            "Task transitioned"
        );

        Ok(next)
    }

    /// Set the assignee and enter ASSIGNED in one versioned step.
    pub fn assign(
        &self,
        task: &Task,
        agent_id: &str,
        expected_version: Option<u64>,
    ) -> Result<Task, TransitionError> {
        let mut candidate = task.clone();
        candidate.assigned_to = Some(agent_id.to_string());
        self.transition_task(&candidate, TaskState::Assigned, expected_version)
    }

    /// Record `reason` and enter BLOCKED in one versioned step.
    pub fn block(
        &self,
        task: &Task,
        reason: &str,
        expected_version: Option<u64>,
    ) -> Result<Task, TransitionError> {
        let mut candidate = task.clone();
        candidate.blocking_reason = Some(reason.to_string());
        self.transition_task(&candidate, TaskState::Blocked, expected_version)
    }

    /// Clear the blocking reason and resume IN_PROGRESS in one versioned step.
    pub fn unblock(&self, task: &Task, expected_version: Option<u64>) -> Result<Task, TransitionError> {
        let mut candidate = task.clone();
        candidate.blocking_reason = None;
        self.transition_task(&candidate, TaskState::InProgress, expected_version)
    }
}
