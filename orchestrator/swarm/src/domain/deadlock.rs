// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeadlockSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl DeadlockSeverity {
    /// Severity of a cycle of `cycle_len` tasks, `blocked` of which are marked blocked.
    pub fn classify(cycle_len: usize, blocked: usize) -> Self {
        if cycle_len > 0 && blocked == cycle_len {
            DeadlockSeverity::Critical
        } else if cycle_len <= 2 {
            DeadlockSeverity::High
        } else if blocked * 2 > cycle_len {
            DeadlockSeverity::Medium
        } else {
            DeadlockSeverity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeadlockSeverity::Low => "low",
            DeadlockSeverity::Medium => "medium",
            DeadlockSeverity::High => "high",
            DeadlockSeverity::Critical => "critical",
        }
    }
}

/// A dependency cycle, rotated to start at its smallest task id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlockCycle {
    pub tasks: Vec<String>,
    pub severity: DeadlockSeverity,
    pub detected_at: DateTime<Utc>,
}

impl DeadlockCycle {
    /// Edges `(dependent, dependency)` that make up the cycle.
    pub fn edges(&self) -> Vec<(String, String)> {
        let n = self.tasks.len();
        (0..n)
            .map(|i| (self.tasks[i].clone(), self.tasks[(i + 1) % n].clone()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedTask {
    pub task_id: String,
    pub reason: String,
    pub blocked_at: DateTime<Utc>,
    pub escalated: bool,
}

/// Outcome of `resolve_deadlock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DeadlockResolution {
    /// The edge `dependent -> dependency` was removed.
    EdgeRemoved { dependent: String, dependency: String },
    /// The owner should cancel this task; the detector does not cancel it.
    CancellationRecommended { task_id: String },
    /// Every member was flagged escalated; a human has to decide.
    Escalated { tasks: Vec<String> },
}

impl DeadlockResolution {
    /// Whether the cycle was broken without outside help.
    pub fn is_resolved(&self) -> bool {
        matches!(self, DeadlockResolution::EdgeRemoved { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Adding dependency '{dependent}' -> '{dependency}' would create a cycle")]
pub struct CircularDependencyError {
    pub dependent: String,
    pub dependency: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlockStatistics {
    pub tracked_tasks: usize,
    pub dependency_edges: usize,
    pub blocked_tasks: usize,
    pub escalated_tasks: usize,
    pub active_deadlocks: usize,
    pub overdue_blocked_tasks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_rules() {
        assert_eq!(DeadlockSeverity::classify(2, 2), DeadlockSeverity::Critical);
        assert_eq!(DeadlockSeverity::classify(2, 1), DeadlockSeverity::High);
        assert_eq!(DeadlockSeverity::classify(1, 0), DeadlockSeverity::High);
        assert_eq!(DeadlockSeverity::classify(5, 3), DeadlockSeverity::Medium);
        assert_eq!(DeadlockSeverity::classify(4, 2), DeadlockSeverity::Low);
        assert_eq!(DeadlockSeverity::classify(3, 0), DeadlockSeverity::Low);
    }

    #[test]
    fn test_cycle_edges_wrap_around() {
        let cycle = DeadlockCycle {
            tasks: vec!["a".into(), "b".into(), "c".into()],
            severity: DeadlockSeverity::Low,
            detected_at: Utc::now(),
        };
        assert_eq!(
            cycle.edges(),
            vec![
                ("a".to_string(), "b".to_string()),
                ("b".to_string(), "c".to_string()),
                ("c".to_string(), "a".to_string()),
            ]
        );
    }
}
