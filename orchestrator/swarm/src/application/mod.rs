// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod conflict;
pub mod coordinator;
pub mod deadlock;
pub mod degradation;
pub mod health;
pub mod orchestrator;

pub use conflict::{ConflictResolver, ConflictSettings};
pub use coordinator::{AgentCoordinator, CoordinationStatus, CoordinatorSettings};
pub use deadlock::{DeadlockDetector, DeadlockSettings, ProjectLoadReport};
pub use degradation::{emergency_resolve, fallback_assignment, HashingMatcher};
pub use health::{HealthMonitor, HealthProbe, HealthReport, HealthStatus};
pub use orchestrator::{
    ExecutionResults, OrchestrationError, Orchestrator, OrchestratorSettings, RunStatus, TaskResult,
    TaskResultStatus,
};
