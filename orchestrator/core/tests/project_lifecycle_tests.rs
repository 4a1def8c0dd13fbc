// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Project lifecycle across the core crate: decomposition into a graph,
//! execution ordering, state transitions, and persistence through the
//! file and resilient repositories.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use taskmesh_core::domain::decomposer::{decompose_into, DecompositionContext, Decomposer, ProposedTask};
use taskmesh_core::domain::graph::DependencyValidator;
use taskmesh_core::domain::repository::ProjectRepository;
use taskmesh_core::domain::task::{Project, Task, TaskState};
use taskmesh_core::domain::transition::StateTransitionMachine;
use taskmesh_core::infrastructure::persistence::RecordFormat;
use taskmesh_core::infrastructure::repositories::{FileProjectRepository, ResilientProjectRepository};
use taskmesh_core::infrastructure::resilience::{CircuitBreaker, CircuitState, RetryPolicy};

/// design -> {backend, frontend} -> release
struct ReleasePlan;

#[async_trait]
impl Decomposer for ReleasePlan {
    async fn decompose(&self, _goal: &str, _context: &DecompositionContext) -> anyhow::Result<Vec<ProposedTask>> {
        Ok(vec![
            ProposedTask::new("design"),
            ProposedTask::new("backend").depending_on([0]),
            ProposedTask::new("frontend").depending_on([0]),
            ProposedTask::new("release").depending_on([1, 2]),
        ])
    }
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        initial_delay: Duration::from_millis(1),
        multiplier: 2.0,
        max_delay: Duration::from_millis(2),
    }
}

#[tokio::test]
async fn test_decomposed_plan_orders_and_persists() {
    let mut project = Project::new("release-1", "Ship it");
    project.add_task(Task::new("epic", "Release 1.0")).unwrap();

    let context = DecompositionContext {
        parent_task_id: Some("epic".to_string()),
        ..Default::default()
    };
    let ids = decompose_into(&ReleasePlan, &mut project, "ship release 1.0", &context)
        .await
        .unwrap();
    assert_eq!(ids.len(), 4);
    assert_eq!(project.get_task("epic").unwrap().subtask_ids, ids);

    let order = DependencyValidator::execution_order(&project).unwrap();
    let position = |id: &str| order.iter().position(|o| o == id).unwrap();
    assert!(position(&ids[0]) < position(&ids[1]));
    assert!(position(&ids[0]) < position(&ids[2]));
    assert!(position(&ids[1]) < position(&ids[3]));
    assert!(position(&ids[2]) < position(&ids[3]));

    let ready = DependencyValidator::ready_tasks(&project);
    assert!(ready.contains(&ids[0]));
    assert!(!ready.contains(&ids[3]));

    let machine = StateTransitionMachine::new();
    let design = project.get_task(&ids[0]).unwrap().clone();
    let design = machine.assign(&design, "architect", Some(design.version)).unwrap();
    project.commit(design.clone()).unwrap();
    let design = machine
        .transition_task(&design, TaskState::InProgress, Some(design.version))
        .unwrap();
    project.commit(design).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let repository = FileProjectRepository::new(dir.path(), RecordFormat::Yaml, fast_policy());
    repository.save(&project).await.unwrap();

    let reloaded = repository.load("release-1").await.unwrap();
    assert_eq!(reloaded, project);
    assert_eq!(reloaded.get_task(&ids[0]).unwrap().state, TaskState::InProgress);
    assert_eq!(repository.list_ids().await.unwrap(), vec!["release-1".to_string()]);
}

#[tokio::test]
async fn test_stale_commit_is_rejected() {
    let mut project = Project::new("p", "race");
    project.add_task(Task::new("t", "contested")).unwrap();

    let machine = StateTransitionMachine::new();
    let base = project.get_task("t").unwrap().clone();
    let winner = machine.assign(&base, "alice", Some(base.version)).unwrap();
    let loser = machine.assign(&base, "bob", Some(base.version)).unwrap();

    project.commit(winner).unwrap();
    assert!(project.commit(loser).is_err());
    assert_eq!(project.get_task("t").unwrap().assigned_to.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_resilient_repository_wraps_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let file = Arc::new(FileProjectRepository::new(dir.path(), RecordFormat::Json, fast_policy()));
    let repository =
        ResilientProjectRepository::new(file, fast_policy(), CircuitBreaker::new(2, Duration::from_secs(60)));

    let project = Project::new("p", "wrapped");
    repository.save(&project).await.unwrap();
    assert_eq!(repository.load("p").await.unwrap(), project);

    // Missing records are not a backend fault
    assert!(repository.find_by_id("absent").await.unwrap().is_none());
    assert!(repository.load("absent").await.is_err());
    assert_eq!(repository.breaker().state(), CircuitState::Closed);

    repository.delete("p").await.unwrap();
    assert!(repository.list_ids().await.unwrap().is_empty());
}
