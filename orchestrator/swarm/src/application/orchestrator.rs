// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Orchestrator
//!
//! Walks a project's dependency graph and runs every ready task through the
//! external [`TaskExecutor`], at most `max_parallel` at a time.
//!
//! ## Execution model
//!
//! One driver loop owns the `Project`, the completed set and the queued set.
//! Workers on a `JoinSet` only execute (with retries) and hand back a
//! [`WorkerOutcome`]; every state change is committed by the driver. Since
//! the driver alone marks a task COMPLETED and then scans its dependents,
//! a task is queued exactly once, and only after every dependency is
//! COMPLETED.
//!
//! ```text
//! ready queue ──try_acquire_owned──▶ start_task (claim, ASSIGNED, IN_PROGRESS)
//!      ▲                                   │ spawn
//!      │                                   ▼
//!  dependents of ◀── finish_task ◀── worker: execute, retry 2^n × base
//!  completed task    (COMPLETED | BLOCKED, release claim)
//! ```
//!
//! Cancellation stops new launches and pending retries. In-flight executions
//! finish and are recorded normally.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use taskmesh_core::domain::config::{CoordinatorConfigManifest, OrchestrationConfig};
use taskmesh_core::domain::events::OrchestrationEvent;
use taskmesh_core::domain::graph::DependencyValidator;
use taskmesh_core::domain::repository::{ProjectRepository, RepositoryError};
use taskmesh_core::domain::runtime::TaskExecutor;
use taskmesh_core::domain::task::{Project, ProjectError, Task, TaskState};
use taskmesh_core::domain::transition::{StateTransitionMachine, TransitionError};
use taskmesh_core::infrastructure::event_bus::EventBus;
use taskmesh_core::infrastructure::resilience::{retry_with_backoff, RetryPolicy};

use crate::application::coordinator::AgentCoordinator;
use crate::application::deadlock::DeadlockDetector;
use crate::domain::agent::{AgentMatcher, ClaimError};

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub max_parallel: usize,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    /// Assignee recorded when no agent can be claimed or matched
    pub executor_id: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&OrchestrationConfig::default())
    }
}

impl From<&OrchestrationConfig> for OrchestratorSettings {
    fn from(config: &OrchestrationConfig) -> Self {
        Self {
            max_parallel: config.max_parallel,
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay(),
            executor_id: config.executor_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Partial,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskResultStatus {
    Completed,
    Failed,
    Skipped,
    AlreadyCompleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub status: TaskResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskResult {
    fn not_run(task_id: &str, status: TaskResultStatus) -> Self {
        Self {
            task_id: task_id.to_string(),
            status,
            output: None,
            error: None,
            attempts: 0,
            assigned_to: None,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Per-run report. Callers decide whether to persist it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResults {
    pub project_id: String,
    pub status: RunStatus,
    pub total_tasks: usize,
    /// Newly completed in this run
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub skipped_tasks: usize,
    pub task_results: BTreeMap<String, TaskResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistence_error: Option<String>,
}

impl ExecutionResults {
    pub fn already_completed_tasks(&self) -> usize {
        self.count(TaskResultStatus::AlreadyCompleted)
    }

    fn count(&self, status: TaskResultStatus) -> usize {
        self.task_results.values().filter(|r| r.status == status).count()
    }

    fn finalize(&mut self) {
        self.completed_tasks = self.count(TaskResultStatus::Completed);
        self.failed_tasks = self.count(TaskResultStatus::Failed);
        self.skipped_tasks = self.count(TaskResultStatus::Skipped);

        let done = self.completed_tasks + self.already_completed_tasks();
        self.status = if self.failed_tasks == 0 && done == self.total_tasks {
            RunStatus::Completed
        } else if done > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Failed
        };
        self.finished_at = Utc::now();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("Unknown task '{0}'")]
    UnknownTask(String),

    #[error("No project repository configured")]
    RepositoryNotConfigured,

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Claim(#[from] ClaimError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// What a worker hands back to the driver.
#[derive(Debug)]
pub struct WorkerOutcome {
    pub task_id: String,
    pub agent_id: String,
    pub claimed: bool,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub result: Result<serde_json::Value, String>,
    pub cancelled: bool,
}

#[derive(Clone)]
struct WorkerContext {
    executor: Arc<dyn TaskExecutor>,
    project_id: String,
    max_retries: u32,
    retry_base_delay: Duration,
    token: CancellationToken,
    event_bus: Option<EventBus>,
}

/// Driver-owned run state.
struct RunState {
    completed: BTreeSet<String>,
    queued: BTreeSet<String>,
    ready: VecDeque<String>,
    dependents: BTreeMap<String, Vec<String>>,
}

impl RunState {
    fn new(project: &Project) -> Self {
        let mut dependents: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for task in project.tasks.values() {
            for dep in &task.depends_on {
                dependents.entry(dep.clone()).or_default().push(task.id.clone());
            }
        }

        let completed: BTreeSet<String> = project
            .tasks
            .values()
            .filter(|t| t.is_completed())
            .map(|t| t.id.clone())
            .collect();

        let mut state = Self {
            completed,
            queued: BTreeSet::new(),
            ready: VecDeque::new(),
            dependents,
        };
        let seeds: Vec<String> = project
            .tasks
            .values()
            .filter(|t| state.is_ready(t))
            .map(|t| t.id.clone())
            .collect();
        for id in seeds {
            state.enqueue(id);
        }
        state
    }

    fn is_ready(&self, task: &Task) -> bool {
        task.state == TaskState::NotStarted
            && !self.queued.contains(&task.id)
            && task.depends_on.iter().all(|d| self.completed.contains(d))
    }

    fn enqueue(&mut self, task_id: String) {
        if self.queued.insert(task_id.clone()) {
            self.ready.push_back(task_id);
        }
    }

    /// Record `task_id` as completed and queue dependents that became ready.
    fn complete(&mut self, project: &Project, task_id: &str) -> Vec<String> {
        self.completed.insert(task_id.to_string());
        let candidates = self.dependents.get(task_id).cloned().unwrap_or_default();
        let mut newly_ready = Vec::new();
        for id in candidates {
            if project.get_task(&id).is_some_and(|t| self.is_ready(t)) {
                self.enqueue(id.clone());
                newly_ready.push(id);
            }
        }
        newly_ready
    }
}

pub struct Orchestrator {
    executor: Arc<dyn TaskExecutor>,
    settings: OrchestratorSettings,
    machine: StateTransitionMachine,
    coordinator: Option<Arc<AgentCoordinator>>,
    matcher: Option<Arc<dyn AgentMatcher>>,
    fallback_agents: Vec<String>,
    deadlock_detector: Option<Arc<DeadlockDetector>>,
    repository: Option<Arc<dyn ProjectRepository>>,
    retry_policy: RetryPolicy,
    event_bus: Option<EventBus>,
}

impl Orchestrator {
    pub fn new(executor: Arc<dyn TaskExecutor>, settings: OrchestratorSettings) -> Self {
        Self {
            executor,
            settings,
            machine: StateTransitionMachine::new(),
            coordinator: None,
            matcher: None,
            fallback_agents: Vec::new(),
            deadlock_detector: None,
            repository: None,
            retry_policy: RetryPolicy::default(),
            event_bus: None,
        }
    }

    /// Settings and persistence retry policy from a loaded manifest.
    pub fn from_config(executor: Arc<dyn TaskExecutor>, config: &CoordinatorConfigManifest) -> Self {
        Self::new(executor, OrchestratorSettings::from(&config.spec.orchestration))
            .with_retry_policy(RetryPolicy::from(&config.spec.resilience))
    }

    pub fn with_coordinator(mut self, coordinator: Arc<AgentCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Fallback picker over `agents`, used when nothing can be claimed.
    pub fn with_matcher(mut self, matcher: Arc<dyn AgentMatcher>, agents: Vec<String>) -> Self {
        self.matcher = Some(matcher);
        self.fallback_agents = agents;
        self
    }

    pub fn with_deadlock_detector(mut self, detector: Arc<DeadlockDetector>) -> Self {
        self.deadlock_detector = Some(detector);
        self
    }

    pub fn with_repository(mut self, repository: Arc<dyn ProjectRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub async fn orchestrate(
        &self,
        project: &mut Project,
        max_parallel: usize,
        max_retries: u32,
    ) -> Result<ExecutionResults, OrchestrationError> {
        self.orchestrate_with_cancellation(project, max_parallel, max_retries, CancellationToken::new())
            .await
    }

    pub async fn orchestrate_with_cancellation(
        &self,
        project: &mut Project,
        max_parallel: usize,
        max_retries: u32,
        token: CancellationToken,
    ) -> Result<ExecutionResults, OrchestrationError> {
        let started_at = Utc::now();
        let (valid, problems) = DependencyValidator::validate_dependencies(project);
        if !valid {
            warn!(project_id = %project.id, problems = ?problems, "Dependency problems; affected tasks will be skipped");
        }

        let mut run = RunState::new(project);
        let already_completed = run.completed.clone();
        let mut results = ExecutionResults {
            project_id: project.id.clone(),
            status: RunStatus::Failed,
            total_tasks: project.len(),
            completed_tasks: 0,
            failed_tasks: 0,
            skipped_tasks: 0,
            task_results: BTreeMap::new(),
            started_at,
            finished_at: started_at,
            cancelled: false,
            persistence_error: None,
        };

        info!(
            project_id = %project.id,
            total_tasks = results.total_tasks,
            ready_tasks = run.ready.len(),
            already_completed = already_completed.len(),
            max_parallel,
            max_retries,
            "Orchestration started"
        );
        self.publish(OrchestrationEvent::RunStarted {
            project_id: project.id.clone(),
            total_tasks: results.total_tasks,
            ready_tasks: run.ready.len(),
            started_at,
        });

        let context = WorkerContext {
            executor: self.executor.clone(),
            project_id: project.id.clone(),
            max_retries,
            retry_base_delay: self.settings.retry_base_delay,
            token: token.clone(),
            event_bus: self.event_bus.clone(),
        };
        let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
        let mut workers: JoinSet<WorkerOutcome> = JoinSet::new();

        loop {
            while !token.is_cancelled() && !run.ready.is_empty() {
                let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                    break;
                };
                let Some(task_id) = run.ready.pop_front() else {
                    break;
                };

                match self.start_task(project, &task_id) {
                    Ok((task, agent_id, claimed)) => {
                        workers.spawn(run_worker(context.clone(), task, agent_id, claimed, permit));
                    }
                    Err(err) => {
                        error!(task_id = %task_id, error = %err, "Failed to start task");
                        metrics::counter!("taskmesh_tasks_failed_total").increment(1);
                        let mut result = TaskResult::not_run(&task_id, TaskResultStatus::Failed);
                        result.error = Some(err.to_string());
                        results.task_results.insert(task_id, result);
                    }
                }
            }

            match workers.join_next().await {
                Some(Ok(outcome)) => self.finish_task(project, &mut run, &mut results, outcome)?,
                Some(Err(err)) => error!(error = %err, "Worker terminated abnormally"),
                None => break,
            }
        }

        results.cancelled = token.is_cancelled();
        for task in project.tasks.values() {
            if results.task_results.contains_key(&task.id) {
                continue;
            }
            let status = if already_completed.contains(&task.id) {
                TaskResultStatus::AlreadyCompleted
            } else {
                debug!(task_id = %task.id, state = %task.state, "Task skipped");
                self.publish(OrchestrationEvent::TaskSkipped {
                    project_id: project.id.clone(),
                    task_id: task.id.clone(),
                    state: task.state,
                });
                TaskResultStatus::Skipped
            };
            results
                .task_results
                .insert(task.id.clone(), TaskResult::not_run(&task.id, status));
        }
        results.finalize();

        info!(
            project_id = %project.id,
            status = results.status.as_str(),
            completed = results.completed_tasks,
            already_completed = results.already_completed_tasks(),
            failed = results.failed_tasks,
            skipped = results.skipped_tasks,
            cancelled = results.cancelled,
            "Orchestration finished"
        );
        self.publish(OrchestrationEvent::RunFinished {
            project_id: project.id.clone(),
            status: results.status.as_str().to_string(),
            completed_tasks: results.completed_tasks,
            failed_tasks: results.failed_tasks,
            skipped_tasks: results.skipped_tasks,
            finished_at: results.finished_at,
        });

        Ok(results)
    }

    /// Load `project_id` from the repository, run it with the configured
    /// bounds and save it back. A failed save is reported, not fatal.
    pub async fn run_project(&self, project_id: &str) -> Result<ExecutionResults, OrchestrationError> {
        let repository = self
            .repository
            .as_ref()
            .ok_or(OrchestrationError::RepositoryNotConfigured)?;

        let mut project = retry_with_backoff(&self.retry_policy, "load_project", || repository.load(project_id)).await?;
        let mut results = self
            .orchestrate(&mut project, self.settings.max_parallel, self.settings.max_retries)
            .await?;

        if let Err(err) = retry_with_backoff(&self.retry_policy, "save_project", || repository.save(&project)).await {
            warn!(project_id, error = %err, "Failed to save project after run");
            results.persistence_error = Some(err.to_string());
        }
        Ok(results)
    }

    /// Pick an assignee, claim if possible, and move the task to IN_PROGRESS.
    fn start_task(&self, project: &mut Project, task_id: &str) -> Result<(Task, String, bool), OrchestrationError> {
        let task = project
            .get_task(task_id)
            .cloned()
            .ok_or_else(|| OrchestrationError::UnknownTask(task_id.to_string()))?;

        let (agent_id, claimed) = self.acquire_assignee(&task)?;
        match self.advance_to_in_progress(project, task, &agent_id) {
            Ok(started) => {
                info!(task_id, agent_id = %agent_id, claimed, version = started.version, "Task started");
                self.publish(OrchestrationEvent::TaskStarted {
                    project_id: project.id.clone(),
                    task_id: task_id.to_string(),
                    assigned_to: agent_id.clone(),
                    started_at: started.started_at.unwrap_or_else(Utc::now),
                });
                Ok((started, agent_id, claimed))
            }
            Err(err) => {
                self.release(task_id, &agent_id, claimed);
                Err(err)
            }
        }
    }

    fn advance_to_in_progress(
        &self,
        project: &mut Project,
        task: Task,
        agent_id: &str,
    ) -> Result<Task, OrchestrationError> {
        let mut current = task;
        if current.assigned_to.is_none() {
            current = self.machine.assign(&current, agent_id, Some(current.version))?;
            project.commit(current.clone())?;
        }
        let started = self
            .machine
            .transition_task(&current, TaskState::InProgress, Some(current.version))?;
        project.commit(started.clone())?;
        Ok(started)
    }

    /// Claimed agent first, then the task's own assignee, the fallback
    /// matcher, and finally the executor id.
    fn acquire_assignee(&self, task: &Task) -> Result<(String, bool), OrchestrationError> {
        if let Some(coordinator) = &self.coordinator {
            let candidate = task
                .assigned_to
                .clone()
                .or_else(|| coordinator.select_best_agent(task));
            if let Some(agent_id) = candidate {
                match coordinator.claim_task(&task.id, &agent_id, Some(task.version)) {
                    Ok(_) => return Ok((agent_id, true)),
                    Err(err @ ClaimError::AlreadyClaimed { .. }) => return Err(err.into()),
                    Err(err) => {
                        warn!(task_id = %task.id, agent_id = %agent_id, error = %err, "Claim failed, using fallback assignment");
                    }
                }
            }
        }

        if let Some(agent_id) = &task.assigned_to {
            return Ok((agent_id.clone(), false));
        }
        if let Some(agent_id) = self
            .matcher
            .as_ref()
            .and_then(|m| m.assign_agent(task, &self.fallback_agents))
        {
            return Ok((agent_id, false));
        }
        Ok((self.settings.executor_id.clone(), false))
    }

    fn finish_task(
        &self,
        project: &mut Project,
        run: &mut RunState,
        results: &mut ExecutionResults,
        outcome: WorkerOutcome,
    ) -> Result<(), OrchestrationError> {
        let task_id = outcome.task_id.clone();
        let current = project
            .get_task(&task_id)
            .cloned()
            .ok_or_else(|| OrchestrationError::UnknownTask(task_id.clone()))?;
        self.release(&task_id, &outcome.agent_id, outcome.claimed);

        let mut result = TaskResult {
            task_id: task_id.clone(),
            status: TaskResultStatus::Completed,
            output: None,
            error: None,
            attempts: outcome.attempts,
            assigned_to: Some(outcome.agent_id.clone()),
            started_at: Some(outcome.started_at),
            completed_at: None,
        };

        match outcome.result {
            Ok(output) => {
                let committed = self
                    .machine
                    .transition_task(&current, TaskState::Completed, Some(current.version))
                    .map_err(OrchestrationError::from)
                    .and_then(|done| project.commit(done.clone()).map(|_| done).map_err(Into::into));

                match committed {
                    Ok(done) => {
                        metrics::counter!("taskmesh_tasks_completed_total").increment(1);
                        let newly_ready = run.complete(project, &task_id);
                        info!(
                            task_id = %task_id,
                            attempts = outcome.attempts,
                            newly_ready = ?newly_ready,
                            "Task completed"
                        );
                        result.output = Some(output);
                        result.completed_at = done.completed_at;
                        self.publish(OrchestrationEvent::TaskCompleted {
                            project_id: project.id.clone(),
                            task_id: task_id.clone(),
                            attempts: outcome.attempts,
                            completed_at: done.completed_at.unwrap_or_else(Utc::now),
                        });
                    }
                    Err(err) => {
                        error!(task_id = %task_id, error = %err, "Failed to record task completion");
                        metrics::counter!("taskmesh_tasks_failed_total").increment(1);
                        result.status = TaskResultStatus::Failed;
                        result.output = Some(output);
                        result.error = Some(err.to_string());
                    }
                }
            }
            Err(last_error) => {
                let reason = if outcome.cancelled {
                    format!("run cancelled after {} attempts: {}", outcome.attempts, last_error)
                } else {
                    format!("failed after {} attempts: {}", outcome.attempts, last_error)
                };
                error!(task_id = %task_id, attempts = outcome.attempts, error = %last_error, "Task failed");
                metrics::counter!("taskmesh_tasks_failed_total").increment(1);

                match self.machine.block(&current, &reason, Some(current.version)) {
                    Ok(blocked) => {
                        project.commit(blocked.clone())?;
                        if let Some(detector) = &self.deadlock_detector {
                            detector.mark_task_blocked(&task_id, &reason, &[]);
                        }
                        self.publish(OrchestrationEvent::TaskBlocked {
                            project_id: project.id.clone(),
                            task_id: task_id.clone(),
                            reason: reason.clone(),
                            blocked_at: blocked.blocked_at.unwrap_or_else(Utc::now),
                        });
                    }
                    Err(err) => warn!(task_id = %task_id, error = %err, "Could not mark failed task blocked"),
                }

                result.status = TaskResultStatus::Failed;
                result.error = Some(last_error);
            }
        }

        results.task_results.insert(task_id, result);
        Ok(())
    }

    fn release(&self, task_id: &str, agent_id: &str, claimed: bool) {
        if claimed {
            if let Some(coordinator) = &self.coordinator {
                coordinator.release_task(task_id, agent_id);
            }
        }
    }

    fn publish(&self, event: OrchestrationEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish_orchestration_event(event);
        }
    }
}

/// Execute `task` until it succeeds, retries run out, or the run is cancelled.
async fn run_worker(
    context: WorkerContext,
    task: Task,
    agent_id: String,
    claimed: bool,
    _permit: OwnedSemaphorePermit,
) -> WorkerOutcome {
    let started_at = task.started_at.unwrap_or_else(Utc::now);
    let mut attempts = 0u32;
    let mut cancelled = false;
    let last_error = loop {
        attempts += 1;
        let executor = context.executor.clone();
        let input = task.clone();
        let execution = tokio::spawn(async move { executor.execute(&input).await }).await;
        let error = match execution {
            Ok(Ok(output)) => {
                return WorkerOutcome {
                    task_id: task.id,
                    agent_id,
                    claimed,
                    attempts,
                    started_at,
                    result: Ok(output),
                    cancelled: false,
                };
            }
            Ok(Err(err)) => format!("{:#}", err),
            Err(join_err) => format!("executor panicked: {}", join_err),
        };

        if attempts > context.max_retries {
            break error;
        }

        let exponent = (attempts - 1).min(16);
        let delay = context.retry_base_delay.saturating_mul(1u32 << exponent);
        metrics::counter!("taskmesh_task_retries_total").increment(1);
        warn!(
            task_id = %task.id,
            attempt = attempts,
            max_retries = context.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Task attempt failed, retrying"
        );
        if let Some(bus) = &context.event_bus {
            bus.publish_orchestration_event(OrchestrationEvent::TaskRetrying {
                project_id: context.project_id.clone(),
                task_id: task.id.clone(),
                attempt: attempts,
                max_retries: context.max_retries,
                error: error.clone(),
                delay_ms: delay.as_millis() as u64,
            });
        }

        tokio::select! {
            _ = context.token.cancelled() => {
                cancelled = true;
                break error;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    };

    WorkerOutcome {
        task_id: task.id,
        agent_id,
        claimed,
        attempts,
        started_at,
        result: Err(last_error),
        cancelled,
    }
}
