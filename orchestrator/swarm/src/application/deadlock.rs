// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Deadlock Detector
//!
//! Keeps its own forward (`task -> depends-on`) and reverse
//! (`task -> dependents`) adjacency maps plus live blocked-task records, so
//! it can be fed incrementally by blocking notifications while a run is in
//! flight.
//!
//! Two ways edges enter the graph:
//!
//! - [`DeadlockDetector::add_dependency`] refuses any edge that would close a
//!   cycle and any edge that would make a chain deeper than the configured
//!   maximum.
//! - [`DeadlockDetector::mark_task_blocked`] records what a blocked task is
//!   waiting on as reported, unchecked. Those are the edges
//!   [`DeadlockDetector::detect_deadlocks`] exists to find cycles in.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use taskmesh_core::domain::config::DeadlockConfig;
use taskmesh_core::domain::events::CoordinationEvent;
use taskmesh_core::domain::graph::normalize_cycle;
use taskmesh_core::domain::task::Project;
use taskmesh_core::infrastructure::event_bus::EventBus;

use crate::application::coordinator::to_chrono;
use crate::domain::deadlock::{
    BlockedTask, CircularDependencyError, DeadlockCycle, DeadlockResolution, DeadlockSeverity,
    DeadlockStatistics,
};

#[derive(Debug, Clone, PartialEq)]
pub struct DeadlockSettings {
    pub max_chain_depth: usize,
    pub max_block_duration: Duration,
    pub escalation_threshold: Duration,
}

impl Default for DeadlockSettings {
    fn default() -> Self {
        Self::from(&DeadlockConfig::default())
    }
}

impl From<&DeadlockConfig> for DeadlockSettings {
    fn from(config: &DeadlockConfig) -> Self {
        Self {
            max_chain_depth: config.max_chain_depth,
            max_block_duration: config.max_block_duration(),
            escalation_threshold: config.escalation_threshold(),
        }
    }
}

/// Edges accepted and refused while seeding from a project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectLoadReport {
    pub edges_added: usize,
    pub circular: Vec<CircularDependencyError>,
    pub too_deep: Vec<(String, String)>,
}

#[derive(Default)]
struct DependencyState {
    dependencies: BTreeMap<String, BTreeSet<String>>,
    dependents: BTreeMap<String, BTreeSet<String>>,
    blocked: BTreeMap<String, BlockedTask>,
    escalated: BTreeSet<String>,
}

impl DependencyState {
    fn insert_edge(&mut self, dependent: &str, dependency: &str) {
        self.dependencies
            .entry(dependent.to_string())
            .or_default()
            .insert(dependency.to_string());
        self.dependencies.entry(dependency.to_string()).or_default();
        self.dependents
            .entry(dependency.to_string())
            .or_default()
            .insert(dependent.to_string());
        self.dependents.entry(dependent.to_string()).or_default();
    }

    fn remove_edge(&mut self, dependent: &str, dependency: &str) -> bool {
        let removed = self
            .dependencies
            .get_mut(dependent)
            .map(|deps| deps.remove(dependency))
            .unwrap_or(false);
        if let Some(parents) = self.dependents.get_mut(dependency) {
            parents.remove(dependent);
        }
        removed
    }

    fn has_edge(&self, dependent: &str, dependency: &str) -> bool {
        self.dependencies
            .get(dependent)
            .is_some_and(|deps| deps.contains(dependency))
    }

    /// Whether `to` is reachable from `from` following depends-on edges.
    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut stack = vec![from];
        let mut seen = BTreeSet::new();
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if !seen.insert(node) {
                continue;
            }
            if let Some(deps) = self.dependencies.get(node) {
                stack.extend(deps.iter().map(String::as_str));
            }
        }
        false
    }

    /// Number of edges on the longest depends-on chain starting at `node`.
    fn chain_depth(&self, node: &str) -> usize {
        fn walk<'a>(
            state: &'a DependencyState,
            node: &'a str,
            on_path: &mut BTreeSet<&'a str>,
            memo: &mut BTreeMap<&'a str, usize>,
        ) -> usize {
            if let Some(&depth) = memo.get(node) {
                return depth;
            }
            if !on_path.insert(node) {
                return 0;
            }
            let depth = state
                .dependencies
                .get(node)
                .map(|deps| {
                    deps.iter()
                        .map(|d| 1 + walk(state, d, on_path, memo))
                        .max()
                        .unwrap_or(0)
                })
                .unwrap_or(0);
            on_path.remove(node);
            memo.insert(node, depth);
            depth
        }

        walk(self, node, &mut BTreeSet::new(), &mut BTreeMap::new())
    }

    fn find_cycles(&self) -> Vec<Vec<String>> {
        fn visit<'a>(
            state: &'a DependencyState,
            node: &'a str,
            visited: &mut BTreeSet<&'a str>,
            stack: &mut Vec<&'a str>,
            cycles: &mut Vec<Vec<String>>,
        ) {
            visited.insert(node);
            stack.push(node);
            if let Some(deps) = state.dependencies.get(node) {
                for dep in deps {
                    if let Some(pos) = stack.iter().position(|n| *n == dep.as_str()) {
                        let cycle = normalize_cycle(&stack[pos..]);
                        if !cycles.contains(&cycle) {
                            cycles.push(cycle);
                        }
                    } else if !visited.contains(dep.as_str()) {
                        visit(state, dep, visited, stack, cycles);
                    }
                }
            }
            stack.pop();
        }

        let mut visited = BTreeSet::new();
        let mut cycles = Vec::new();
        for node in self.dependencies.keys() {
            if !visited.contains(node.as_str()) {
                let mut stack = Vec::new();
                visit(self, node, &mut visited, &mut stack, &mut cycles);
            }
        }
        cycles
    }

    fn escalate(&mut self, task_id: &str) -> bool {
        if let Some(record) = self.blocked.get_mut(task_id) {
            record.escalated = true;
        }
        self.escalated.insert(task_id.to_string())
    }
}

pub struct DeadlockDetector {
    settings: DeadlockSettings,
    state: Mutex<DependencyState>,
    event_bus: Option<EventBus>,
}

impl DeadlockDetector {
    pub fn new(settings: DeadlockSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(DependencyState::default()),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Add `dependent -> dependency`.
    ///
    /// `Err` if the edge would close a cycle, `Ok(false)` if it would make a
    /// chain longer than `max_chain_depth`. The graph is untouched in both cases.
    pub fn add_dependency(&self, dependent: &str, dependency: &str) -> Result<bool, CircularDependencyError> {
        let mut state = self.state.lock();
        if state.has_edge(dependent, dependency) {
            return Ok(true);
        }
        if dependent == dependency || state.reaches(dependency, dependent) {
            warn!(dependent, dependency, "Rejected cycle-forming dependency");
            return Err(CircularDependencyError {
                dependent: dependent.to_string(),
                dependency: dependency.to_string(),
            });
        }

        let depth = 1 + state.chain_depth(dependency);
        if depth > self.settings.max_chain_depth {
            warn!(
                dependent,
                dependency,
                depth,
                max_chain_depth = self.settings.max_chain_depth,
                "Rejected dependency exceeding chain depth"
            );
            return Ok(false);
        }

        state.insert_edge(dependent, dependency);
        debug!(dependent, dependency, "Dependency added");
        Ok(true)
    }

    pub fn remove_dependency(&self, dependent: &str, dependency: &str) -> bool {
        self.state.lock().remove_edge(dependent, dependency)
    }

    /// Record `task_id` as blocked, waiting on `waiting_on`.
    ///
    /// Wait edges are taken as reported, cycles included.
    pub fn mark_task_blocked(&self, task_id: &str, reason: &str, waiting_on: &[String]) {
        let mut state = self.state.lock();
        for dependency in waiting_on {
            if dependency != task_id {
                state.insert_edge(task_id, dependency);
            }
        }
        state.dependencies.entry(task_id.to_string()).or_default();
        state.dependents.entry(task_id.to_string()).or_default();
        let escalated = state.escalated.contains(task_id);
        state.blocked.insert(
            task_id.to_string(),
            BlockedTask {
                task_id: task_id.to_string(),
                reason: reason.to_string(),
                blocked_at: Utc::now(),
                escalated,
            },
        );
        info!(task_id, reason, waiting_on = ?waiting_on, "Task marked blocked");
    }

    pub fn mark_task_unblocked(&self, task_id: &str) -> bool {
        let mut state = self.state.lock();
        let was_blocked = state.blocked.remove(task_id).is_some();
        state.escalated.remove(task_id);
        if was_blocked {
            info!(task_id, "Task unblocked");
        }
        was_blocked
    }

    pub fn detect_deadlocks(&self) -> Vec<DeadlockCycle> {
        let now = Utc::now();
        let deadlocks: Vec<DeadlockCycle> = {
            let state = self.state.lock();
            state
                .find_cycles()
                .into_iter()
                .map(|tasks| {
                    let blocked = tasks.iter().filter(|t| state.blocked.contains_key(*t)).count();
                    DeadlockCycle {
                        severity: DeadlockSeverity::classify(tasks.len(), blocked),
                        tasks,
                        detected_at: now,
                    }
                })
                .collect()
        };

        for cycle in &deadlocks {
            metrics::counter!("taskmesh_deadlocks_detected_total").increment(1);
            warn!(tasks = ?cycle.tasks, severity = cycle.severity.as_str(), "Deadlock detected");
            if let Some(bus) = &self.event_bus {
                bus.publish_coordination_event(CoordinationEvent::DeadlockDetected {
                    tasks: cycle.tasks.clone(),
                    severity: cycle.severity.as_str().to_string(),
                    detected_at: now,
                });
            }
        }
        deadlocks
    }

    /// Break `cycle` if possible.
    ///
    /// 1. Remove the cycle edge whose target is not blocked and has the fewest
    ///    dependents (ties go to the lexicographically smallest edge).
    /// 2. Otherwise recommend cancelling the most recently blocked member.
    /// 3. Otherwise flag every member escalated.
    pub fn resolve_deadlock(&self, cycle: &DeadlockCycle) -> DeadlockResolution {
        let mut state = self.state.lock();

        let weakest = cycle
            .edges()
            .into_iter()
            .filter(|(from, to)| state.has_edge(from, to) && !state.blocked.contains_key(to))
            .min_by_key(|(from, to)| {
                let fan_in = state.dependents.get(to).map_or(0, |d| d.len());
                (fan_in, from.clone(), to.clone())
            });

        if let Some((dependent, dependency)) = weakest {
            state.remove_edge(&dependent, &dependency);
            info!(%dependent, %dependency, "Deadlock resolved by removing dependency");
            return DeadlockResolution::EdgeRemoved { dependent, dependency };
        }

        let newest_blocked = cycle
            .tasks
            .iter()
            .filter_map(|t| state.blocked.get(t))
            .max_by_key(|b| (b.blocked_at, b.task_id.clone()));
        if let Some(blocked) = newest_blocked {
            let task_id = blocked.task_id.clone();
            warn!(%task_id, "Deadlock unresolved, recommending cancellation");
            return DeadlockResolution::CancellationRecommended { task_id };
        }

        for task in &cycle.tasks {
            state.escalate(task);
        }
        warn!(tasks = ?cycle.tasks, "Deadlock escalated for human intervention");
        DeadlockResolution::Escalated {
            tasks: cycle.tasks.clone(),
        }
    }

    /// Tasks blocked longer than `max_block_duration`. Tasks past the
    /// shorter escalation threshold are flagged escalated once.
    pub fn check_timeout_violations(&self) -> Vec<String> {
        self.check_timeout_violations_at(Utc::now())
    }

    fn check_timeout_violations_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let max_block = to_chrono(self.settings.max_block_duration);
        let escalation = to_chrono(self.settings.escalation_threshold);

        let mut state = self.state.lock();
        let mut violations = Vec::new();
        let mut to_escalate = Vec::new();
        for record in state.blocked.values() {
            let blocked_for = now - record.blocked_at;
            if blocked_for > max_block {
                violations.push(record.task_id.clone());
            }
            if blocked_for > escalation && !record.escalated {
                to_escalate.push(record.task_id.clone());
            }
        }

        for task_id in &to_escalate {
            state.escalate(task_id);
            warn!(task_id = %task_id, "Blocked task passed escalation threshold");
        }
        violations
    }

    pub fn statistics(&self) -> DeadlockStatistics {
        let now = Utc::now();
        let max_block = to_chrono(self.settings.max_block_duration);
        let state = self.state.lock();
        DeadlockStatistics {
            tracked_tasks: state.dependencies.len(),
            dependency_edges: state.dependencies.values().map(BTreeSet::len).sum(),
            blocked_tasks: state.blocked.len(),
            escalated_tasks: state.escalated.len(),
            active_deadlocks: state.find_cycles().len(),
            overdue_blocked_tasks: state
                .blocked
                .values()
                .filter(|b| now - b.blocked_at > max_block)
                .count(),
        }
    }

    pub fn dependencies_of(&self, task_id: &str) -> Vec<String> {
        self.state
            .lock()
            .dependencies
            .get(task_id)
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn dependents_of(&self, task_id: &str) -> Vec<String> {
        self.state
            .lock()
            .dependents
            .get(task_id)
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn blocked_task(&self, task_id: &str) -> Option<BlockedTask> {
        self.state.lock().blocked.get(task_id).cloned()
    }

    pub fn is_escalated(&self, task_id: &str) -> bool {
        self.state.lock().escalated.contains(task_id)
    }

    /// Seed the graph from a project's `depends_on` edges and BLOCKED tasks.
    pub fn load_project(&self, project: &Project) -> ProjectLoadReport {
        let mut report = ProjectLoadReport::default();
        for task in project.tasks.values() {
            for dependency in &task.depends_on {
                match self.add_dependency(&task.id, dependency) {
                    Ok(true) => report.edges_added += 1,
                    Ok(false) => report.too_deep.push((task.id.clone(), dependency.clone())),
                    Err(err) => report.circular.push(err),
                }
            }
        }

        for task in project.tasks.values() {
            if task.state == taskmesh_core::domain::task::TaskState::Blocked {
                let reason = task.blocking_reason.clone().unwrap_or_default();
                self.mark_task_blocked(&task.id, &reason, &[]);
            }
        }

        info!(
            project_id = %project.id,
            edges = report.edges_added,
            circular = report.circular.len(),
            too_deep = report.too_deep.len(),
            "Loaded project into deadlock detector"
        );
        report
    }
}

impl Default for DeadlockDetector {
    fn default() -> Self {
        Self::new(DeadlockSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_core::domain::task::{Task, TaskState};

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_add_dependency_rejects_transitive_cycle() {
        let detector = DeadlockDetector::default();
        assert!(detector.add_dependency("y", "z").unwrap());
        assert!(detector.add_dependency("z", "x").unwrap());

        let err = detector.add_dependency("x", "y").unwrap_err();
        assert_eq!(err.dependent, "x");
        assert!(detector.dependencies_of("x").is_empty());
        assert_eq!(detector.statistics().dependency_edges, 2);
    }

    #[test]
    fn test_self_dependency_is_circular() {
        let detector = DeadlockDetector::default();
        assert!(detector.add_dependency("a", "a").is_err());
    }

    #[test]
    fn test_chain_depth_limit() {
        let detector = DeadlockDetector::new(DeadlockSettings {
            max_chain_depth: 2,
            ..Default::default()
        });
        assert!(detector.add_dependency("b", "a").unwrap());
        assert!(detector.add_dependency("c", "b").unwrap());
        assert!(!detector.add_dependency("d", "c").unwrap());
        assert!(detector.dependencies_of("d").is_empty());
    }

    #[test]
    fn test_detects_reported_wait_cycle_with_severity() {
        let detector = DeadlockDetector::default();
        detector.mark_task_blocked("a", "waiting", &ids(&["b"]));
        detector.mark_task_blocked("b", "waiting", &ids(&["a"]));

        let cycles = detector.detect_deadlocks();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].tasks, ids(&["a", "b"]));
        assert_eq!(cycles[0].severity, DeadlockSeverity::Critical);
    }

    #[test]
    fn test_cycle_found_once_from_any_start() {
        let detector = DeadlockDetector::default();
        detector.mark_task_blocked("c", "w", &ids(&["a"]));
        detector.mark_task_blocked("a", "w", &ids(&["b"]));
        detector.mark_task_blocked("b", "w", &ids(&["c"]));
        detector.mark_task_unblocked("b");

        let cycles = detector.detect_deadlocks();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].tasks, ids(&["a", "b", "c"]));
        assert_eq!(cycles[0].severity, DeadlockSeverity::Medium);
    }

    #[test]
    fn test_resolve_removes_edge_to_unblocked_target() {
        let detector = DeadlockDetector::default();
        detector.mark_task_blocked("a", "w", &ids(&["b"]));
        detector.mark_task_blocked("b", "w", &ids(&["c"]));
        detector.mark_task_blocked("c", "w", &ids(&["a"]));
        detector.mark_task_unblocked("c");

        let cycle = detector.detect_deadlocks().remove(0);
        let resolution = detector.resolve_deadlock(&cycle);
        assert_eq!(
            resolution,
            DeadlockResolution::EdgeRemoved {
                dependent: "b".into(),
                dependency: "c".into()
            }
        );
        assert!(resolution.is_resolved());
        assert!(detector.detect_deadlocks().is_empty());
    }

    #[test]
    fn test_resolve_recommends_cancelling_newest_blocked() {
        let detector = DeadlockDetector::default();
        detector.mark_task_blocked("a", "w", &ids(&["b"]));
        std::thread::sleep(std::time::Duration::from_millis(5));
        detector.mark_task_blocked("b", "w", &ids(&["a"]));

        let cycle = detector.detect_deadlocks().remove(0);
        assert_eq!(
            detector.resolve_deadlock(&cycle),
            DeadlockResolution::CancellationRecommended { task_id: "b".into() }
        );
        // Recommendation only; the graph is unchanged
        assert_eq!(detector.detect_deadlocks().len(), 1);
    }

    #[test]
    fn test_resolve_escalates_stale_cycle() {
        let detector = DeadlockDetector::default();
        let stale = DeadlockCycle {
            tasks: ids(&["p", "q"]),
            severity: DeadlockSeverity::High,
            detected_at: Utc::now(),
        };
        let resolution = detector.resolve_deadlock(&stale);
        assert!(matches!(resolution, DeadlockResolution::Escalated { .. }));
        assert!(detector.is_escalated("p"));
        assert!(detector.is_escalated("q"));
    }

    #[test]
    fn test_timeout_violation_and_escalation() {
        let detector = DeadlockDetector::new(DeadlockSettings {
            max_chain_depth: 10,
            max_block_duration: Duration::from_secs(60),
            escalation_threshold: Duration::from_secs(30),
        });
        detector.mark_task_blocked("slow", "stuck", &[]);
        detector.mark_task_blocked("fresh", "stuck", &[]);

        let now = Utc::now();
        assert!(detector
            .check_timeout_violations_at(now + chrono::Duration::seconds(45))
            .is_empty());
        assert!(detector.blocked_task("slow").unwrap().escalated);

        let violations = detector.check_timeout_violations_at(now + chrono::Duration::seconds(90));
        assert_eq!(violations, ids(&["fresh", "slow"]));
    }

    #[test]
    fn test_load_project_reports_refused_edges() {
        let mut project = Project::new("p", "demo");
        project.add_task(Task::new("a", "A").with_dependencies(["b"])).unwrap();
        project.add_task(Task::new("b", "B").with_dependencies(["a"])).unwrap();
        let mut blocked = Task::new("c", "C");
        blocked.state = TaskState::Blocked;
        blocked.blocking_reason = Some("waiting on vendor".into());
        project.add_task(blocked).unwrap();

        let detector = DeadlockDetector::default();
        let report = detector.load_project(&project);
        assert_eq!(report.edges_added, 1);
        assert_eq!(report.circular.len(), 1);
        assert_eq!(detector.statistics().blocked_tasks, 1);
        assert!(detector.detect_deadlocks().is_empty());
    }
}
