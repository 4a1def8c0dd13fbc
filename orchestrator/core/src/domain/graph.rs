// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Dependency Graph Algorithms
//!
//! Pure functions over a [`Project`]'s `depends_on` relation. Edges point
//! from a task to the tasks it requires (`a -> b` means "a depends on b").
//!
//! | Function | Purpose |
//! |----------|---------|
//! | [`DependencyValidator::detect_cycles`] | every distinct cycle, normalized |
//! | [`DependencyValidator::validate_dependencies`] | cycles + dangling references as messages |
//! | [`DependencyValidator::ready_tasks`] | NOT_STARTED tasks whose deps are all COMPLETED |
//! | [`DependencyValidator::execution_order`] | deterministic topological order |

use crate::domain::task::{Project, TaskState};
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Dependency cycle among tasks: {}", .0.join(", "))]
    CycleDetected(Vec<String>),

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },
}

/// Domain service for dependency validation.
pub struct DependencyValidator;

impl DependencyValidator {
    /// Return every distinct cycle reachable by DFS, each rotated so that it
    /// starts at its lexicographically smallest member.
    ///
    /// References to ids outside the project are ignored here; they are
    /// reported by [`validate_dependencies`](Self::validate_dependencies).
    pub fn detect_cycles(project: &Project) -> Vec<Vec<String>> {
        fn visit<'a>(
            node: &'a str,
            project: &'a Project,
            visited: &mut HashSet<&'a str>,
            stack: &mut Vec<&'a str>,
            on_stack: &mut HashSet<&'a str>,
            seen: &mut HashSet<Vec<String>>,
            cycles: &mut Vec<Vec<String>>,
        ) {
            visited.insert(node);
            stack.push(node);
            on_stack.insert(node);

            if let Some(task) = project.get_task(node) {
                for dep in &task.depends_on {
                    let dep = dep.as_str();
                    if !project.contains(dep) {
                        continue;
                    }
                    if on_stack.contains(dep) {
                        if let Some(pos) = stack.iter().position(|n| *n == dep) {
                            let cycle = normalize_cycle(&stack[pos..]);
                            if seen.insert(cycle.clone()) {
                                cycles.push(cycle);
                            }
                        }
                    } else if !visited.contains(dep) {
                        visit(dep, project, visited, stack, on_stack, seen, cycles);
                    }
                }
            }

            stack.pop();
            on_stack.remove(node);
        }

        let mut visited = HashSet::new();
        let mut seen = HashSet::new();
        let mut cycles = Vec::new();

        for id in project.tasks.keys() {
            if visited.contains(id.as_str()) {
                continue;
            }
            let mut stack = Vec::new();
            let mut on_stack = HashSet::new();
            visit(
                id,
                project,
                &mut visited,
                &mut stack,
                &mut on_stack,
                &mut seen,
                &mut cycles,
            );
        }

        cycles
    }

    /// Check the project's graph. Returns `(true, [])` when every reference
    /// resolves and no cycle exists; otherwise one message per cycle and one
    /// per dangling reference.
    pub fn validate_dependencies(project: &Project) -> (bool, Vec<String>) {
        let mut errors = Vec::new();

        for cycle in Self::detect_cycles(project) {
            let mut path = cycle.clone();
            if let Some(first) = cycle.first() {
                path.push(first.clone());
            }
            errors.push(format!("Circular dependency detected: {}", path.join(" -> ")));
        }

        for task in project.tasks.values() {
            for dep in &task.depends_on {
                if !project.contains(dep) {
                    errors.push(format!(
                        "Task '{}' depends on non-existent task '{}'",
                        task.id, dep
                    ));
                }
            }
        }

        (errors.is_empty(), errors)
    }

    /// NOT_STARTED tasks whose dependencies are all COMPLETED, in id order.
    pub fn ready_tasks(project: &Project) -> Vec<String> {
        project
            .tasks
            .values()
            .filter(|t| t.state == TaskState::NotStarted)
            .filter(|t| {
                t.depends_on.iter().all(|dep| {
                    project
                        .get_task(dep)
                        .map(|d| d.state == TaskState::Completed)
                        .unwrap_or(false)
                })
            })
            .map(|t| t.id.clone())
            .collect()
    }

    /// Topological order (dependencies first). Ties are broken by id so the
    /// result is stable across runs.
    pub fn execution_order(project: &Project) -> Result<Vec<String>, GraphError> {
        let mut remaining: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for task in project.tasks.values() {
            for dep in &task.depends_on {
                if !project.contains(dep) {
                    return Err(GraphError::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    });
                }
                dependents.entry(dep.as_str()).or_default().push(task.id.as_str());
            }
            remaining.insert(task.id.as_str(), task.depends_on.len());
        }

        let mut frontier: BTreeSet<&str> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(project.len());

        while let Some(next) = frontier.pop_first() {
            order.push(next.to_string());
            if let Some(children) = dependents.get(next) {
                for &child in children {
                    if let Some(count) = remaining.get_mut(&child) {
                        *count -= 1;
                        if *count == 0 {
                            frontier.insert(child);
                        }
                    }
                }
            }
        }

        if order.len() != project.len() {
            let stuck = remaining
                .iter()
                .filter(|(_, count)| **count > 0)
                .map(|(id, _)| id.to_string())
                .collect();
            return Err(GraphError::CycleDetected(stuck));
        }

        Ok(order)
    }
}

/// Rotate a cycle so it starts at its smallest member.
pub fn normalize_cycle<S: AsRef<str>>(cycle: &[S]) -> Vec<String> {
    let start = cycle
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.as_ref().cmp(b.as_ref()))
        .map(|(i, _)| i)
        .unwrap_or(0);

    cycle[start..]
        .iter()
        .chain(cycle[..start].iter())
        .map(|s| s.as_ref().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::Task;

    fn project(edges: &[(&str, &[&str])]) -> Project {
        let mut p = Project::new("p", "graph");
        for (id, deps) in edges {
            p.add_task(Task::new(*id, *id).with_dependencies(deps.iter().copied()))
                .unwrap();
        }
        p
    }

    #[test]
    fn test_empty_project_is_valid() {
        let p = Project::new("p", "empty");
        assert!(DependencyValidator::detect_cycles(&p).is_empty());
        assert_eq!(DependencyValidator::validate_dependencies(&p), (true, vec![]));
    }

    #[test]
    fn test_detects_simple_cycle_normalized() {
        let p = project(&[("c", &["a"]), ("a", &["b"]), ("b", &["c"])]);
        let cycles = DependencyValidator::detect_cycles(&p);
        assert_eq!(cycles, vec![vec!["a".to_string(), "b".to_string(), "c".to_string()]]);
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let p = project(&[("a", &["a"])]);
        assert_eq!(DependencyValidator::detect_cycles(&p), vec![vec!["a".to_string()]]);
    }

    #[test]
    fn test_diamond_has_no_cycle() {
        let p = project(&[("a", &[]), ("b", &["a"]), ("c", &["a"]), ("d", &["b", "c"])]);
        assert!(DependencyValidator::detect_cycles(&p).is_empty());
        let order = DependencyValidator::execution_order(&p).unwrap();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_validate_reports_missing_and_cycles() {
        let p = project(&[("a", &["b"]), ("b", &["a"]), ("c", &["ghost"])]);
        let (ok, errors) = DependencyValidator::validate_dependencies(&p);
        assert!(!ok);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.contains("a -> b -> a")));
        assert!(errors.iter().any(|e| e.contains("'ghost'")));
    }

    #[test]
    fn test_cycles_iff_circular_errors() {
        let cyclic = project(&[("x", &["y"]), ("y", &["z"]), ("z", &["x"]), ("w", &[])]);
        let acyclic = project(&[("x", &["y"]), ("y", &["z"]), ("z", &[])]);

        for p in [cyclic, acyclic] {
            let has_cycles = !DependencyValidator::detect_cycles(&p).is_empty();
            let (_, errors) = DependencyValidator::validate_dependencies(&p);
            let has_circular_errors = errors.iter().any(|e| e.starts_with("Circular"));
            assert_eq!(has_cycles, has_circular_errors);
        }
    }

    #[test]
    fn test_ready_tasks() {
        let mut p = project(&[("a", &[]), ("b", &["a"]), ("c", &[])]);
        assert_eq!(DependencyValidator::ready_tasks(&p), vec!["a", "c"]);

        p.tasks.get_mut("a").unwrap().state = TaskState::Completed;
        assert_eq!(DependencyValidator::ready_tasks(&p), vec!["b", "c"]);
    }

    #[test]
    fn test_execution_order_rejects_cycles() {
        let p = project(&[("a", &["b"]), ("b", &["a"]), ("c", &[])]);
        let err = DependencyValidator::execution_order(&p).unwrap_err();
        assert!(matches!(err, GraphError::CycleDetected(ids) if ids == vec!["a", "b"]));
    }

    #[test]
    fn test_normalize_cycle() {
        assert_eq!(normalize_cycle(&["c", "a", "b"]), vec!["a", "b", "c"]);
        assert!(normalize_cycle::<&str>(&[]).is_empty());
    }
}
