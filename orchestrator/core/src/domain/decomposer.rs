// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Goal decomposition seam.
//!
//! A [`Decomposer`] turns a natural-language goal into [`ProposedTask`]s whose
//! dependencies are expressed as indices into the returned list.
//! [`materialize_proposals`] allocates real task ids, resolves those indices
//! and inserts the batch into a [`Project`] only if the result stays acyclic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::graph::DependencyValidator;
use crate::domain::task::{Project, ProjectError, Task};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompositionContext {
    pub max_depth: u32,
    pub min_tasks: usize,
    #[serde(default)]
    pub parent_task_id: Option<String>,
}

impl Default for DecompositionContext {
    fn default() -> Self {
        Self {
            max_depth: 3,
            min_tasks: 1,
            parent_task_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Indices into the proposal batch
    #[serde(default)]
    pub depends_on: Vec<usize>,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
}

impl ProposedTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            depends_on: Vec::new(),
            required_capabilities: Vec::new(),
        }
    }

    pub fn depending_on(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.depends_on.extend(indices);
        self
    }
}

#[async_trait]
pub trait Decomposer: Send + Sync {
    async fn decompose(
        &self,
        goal: &str,
        context: &DecompositionContext,
    ) -> anyhow::Result<Vec<ProposedTask>>;
}

#[derive(Debug, thiserror::Error)]
pub enum DecompositionError {
    #[error("Decomposer returned {actual} tasks, at least {required} required")]
    TooFewTasks { required: usize, actual: usize },

    #[error("Proposal {index} depends on invalid index {dependency}")]
    InvalidDependencyIndex { index: usize, dependency: usize },

    #[error("Parent task '{0}' not found in project")]
    UnknownParent(String),

    #[error("Proposed tasks introduce a dependency cycle: {0:?}")]
    CycleIntroduced(Vec<String>),

    #[error("Project error: {0}")]
    Project(#[from] ProjectError),

    #[error("Decomposer failed: {0}")]
    Decomposer(#[from] anyhow::Error),
}

/// Insert `proposals` into `project`, returning the ids allocated in order.
///
/// The project is untouched on any error.
pub fn materialize_proposals(
    project: &mut Project,
    proposals: &[ProposedTask],
    context: &DecompositionContext,
) -> Result<Vec<String>, DecompositionError> {
    if proposals.len() < context.min_tasks {
        return Err(DecompositionError::TooFewTasks {
            required: context.min_tasks,
            actual: proposals.len(),
        });
    }

    if let Some(parent) = &context.parent_task_id {
        if !project.contains(parent) {
            return Err(DecompositionError::UnknownParent(parent.clone()));
        }
    }

    let ids: Vec<String> = proposals
        .iter()
        .map(|_| uuid::Uuid::new_v4().to_string())
        .collect();

    let mut staged = project.clone();
    for (index, proposal) in proposals.iter().enumerate() {
        let mut deps = Vec::with_capacity(proposal.depends_on.len());
        for &dependency in &proposal.depends_on {
            if dependency >= proposals.len() || dependency == index {
                return Err(DecompositionError::InvalidDependencyIndex { index, dependency });
            }
            deps.push(ids[dependency].clone());
        }

        let mut task = Task::new(ids[index].clone(), proposal.title.clone())
            .with_description(proposal.description.clone())
            .with_dependencies(deps);
        if !proposal.required_capabilities.is_empty() {
            task = task.with_required_capabilities(proposal.required_capabilities.clone());
        }
        staged.add_task(task)?;

        if let Some(parent) = &context.parent_task_id {
            staged.add_subtask(parent, &ids[index])?;
        }
    }

    if let Some(cycle) = DependencyValidator::detect_cycles(&staged).into_iter().next() {
        return Err(DecompositionError::CycleIntroduced(cycle));
    }

    *project = staged;
    info!(
        project_id = %project.id,
        count = ids.len(),
        parent = ?context.parent_task_id,
        "Materialized decomposed tasks"
    );
    Ok(ids)
}

/// Ask `decomposer` for a plan for `goal` and materialize it into `project`.
pub async fn decompose_into(
    decomposer: &dyn Decomposer,
    project: &mut Project,
    goal: &str,
    context: &DecompositionContext,
) -> Result<Vec<String>, DecompositionError> {
    let proposals = decomposer.decompose(goal, context).await?;
    materialize_proposals(project, &proposals, context)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedPlan(Vec<ProposedTask>);

    #[async_trait]
    impl Decomposer for FixedPlan {
        async fn decompose(
            &self,
            _goal: &str,
            _context: &DecompositionContext,
        ) -> anyhow::Result<Vec<ProposedTask>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_materialize_resolves_indices() {
        let mut project = Project::new("p", "demo");
        let proposals = vec![
            ProposedTask::new("design"),
            ProposedTask::new("build").depending_on([0]),
            ProposedTask::new("ship").depending_on([0, 1]),
        ];

        let ids = materialize_proposals(&mut project, &proposals, &DecompositionContext::default())
            .unwrap();

        assert_eq!(ids.len(), 3);
        let ship = project.get_task(&ids[2]).unwrap();
        assert_eq!(ship.depends_on, vec![ids[0].clone(), ids[1].clone()]);
    }

    #[test]
    fn test_materialize_rejects_too_few() {
        let mut project = Project::new("p", "demo");
        let ctx = DecompositionContext {
            min_tasks: 2,
            ..Default::default()
        };
        let err = materialize_proposals(&mut project, &[ProposedTask::new("only")], &ctx)
            .unwrap_err();
        assert!(matches!(err, DecompositionError::TooFewTasks { required: 2, actual: 1 }));
        assert!(project.is_empty());
    }

    #[test]
    fn test_materialize_rejects_self_and_out_of_range() {
        let mut project = Project::new("p", "demo");
        let ctx = DecompositionContext::default();

        let self_dep = vec![ProposedTask::new("a").depending_on([0])];
        assert!(matches!(
            materialize_proposals(&mut project, &self_dep, &ctx),
            Err(DecompositionError::InvalidDependencyIndex { index: 0, dependency: 0 })
        ));

        let out_of_range = vec![ProposedTask::new("a").depending_on([5])];
        assert!(materialize_proposals(&mut project, &out_of_range, &ctx).is_err());
        assert!(project.is_empty());
    }

    #[test]
    fn test_materialize_rejects_cycles_without_mutation() {
        let mut project = Project::new("p", "demo");
        let proposals = vec![
            ProposedTask::new("a").depending_on([1]),
            ProposedTask::new("b").depending_on([0]),
        ];
        let err = materialize_proposals(&mut project, &proposals, &DecompositionContext::default())
            .unwrap_err();
        assert!(matches!(err, DecompositionError::CycleIntroduced(_)));
        assert!(project.is_empty());
    }

    #[tokio::test]
    async fn test_decompose_into_links_parent() {
        let mut project = Project::new("p", "demo");
        project.add_task(Task::new("root", "Root goal")).unwrap();

        let planner = FixedPlan(vec![ProposedTask::new("x"), ProposedTask::new("y")]);
        let ctx = DecompositionContext {
            parent_task_id: Some("root".to_string()),
            ..Default::default()
        };

        let ids = decompose_into(&planner, &mut project, "do it", &ctx).await.unwrap();
        let root = project.get_task("root").unwrap();
        assert_eq!(root.subtask_ids, ids);
        for id in &ids {
            assert_eq!(project.get_task(id).unwrap().parent_id.as_deref(), Some("root"));
        }
    }
}
