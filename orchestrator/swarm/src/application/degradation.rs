// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Reduced-guarantee fallbacks for when a primary coordination component
// cannot be used. Neither provides mutual exclusion or merging.

use sha2::{Digest, Sha256};
use tracing::warn;

use taskmesh_core::domain::task::Task;

use crate::domain::agent::AgentMatcher;

/// Deterministic pick: SHA-256 of the task id modulo the agent count.
pub fn fallback_assignment(task_id: &str, available_agents: &[String]) -> Option<String> {
    if available_agents.is_empty() {
        return None;
    }
    let digest = Sha256::digest(task_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let index = (u64::from_be_bytes(prefix) % available_agents.len() as u64) as usize;

    warn!(task_id, agent_id = %available_agents[index], "Using fallback agent assignment");
    Some(available_agents[index].clone())
}

/// Take the highest-version record, latest `updated_at` on a tie.
pub fn emergency_resolve(candidates: &[Task]) -> Option<Task> {
    let winner = candidates
        .iter()
        .max_by(|a, b| a.version.cmp(&b.version).then(a.updated_at.cmp(&b.updated_at)))?;
    warn!(
        task_id = %winner.id,
        version = winner.version,
        candidates = candidates.len(),
        "Emergency conflict resolution took highest version"
    );
    Some(winner.clone())
}

/// [`AgentMatcher`] backed by [`fallback_assignment`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HashingMatcher;

impl AgentMatcher for HashingMatcher {
    fn assign_agent(&self, task: &Task, available: &[String]) -> Option<String> {
        fallback_assignment(&task.id, available)
    }
}
