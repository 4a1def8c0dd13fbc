// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Coordinator
//!
//! Agent registry plus task claim/lease protocol. Every read-modify-write
//! runs under one `parking_lot::Mutex`, so two agents racing for the same
//! task serialize: the second observes the first's live claim and fails
//! with [`ClaimError::AlreadyClaimed`].
//!
//! ## Invariants
//!
//! - At most one non-expired claim per task id.
//! - An expired claim is treated as absent and silently replaced.
//! - `current_task_count` equals the number of claims the agent holds
//!   (expired ones included until swept or replaced).

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use taskmesh_core::domain::config::CoordinationConfig;
use taskmesh_core::domain::events::CoordinationEvent;
use taskmesh_core::domain::task::Task;
use taskmesh_core::infrastructure::event_bus::EventBus;

use crate::domain::agent::{AgentInfo, ClaimError, TaskClaim};

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorSettings {
    pub lease_duration: Duration,
    pub heartbeat_timeout: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from(&CoordinationConfig::default())
    }
}

impl From<&CoordinationConfig> for CoordinatorSettings {
    fn from(config: &CoordinationConfig) -> Self {
        Self {
            lease_duration: config.lease_duration(),
            heartbeat_timeout: config.heartbeat_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinationStatus {
    pub total_agents: usize,
    pub active_agents: usize,
    pub active_claims: usize,
    pub expired_claims: usize,
    pub total_capacity: usize,
    pub current_load: usize,
    pub utilization_rate: f64,
}

#[derive(Default)]
struct CoordinationState {
    agents: HashMap<String, AgentInfo>,
    claims: HashMap<String, TaskClaim>,
}

impl CoordinationState {
    /// Drop `task_id`'s claim and give the slot back to its holder.
    fn remove_claim(&mut self, task_id: &str) -> Option<TaskClaim> {
        let claim = self.claims.remove(task_id)?;
        if let Some(agent) = self.agents.get_mut(&claim.agent_id) {
            agent.current_task_count = agent.current_task_count.saturating_sub(1);
        }
        Some(claim)
    }
}

pub struct AgentCoordinator {
    settings: CoordinatorSettings,
    state: Mutex<CoordinationState>,
    event_bus: Option<EventBus>,
}

impl AgentCoordinator {
    pub fn new(settings: CoordinatorSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(CoordinationState::default()),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Register (or re-register) an agent. Existing claims are kept.
    pub fn register_agent<I, S>(&self, agent_id: &str, capabilities: I, max_concurrent: usize)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut info = AgentInfo::new(agent_id, capabilities, max_concurrent);
        let caps: Vec<String> = info.capabilities.iter().cloned().collect();
        {
            let mut state = self.state.lock();
            if let Some(existing) = state.agents.get(agent_id) {
                info.current_task_count = existing.current_task_count;
            }
            state.agents.insert(agent_id.to_string(), info);
        }

        info!(agent_id, max_concurrent, capabilities = ?caps, "Agent registered");
        self.publish(CoordinationEvent::AgentRegistered {
            agent_id: agent_id.to_string(),
            capabilities: caps,
            registered_at: Utc::now(),
        });
    }

    /// Remove an agent and every claim it holds. Returns false if unknown.
    pub fn unregister_agent(&self, agent_id: &str) -> bool {
        let released = {
            let mut state = self.state.lock();
            if !state.agents.contains_key(agent_id) {
                return false;
            }
            let owned: Vec<String> = state
                .claims
                .values()
                .filter(|c| c.agent_id == agent_id)
                .map(|c| c.task_id.clone())
                .collect();
            for task_id in &owned {
                state.remove_claim(task_id);
            }
            state.agents.remove(agent_id);
            owned.len()
        };

        info!(agent_id, released_claims = released, "Agent unregistered");
        self.publish(CoordinationEvent::AgentUnregistered {
            agent_id: agent_id.to_string(),
            released_claims: released,
            unregistered_at: Utc::now(),
        });
        true
    }

    /// Refresh liveness. False means the agent must re-register.
    pub fn heartbeat(&self, agent_id: &str) -> bool {
        let mut state = self.state.lock();
        match state.agents.get_mut(agent_id) {
            Some(agent) => {
                agent.last_heartbeat = Utc::now();
                agent.is_active = true;
                true
            }
            None => {
                debug!(agent_id, "Heartbeat from unregistered agent");
                false
            }
        }
    }

    pub fn claim_task(
        &self,
        task_id: &str,
        agent_id: &str,
        expected_version: Option<u64>,
    ) -> Result<TaskClaim, ClaimError> {
        let now = Utc::now();
        let (claim, replaced) = {
            let mut state = self.state.lock();

            let agent = state
                .agents
                .get(agent_id)
                .ok_or_else(|| ClaimError::AgentNotRegistered(agent_id.to_string()))?;
            if !agent.is_active {
                return Err(ClaimError::AgentInactive(agent_id.to_string()));
            }

            let mut replaced = None;
            let mut renewing_own = false;
            if let Some(existing) = state.claims.get(task_id) {
                if existing.is_expired_at(now) {
                    replaced = Some(existing.agent_id.clone());
                } else if existing.agent_id != agent_id {
                    return Err(ClaimError::AlreadyClaimed {
                        task_id: task_id.to_string(),
                        holder: existing.agent_id.clone(),
                    });
                } else {
                    renewing_own = true;
                }
            }

            // A live claim this agent already holds does not consume a new slot
            if !renewing_own && !agent.has_capacity() && replaced.as_deref() != Some(agent_id) {
                return Err(ClaimError::AtCapacity {
                    agent_id: agent_id.to_string(),
                    max_concurrent: agent.max_concurrent_tasks,
                });
            }

            if replaced.is_some() || renewing_own {
                state.remove_claim(task_id);
            }

            let claim = TaskClaim {
                task_id: task_id.to_string(),
                agent_id: agent_id.to_string(),
                claimed_at: now,
                lease_expires_at: now + self.lease(),
                claim_version: expected_version,
            };
            state.claims.insert(task_id.to_string(), claim.clone());
            if let Some(agent) = state.agents.get_mut(agent_id) {
                agent.current_task_count += 1;
            }
            (claim, replaced)
        };

        if let Some(previous) = replaced {
            debug!(task_id, previous_holder = %previous, "Replaced expired claim");
            self.publish(CoordinationEvent::ClaimExpired {
                task_id: task_id.to_string(),
                agent_id: previous,
                expired_at: now,
            });
        }

        metrics::counter!("taskmesh_claims_total").increment(1);
        info!(task_id, agent_id, lease_expires_at = %claim.lease_expires_at, "Task claimed");
        self.publish(CoordinationEvent::TaskClaimed {
            task_id: task_id.to_string(),
            agent_id: agent_id.to_string(),
            lease_expires_at: claim.lease_expires_at,
        });
        Ok(claim)
    }

    /// Release `task_id` if `agent_id` holds it. Anything else is a no-op.
    pub fn release_task(&self, task_id: &str, agent_id: &str) -> bool {
        {
            let mut state = self.state.lock();
            match state.claims.get(task_id) {
                Some(claim) if claim.agent_id == agent_id => {
                    state.remove_claim(task_id);
                }
                _ => return false,
            }
        }

        debug!(task_id, agent_id, "Claim released");
        self.publish(CoordinationEvent::ClaimReleased {
            task_id: task_id.to_string(),
            agent_id: agent_id.to_string(),
            released_at: Utc::now(),
        });
        true
    }

    /// Push the lease out to now + lease duration. Only the holder may renew.
    pub fn renew_claim(&self, task_id: &str, agent_id: &str) -> bool {
        let mut state = self.state.lock();
        match state.claims.get_mut(task_id) {
            Some(claim) if claim.agent_id == agent_id => {
                claim.lease_expires_at = Utc::now() + self.lease();
                true
            }
            _ => false,
        }
    }

    /// Live agents with spare capacity and all `required` capabilities,
    /// least loaded first.
    pub fn get_available_agents(&self, required: &[String]) -> Vec<AgentInfo> {
        let cutoff = Utc::now() - self.heartbeat_timeout();
        let state = self.state.lock();
        let mut agents: Vec<AgentInfo> = state
            .agents
            .values()
            .filter(|a| a.is_active && a.last_heartbeat >= cutoff)
            .filter(|a| a.has_capacity() && a.satisfies(required))
            .cloned()
            .collect();
        agents.sort_by(|a, b| {
            a.current_task_count
                .cmp(&b.current_task_count)
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });
        agents
    }

    pub fn select_best_agent(&self, task: &Task) -> Option<String> {
        self.get_available_agents(&task.required_capabilities())
            .into_iter()
            .next()
            .map(|a| a.agent_id)
    }

    pub fn cleanup_expired_claims(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<TaskClaim> = {
            let mut state = self.state.lock();
            let ids: Vec<String> = state
                .claims
                .values()
                .filter(|c| c.is_expired_at(now))
                .map(|c| c.task_id.clone())
                .collect();
            ids.iter().filter_map(|id| state.remove_claim(id)).collect()
        };

        for claim in &expired {
            self.publish(CoordinationEvent::ClaimExpired {
                task_id: claim.task_id.clone(),
                agent_id: claim.agent_id.clone(),
                expired_at: now,
            });
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Cleaned up expired claims");
        }
        expired.len()
    }

    /// Unregister agents whose heartbeat is older than the timeout.
    pub fn cleanup_inactive_agents(&self) -> usize {
        let cutoff = Utc::now() - self.heartbeat_timeout();
        let stale: Vec<String> = {
            let state = self.state.lock();
            state
                .agents
                .values()
                .filter(|a| a.last_heartbeat < cutoff)
                .map(|a| a.agent_id.clone())
                .collect()
        };

        let removed = stale.iter().filter(|id| self.unregister_agent(id)).count();
        if removed > 0 {
            warn!(count = removed, "Removed agents with stale heartbeats");
        }
        removed
    }

    pub fn coordination_status(&self) -> CoordinationStatus {
        let now = Utc::now();
        let state = self.state.lock();
        let active: Vec<&AgentInfo> = state.agents.values().filter(|a| a.is_active).collect();
        let total_capacity: usize = active.iter().map(|a| a.max_concurrent_tasks).sum();
        let current_load: usize = active.iter().map(|a| a.current_task_count).sum();
        let expired_claims = state.claims.values().filter(|c| c.is_expired_at(now)).count();

        CoordinationStatus {
            total_agents: state.agents.len(),
            active_agents: active.len(),
            active_claims: state.claims.len() - expired_claims,
            expired_claims,
            total_capacity,
            current_load,
            utilization_rate: if total_capacity == 0 {
                0.0
            } else {
                current_load as f64 / total_capacity as f64
            },
        }
    }

    /// The live claim on `task_id`, if any.
    pub fn claim_for(&self, task_id: &str) -> Option<TaskClaim> {
        let now = Utc::now();
        self.state
            .lock()
            .claims
            .get(task_id)
            .filter(|c| !c.is_expired_at(now))
            .cloned()
    }

    pub fn agent(&self, agent_id: &str) -> Option<AgentInfo> {
        self.state.lock().agents.get(agent_id).cloned()
    }

    /// Mark an agent inactive without dropping its claims.
    pub fn deactivate_agent(&self, agent_id: &str) -> bool {
        match self.state.lock().agents.get_mut(agent_id) {
            Some(agent) => {
                agent.is_active = false;
                true
            }
            None => false,
        }
    }

    fn lease(&self) -> chrono::Duration {
        to_chrono(self.settings.lease_duration)
    }

    fn heartbeat_timeout(&self) -> chrono::Duration {
        to_chrono(self.settings.heartbeat_timeout)
    }

    fn publish(&self, event: CoordinationEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish_coordination_event(event);
        }
    }
}

/// Out-of-range durations clamp to a century rather than overflow.
pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

impl Default for AgentCoordinator {
    fn default() -> Self {
        Self::new(CoordinatorSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_core::domain::task::Task;

    fn short_lease(lease_ms: u64) -> AgentCoordinator {
        AgentCoordinator::new(CoordinatorSettings {
            lease_duration: Duration::from_millis(lease_ms),
            heartbeat_timeout: Duration::from_secs(300),
        })
    }

    #[test]
    fn test_claim_requires_registration() {
        let coordinator = AgentCoordinator::default();
        assert_eq!(
            coordinator.claim_task("t1", "ghost", None),
            Err(ClaimError::AgentNotRegistered("ghost".into()))
        );
    }

    #[test]
    fn test_second_agent_cannot_claim_live_lease() {
        let coordinator = AgentCoordinator::default();
        coordinator.register_agent("a", ["rust"], 2);
        coordinator.register_agent("b", ["rust"], 2);

        coordinator.claim_task("t1", "a", Some(1)).unwrap();
        let err = coordinator.claim_task("t1", "b", Some(1)).unwrap_err();
        assert_eq!(
            err,
            ClaimError::AlreadyClaimed {
                task_id: "t1".into(),
                holder: "a".into()
            }
        );
        assert_eq!(coordinator.claim_for("t1").unwrap().agent_id, "a");
    }

    #[test]
    fn test_capacity_is_enforced() {
        let coordinator = AgentCoordinator::default();
        coordinator.register_agent("a", Vec::<String>::new(), 1);
        coordinator.claim_task("t1", "a", None).unwrap();
        assert!(matches!(
            coordinator.claim_task("t2", "a", None),
            Err(ClaimError::AtCapacity { .. })
        ));
    }

    #[test]
    fn test_reclaim_by_holder_does_not_double_count() {
        let coordinator = AgentCoordinator::default();
        coordinator.register_agent("a", Vec::<String>::new(), 1);
        coordinator.claim_task("t1", "a", None).unwrap();
        coordinator.claim_task("t1", "a", None).unwrap();
        assert_eq!(coordinator.agent("a").unwrap().current_task_count, 1);
    }

    #[test]
    fn test_inactive_agent_cannot_claim() {
        let coordinator = AgentCoordinator::default();
        coordinator.register_agent("a", Vec::<String>::new(), 1);
        coordinator.deactivate_agent("a");
        assert_eq!(
            coordinator.claim_task("t1", "a", None),
            Err(ClaimError::AgentInactive("a".into()))
        );
    }

    #[tokio::test]
    async fn test_expired_lease_is_replaced() {
        let coordinator = short_lease(20);
        coordinator.register_agent("a", Vec::<String>::new(), 1);
        coordinator.register_agent("b", Vec::<String>::new(), 1);

        coordinator.claim_task("t1", "a", None).unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let claim = coordinator.claim_task("t1", "b", None).unwrap();
        assert_eq!(claim.agent_id, "b");
        assert_eq!(coordinator.agent("a").unwrap().current_task_count, 0);
        assert_eq!(coordinator.agent("b").unwrap().current_task_count, 1);
    }

    #[test]
    fn test_release_only_by_holder() {
        let coordinator = AgentCoordinator::default();
        coordinator.register_agent("a", Vec::<String>::new(), 1);
        coordinator.register_agent("b", Vec::<String>::new(), 1);
        coordinator.claim_task("t1", "a", None).unwrap();

        assert!(!coordinator.release_task("t1", "b"));
        assert!(!coordinator.release_task("missing", "a"));
        assert!(coordinator.release_task("t1", "a"));
        assert_eq!(coordinator.agent("a").unwrap().current_task_count, 0);
        assert!(coordinator.claim_for("t1").is_none());
    }

    #[test]
    fn test_renew_extends_lease() {
        let coordinator = AgentCoordinator::default();
        coordinator.register_agent("a", Vec::<String>::new(), 1);
        let claim = coordinator.claim_task("t1", "a", None).unwrap();

        assert!(!coordinator.renew_claim("t1", "b"));
        assert!(coordinator.renew_claim("t1", "a"));
        assert!(coordinator.claim_for("t1").unwrap().lease_expires_at >= claim.lease_expires_at);
    }

    #[test]
    fn test_unregister_releases_claims() {
        let coordinator = AgentCoordinator::default();
        coordinator.register_agent("a", Vec::<String>::new(), 3);
        coordinator.claim_task("t1", "a", None).unwrap();
        coordinator.claim_task("t2", "a", None).unwrap();

        assert!(coordinator.unregister_agent("a"));
        assert!(coordinator.claim_for("t1").is_none());
        assert!(coordinator.claim_for("t2").is_none());
        assert!(!coordinator.unregister_agent("a"));
        assert!(!coordinator.heartbeat("a"));
    }

    #[test]
    fn test_selection_prefers_least_loaded_capable_agent() {
        let coordinator = AgentCoordinator::default();
        coordinator.register_agent("busy", ["rust"], 4);
        coordinator.register_agent("idle", ["rust"], 4);
        coordinator.register_agent("python-only", ["python"], 4);
        coordinator.claim_task("t0", "busy", None).unwrap();

        let task = Task::new("t1", "Write parser").with_required_capabilities(["rust"]);
        assert_eq!(coordinator.select_best_agent(&task).as_deref(), Some("idle"));

        let impossible = Task::new("t2", "Hard").with_required_capabilities(["cobol"]);
        assert!(coordinator.select_best_agent(&impossible).is_none());
    }

    #[tokio::test]
    async fn test_cleanup_expired_claims() {
        let coordinator = short_lease(10);
        coordinator.register_agent("a", Vec::<String>::new(), 2);
        coordinator.claim_task("t1", "a", None).unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;

        assert_eq!(coordinator.coordination_status().expired_claims, 1);
        assert_eq!(coordinator.cleanup_expired_claims(), 1);
        assert_eq!(coordinator.agent("a").unwrap().current_task_count, 0);
    }

    #[tokio::test]
    async fn test_cleanup_inactive_agents() {
        let coordinator = AgentCoordinator::new(CoordinatorSettings {
            lease_duration: Duration::from_secs(60),
            heartbeat_timeout: Duration::from_millis(10),
        });
        coordinator.register_agent("a", Vec::<String>::new(), 1);
        coordinator.claim_task("t1", "a", None).unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;

        assert!(coordinator.get_available_agents(&[]).is_empty());
        assert_eq!(coordinator.cleanup_inactive_agents(), 1);
        assert!(coordinator.claim_for("t1").is_none());
    }

    #[test]
    fn test_coordination_status() {
        let coordinator = AgentCoordinator::default();
        coordinator.register_agent("a", Vec::<String>::new(), 2);
        coordinator.register_agent("b", Vec::<String>::new(), 2);
        coordinator.claim_task("t1", "a", None).unwrap();

        let status = coordinator.coordination_status();
        assert_eq!(status.total_agents, 2);
        assert_eq!(status.active_claims, 1);
        assert_eq!(status.total_capacity, 4);
        assert!((status.utilization_rate - 0.25).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_claim_events_published() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let coordinator = AgentCoordinator::default().with_event_bus(bus);

        coordinator.register_agent("a", Vec::<String>::new(), 1);
        coordinator.claim_task("t1", "a", None).unwrap();

        let mut saw_claim = false;
        while let Ok(event) = rx.try_recv() {
            if let taskmesh_core::infrastructure::event_bus::DomainEvent::Coordination(
                CoordinationEvent::TaskClaimed { task_id, .. },
            ) = event
            {
                saw_claim = task_id == "t1";
            }
        }
        assert!(saw_claim);
    }
}
