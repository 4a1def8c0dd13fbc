// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Coordination Health
//!
//! Each component is checked by an independent [`HealthProbe`]. The
//! [`HealthMonitor`] runs them all and folds the results:
//!
//! | Component results | Overall |
//! |-------------------|---------|
//! | any probe returned `Err` | `unhealthy` |
//! | any component `warning` | `warning` |
//! | otherwise | `healthy` |

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use taskmesh_core::domain::task::{Task, TaskState};
use taskmesh_core::domain::transition::StateTransitionMachine;

use crate::application::coordinator::AgentCoordinator;
use crate::application::deadlock::DeadlockDetector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub component: String,
    pub status: HealthStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, serde_json::Value>,
}

impl ComponentHealth {
    pub fn new(component: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            component: component.into(),
            status,
            message: None,
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_metric(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metrics.insert(key.to_string(), value);
        self
    }
}

/// Serializable status surface for any monitoring endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall_status: HealthStatus,
    pub components: Vec<ComponentHealth>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
#[error("Health probe '{component}' failed: {reason}")]
pub struct ProbeError {
    pub component: String,
    pub reason: String,
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn component(&self) -> &str;
    async fn probe(&self) -> Result<ComponentHealth, ProbeError>;
}

/// Can the state machine still validate a basic transition?
pub struct StateMachineProbe {
    machine: StateTransitionMachine,
}

impl StateMachineProbe {
    pub fn new() -> Self {
        Self {
            machine: StateTransitionMachine::new(),
        }
    }
}

impl Default for StateMachineProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProbe for StateMachineProbe {
    fn component(&self) -> &str {
        "state_machine"
    }

    async fn probe(&self) -> Result<ComponentHealth, ProbeError> {
        let probe_task = Task::new("__health_probe__", "health probe").with_assignee("__probe__");
        let (allowed, reason) = self.machine.can_transition(&probe_task, TaskState::Assigned);
        if !allowed {
            return Err(ProbeError {
                component: self.component().to_string(),
                reason,
            });
        }
        Ok(ComponentHealth::new(self.component(), HealthStatus::Healthy))
    }
}

/// Agent utilization and stale leases.
pub struct CoordinatorProbe {
    coordinator: Arc<AgentCoordinator>,
    utilization_warning: f64,
}

impl CoordinatorProbe {
    pub fn new(coordinator: Arc<AgentCoordinator>) -> Self {
        Self {
            coordinator,
            utilization_warning: 0.9,
        }
    }
}

#[async_trait]
impl HealthProbe for CoordinatorProbe {
    fn component(&self) -> &str {
        "agent_coordination"
    }

    async fn probe(&self) -> Result<ComponentHealth, ProbeError> {
        let status = self.coordinator.coordination_status();
        let mut health = ComponentHealth::new(self.component(), HealthStatus::Healthy)
            .with_metric("active_agents", json!(status.active_agents))
            .with_metric("active_claims", json!(status.active_claims))
            .with_metric("expired_claims", json!(status.expired_claims))
            .with_metric("utilization_rate", json!(status.utilization_rate));

        if status.utilization_rate >= self.utilization_warning {
            health.status = HealthStatus::Warning;
            health.message = Some(format!("utilization at {:.0}%", status.utilization_rate * 100.0));
        } else if status.expired_claims > 0 {
            health.status = HealthStatus::Warning;
            health.message = Some(format!("{} expired claims awaiting cleanup", status.expired_claims));
        }
        Ok(health)
    }
}

/// Live deadlocks and overdue blocked tasks.
pub struct DeadlockProbe {
    detector: Arc<DeadlockDetector>,
}

impl DeadlockProbe {
    pub fn new(detector: Arc<DeadlockDetector>) -> Self {
        Self { detector }
    }
}

#[async_trait]
impl HealthProbe for DeadlockProbe {
    fn component(&self) -> &str {
        "deadlock_prevention"
    }

    async fn probe(&self) -> Result<ComponentHealth, ProbeError> {
        let stats = self.detector.statistics();
        let mut health = ComponentHealth::new(self.component(), HealthStatus::Healthy)
            .with_metric("active_deadlocks", json!(stats.active_deadlocks))
            .with_metric("blocked_tasks", json!(stats.blocked_tasks))
            .with_metric("overdue_blocked_tasks", json!(stats.overdue_blocked_tasks));

        if stats.active_deadlocks > 0 || stats.overdue_blocked_tasks > 0 {
            health.status = HealthStatus::Warning;
            health.message = Some(format!(
                "{} active deadlocks, {} overdue blocked tasks",
                stats.active_deadlocks, stats.overdue_blocked_tasks
            ));
        }
        Ok(health)
    }
}

#[derive(Default)]
pub struct HealthMonitor {
    probes: Vec<Arc<dyn HealthProbe>>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// State machine, coordinator and deadlock probes.
    pub fn standard(coordinator: Arc<AgentCoordinator>, detector: Arc<DeadlockDetector>) -> Self {
        Self::new()
            .with_probe(Arc::new(StateMachineProbe::new()))
            .with_probe(Arc::new(CoordinatorProbe::new(coordinator)))
            .with_probe(Arc::new(DeadlockProbe::new(detector)))
    }

    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    pub async fn check_health(&self) -> HealthReport {
        let mut components = Vec::with_capacity(self.probes.len());
        for probe in &self.probes {
            let health = match probe.probe().await {
                Ok(health) => health,
                Err(err) => {
                    warn!(component = probe.component(), error = %err, "Health probe failed");
                    ComponentHealth::new(probe.component(), HealthStatus::Unhealthy).with_message(err.reason)
                }
            };
            components.push(health);
        }

        let overall_status = components
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);
        debug!(status = ?overall_status, components = components.len(), "Health check complete");

        HealthReport {
            overall_status,
            components,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenProbe;

    #[async_trait]
    impl HealthProbe for BrokenProbe {
        fn component(&self) -> &str {
            "broken"
        }

        async fn probe(&self) -> Result<ComponentHealth, ProbeError> {
            Err(ProbeError {
                component: "broken".into(),
                reason: "lock poisoned".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_idle_system_is_healthy() {
        let monitor = HealthMonitor::standard(
            Arc::new(AgentCoordinator::default()),
            Arc::new(DeadlockDetector::default()),
        );
        let report = monitor.check_health().await;
        assert_eq!(report.overall_status, HealthStatus::Healthy);
        assert_eq!(report.components.len(), 3);
    }

    #[tokio::test]
    async fn test_deadlock_raises_warning() {
        let detector = Arc::new(DeadlockDetector::default());
        detector.mark_task_blocked("a", "w", &["b".to_string()]);
        detector.mark_task_blocked("b", "w", &["a".to_string()]);

        let monitor = HealthMonitor::standard(Arc::new(AgentCoordinator::default()), detector);
        let report = monitor.check_health().await;
        assert_eq!(report.overall_status, HealthStatus::Warning);
        let deadlock = report
            .components
            .iter()
            .find(|c| c.component == "deadlock_prevention")
            .unwrap();
        assert_eq!(deadlock.metrics["active_deadlocks"], json!(1));
    }

    #[tokio::test]
    async fn test_full_utilization_is_warning() {
        let coordinator = Arc::new(AgentCoordinator::default());
        coordinator.register_agent("a", Vec::<String>::new(), 1);
        coordinator.claim_task("t1", "a", None).unwrap();

        let report = HealthMonitor::new()
            .with_probe(Arc::new(CoordinatorProbe::new(coordinator)))
            .check_health()
            .await;
        assert_eq!(report.overall_status, HealthStatus::Warning);
    }

    #[tokio::test]
    async fn test_failed_probe_is_unhealthy() {
        let report = HealthMonitor::new()
            .with_probe(Arc::new(StateMachineProbe::new()))
            .with_probe(Arc::new(BrokenProbe))
            .check_health()
            .await;

        assert_eq!(report.overall_status, HealthStatus::Unhealthy);
        assert_eq!(report.components[1].message.as_deref(), Some("lock poisoned"));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["overall_status"], json!("unhealthy"));
    }
}
