// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Domain Events
//
// In-memory event streaming over tokio broadcast channels. Slow subscribers
// lag and lose the oldest events; publishers never block.

use crate::domain::events::{CoordinationEvent, OrchestrationEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "category", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Orchestration(OrchestrationEvent),
    Coordination(CoordinationEvent),
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_orchestration_event(&self, event: OrchestrationEvent) {
        self.publish(DomainEvent::Orchestration(event));
    }

    pub fn publish_coordination_event(&self, event: CoordinationEvent) {
        self.publish(DomainEvent::Coordination(event));
    }

    fn publish(&self, event: DomainEvent) {
        debug!("Publishing event: {:?}", event);

        // send() only fails when nobody is subscribed
        let receiver_count = self.sender.send(event).unwrap_or(0);

        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all domain events
    pub fn subscribe(&self) -> EventReceiver {
        let receiver = self.sender.subscribe();
        EventReceiver { receiver }
    }

    /// Subscribe to the orchestration events of a single project
    pub fn subscribe_project(&self, project_id: impl Into<String>) -> ProjectEventReceiver {
        let receiver = self.sender.subscribe();
        ProjectEventReceiver {
            receiver,
            project_id: project_id.into(),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiver for all domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Try to receive an event without waiting
    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver for one project's orchestration events (filtered)
pub struct ProjectEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    project_id: String,
}

impl ProjectEventReceiver {
    pub async fn recv(&mut self) -> Result<OrchestrationEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Closed => EventBusError::Closed,
                broadcast::error::RecvError::Lagged(n) => {
                    warn!("Event receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;

            if let DomainEvent::Orchestration(event) = event {
                if self.matches_project(&event) {
                    return Ok(event);
                }
            }
        }
    }

    fn matches_project(&self, event: &OrchestrationEvent) -> bool {
        let project_id = match event {
            OrchestrationEvent::RunStarted { project_id, .. } => project_id,
            OrchestrationEvent::TaskStarted { project_id, .. } => project_id,
            OrchestrationEvent::TaskRetrying { project_id, .. } => project_id,
            OrchestrationEvent::TaskCompleted { project_id, .. } => project_id,
            OrchestrationEvent::TaskBlocked { project_id, .. } => project_id,
            OrchestrationEvent::TaskSkipped { project_id, .. } => project_id,
            OrchestrationEvent::RunFinished { project_id, .. } => project_id,
        };
        project_id == &self.project_id
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        event_bus.publish_coordination_event(CoordinationEvent::TaskClaimed {
            task_id: "t1".to_string(),
            agent_id: "agent-a".to_string(),
            lease_expires_at: Utc::now(),
        });

        let received = receiver.recv().await.unwrap();
        match received {
            DomainEvent::Coordination(CoordinationEvent::TaskClaimed { task_id, agent_id, .. }) => {
                assert_eq!(task_id, "t1");
                assert_eq!(agent_id, "agent-a");
            }
            _ => panic!("Wrong event type received"),
        }
    }

    #[tokio::test]
    async fn test_project_event_filtering() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe_project("p1");

        event_bus.publish_orchestration_event(OrchestrationEvent::TaskSkipped {
            project_id: "other".to_string(),
            task_id: "x".to_string(),
            state: crate::domain::task::TaskState::NotStarted,
        });
        event_bus.publish_orchestration_event(OrchestrationEvent::TaskCompleted {
            project_id: "p1".to_string(),
            task_id: "a".to_string(),
            attempts: 1,
            completed_at: Utc::now(),
        });

        match receiver.recv().await.unwrap() {
            OrchestrationEvent::TaskCompleted { task_id, .. } => assert_eq!(task_id, "a"),
            other => panic!("Wrong event received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_try_recv_empty_and_subscriber_count() {
        let event_bus = EventBus::new(4);
        let mut receiver1 = event_bus.subscribe();
        let _receiver2 = event_bus.subscribe();

        assert_eq!(event_bus.subscriber_count(), 2);
        assert!(matches!(receiver1.try_recv(), Err(EventBusError::Empty)));
    }
}
