// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod persistence;
pub mod repositories;
pub mod resilience;
pub mod telemetry;

pub use event_bus::{DomainEvent, EventBus, EventBusError};
pub use resilience::{retry_with_backoff, CircuitBreaker, CircuitState, RetryPolicy};
