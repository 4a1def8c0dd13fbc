// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Coordination Domain Layer
//!
//! Pure domain types for multi-agent coordination. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`agent`] | `AgentInfo`, `TaskClaim`, `ClaimError`, `AgentMatcher` |
//! | [`deadlock`] | `DeadlockCycle`, `DeadlockSeverity`, `DeadlockResolution`, `CircularDependencyError` |
//! | [`conflict`] | `ConflictType`, `ResolutionStrategy`, `ConflictRecord`, `TaskModification` |

pub mod agent;
pub mod conflict;
pub mod deadlock;

pub use agent::*;
pub use conflict::*;
pub use deadlock::*;
