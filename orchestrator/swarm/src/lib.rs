// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `taskmesh-swarm`: Multi-Agent Coordination and Orchestration
//!
//! Everything that happens when more than one worker touches the same
//! project: claims, wait-for cycles, concurrent edits, and the driver that
//! runs a project's graph to completion.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `AgentInfo`, `TaskClaim`, `DeadlockCycle`, `ConflictRecord`, `TaskModification` |
//! | [`application`] | Application | `AgentCoordinator`, `DeadlockDetector`, `ConflictResolver`, `Orchestrator`, `HealthMonitor` |
//!
//! ## Key Concepts
//!
//! - **Claim**: a time-limited lease giving one agent exclusive ownership of a
//!   task. Expired leases may be taken over without cleanup.
//! - **Wait-for graph**: dependency edges plus "blocked on" edges. Cycles in
//!   it are deadlocks.
//! - **Modification**: a versioned patch from one agent. A version mismatch
//!   is a conflict, settled by a per-type strategy.
//!
//! Every component is in-memory and process-local. Persistence of projects
//! lives in `taskmesh-core`.

pub mod application;
pub mod domain;

pub use domain::*;
