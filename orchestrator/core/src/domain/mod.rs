// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Task/Project model, dependency graph algorithms, the task state machine,
//! coordinator configuration and the collaborator seams (executor,
//! decomposer, persistence).
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types and rules; no I/O

pub mod config;
pub mod decomposer;
pub mod events;
pub mod graph;
pub mod repository;
pub mod runtime;
pub mod task;
pub mod transition;
