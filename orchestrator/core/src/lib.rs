// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Taskmesh Core
//!
//! Task graph model and the shared infrastructure every coordination
//! component builds on.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, state machine, persistence and telemetry

pub mod domain;
pub mod infrastructure;

pub use domain::*;
