// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contract for the `Project` aggregate. The trait lives in the
//! domain layer; implementations live in `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `ProjectRepository` | `Project` | `InMemoryProjectRepository`, `FileProjectRepository`, `ResilientProjectRepository` |
//!
//! The engine treats persistence as a plain record store: load a project by
//! id, save it back. Callers wrap it with the retry policy from
//! `crate::infrastructure::resilience`.

use async_trait::async_trait;

use crate::domain::task::Project;

/// Repository interface for Project aggregates
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    /// Save project (create or update)
    async fn save(&self, project: &Project) -> Result<(), RepositoryError>;

    /// Find project by ID
    async fn find_by_id(&self, id: &str) -> Result<Option<Project>, RepositoryError>;

    /// List the ids of every stored project
    async fn list_ids(&self) -> Result<Vec<String>, RepositoryError>;

    /// Delete project by ID
    async fn delete(&self, id: &str) -> Result<(), RepositoryError>;

    /// Load a project that must exist
    async fn load(&self, id: &str) -> Result<Project, RepositoryError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("project '{}'", id)))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Persistence unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
