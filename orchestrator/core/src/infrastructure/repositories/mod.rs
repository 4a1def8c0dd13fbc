// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of [`ProjectRepository`].
//!
//! # Available Implementations
//!
//! - **InMemoryProjectRepository** - `RwLock<HashMap>` store for tests and
//!   embedded use
//! - **FileProjectRepository** - one JSON/YAML record per project under a
//!   directory, written through the resilient persistence helpers
//! - **ResilientProjectRepository** - wraps any repository with the retry
//!   policy and a circuit breaker
//!
//! # Design Principles
//!
//! 1. **Technology Agnostic**: Domain layer has no knowledge of persistence
//! 2. **Error Mapping**: Infrastructure errors mapped to domain RepositoryError
//! 3. **Fail Fast When Down**: an open breaker rejects calls without touching storage

pub mod file;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::warn;

use crate::domain::repository::{ProjectRepository, RepositoryError};
use crate::domain::task::Project;
use crate::infrastructure::persistence::PersistenceError;
use crate::infrastructure::resilience::{retry_with_backoff, CircuitBreaker, RetryPolicy, Transient};

pub use file::FileProjectRepository;

impl Transient for RepositoryError {
    fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Unavailable(_))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryProjectRepository {
    projects: Arc<RwLock<HashMap<String, Project>>>,
}

impl InMemoryProjectRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectRepository for InMemoryProjectRepository {
    async fn save(&self, project: &Project) -> Result<(), RepositoryError> {
        self.projects
            .write()
            .insert(project.id.clone(), project.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Project>, RepositoryError> {
        Ok(self.projects.read().get(id).cloned())
    }

    async fn list_ids(&self) -> Result<Vec<String>, RepositoryError> {
        let mut ids: Vec<String> = self.projects.read().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        self.projects.write().remove(id);
        Ok(())
    }
}

/// Retry + circuit breaker around another repository.
pub struct ResilientProjectRepository {
    inner: Arc<dyn ProjectRepository>,
    policy: RetryPolicy,
    breaker: CircuitBreaker,
}

impl ResilientProjectRepository {
    pub fn new(inner: Arc<dyn ProjectRepository>, policy: RetryPolicy, breaker: CircuitBreaker) -> Self {
        Self {
            inner,
            policy,
            breaker,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn guarded<T, F, Fut>(&self, operation: &str, call: F) -> Result<T, RepositoryError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, RepositoryError>>,
    {
        if !self.breaker.allow_request() {
            warn!(operation, "Persistence circuit open, failing fast");
            return Err(PersistenceError::CircuitOpen.into());
        }

        match retry_with_backoff(&self.policy, operation, call).await {
            Ok(value) => {
                self.breaker.record_success();
                Ok(value)
            }
            Err(err) => {
                // NotFound and bad records say nothing about backend health
                if err.is_transient() {
                    self.breaker.record_failure();
                } else {
                    self.breaker.record_success();
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl ProjectRepository for ResilientProjectRepository {
    async fn save(&self, project: &Project) -> Result<(), RepositoryError> {
        self.guarded("save_project", || self.inner.save(project)).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Project>, RepositoryError> {
        self.guarded("load_project", || self.inner.find_by_id(id)).await
    }

    async fn list_ids(&self) -> Result<Vec<String>, RepositoryError> {
        self.guarded("list_projects", || self.inner.list_ids()).await
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        self.guarded("delete_project", || self.inner.delete(id)).await
    }
}
