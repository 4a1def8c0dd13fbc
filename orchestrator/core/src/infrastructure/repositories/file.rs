// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// File-backed project store: `<root>/<project-id>.<json|yaml>`

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::domain::repository::{ProjectRepository, RepositoryError};
use crate::domain::task::Project;
use crate::infrastructure::persistence::{read_record, write_record, PersistenceError, RecordFormat};
use crate::infrastructure::resilience::{RetryPolicy, Transient};

#[derive(Debug, Clone)]
pub struct FileProjectRepository {
    root: PathBuf,
    format: RecordFormat,
    policy: RetryPolicy,
}

impl FileProjectRepository {
    pub fn new(root: impl Into<PathBuf>, format: RecordFormat, policy: RetryPolicy) -> Self {
        Self {
            root: root.into(),
            format,
            policy,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn extension(&self) -> &'static str {
        match self.format {
            RecordFormat::Json => "json",
            RecordFormat::Yaml => "yaml",
        }
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, RepositoryError> {
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(RepositoryError::Storage(format!("invalid project id '{}'", id)));
        }
        Ok(self.root.join(format!("{}.{}", id, self.extension())))
    }
}

impl From<PersistenceError> for RepositoryError {
    fn from(err: PersistenceError) -> Self {
        if err.is_transient() || matches!(err, PersistenceError::CircuitOpen) {
            return RepositoryError::Unavailable(err.to_string());
        }
        match err {
            PersistenceError::Serialization(msg) => RepositoryError::Serialization(msg),
            other => RepositoryError::Storage(other.to_string()),
        }
    }
}

#[async_trait]
impl ProjectRepository for FileProjectRepository {
    async fn save(&self, project: &Project) -> Result<(), RepositoryError> {
        let path = self.path_for(&project.id)?;
        debug!(project_id = %project.id, path = %path.display(), "Saving project");
        write_record(&path, project, &self.policy).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Project>, RepositoryError> {
        let path = self.path_for(id)?;
        match read_record(&path, &self.policy).await {
            Ok(project) => Ok(Some(project)),
            Err(PersistenceError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_ids(&self) -> Result<Vec<String>, RepositoryError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistenceError::Io(e).into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RepositoryError::from(PersistenceError::Io(e)))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(self.extension()) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        let path = self.path_for(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PersistenceError::Io(e).into()),
        }
    }
}
