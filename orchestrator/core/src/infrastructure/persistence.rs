// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Resilient record I/O
//
// JSON/YAML read and write helpers that retry transient filesystem faults
// (synced or networked mounts surface TimedOut/ResourceBusy/etc.) under a
// RetryPolicy. Writes create the parent directory and fsync before returning.

use std::io;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::infrastructure::resilience::{retry_with_backoff, RetryPolicy, Transient};

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Persistence circuit is open")]
    CircuitOpen,
}

impl Transient for PersistenceError {
    fn is_transient(&self) -> bool {
        match self {
            PersistenceError::Io(err) => err.is_transient(),
            PersistenceError::Serialization(_) | PersistenceError::CircuitOpen => false,
        }
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for PersistenceError {
    fn from(err: serde_yaml::Error) -> Self {
        PersistenceError::Serialization(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    Json,
    Yaml,
}

impl RecordFormat {
    /// Pick a format from the file extension, JSON unless it says yaml/yml.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => RecordFormat::Yaml,
            _ => RecordFormat::Json,
        }
    }

    fn encode<T: Serialize>(self, value: &T) -> Result<Vec<u8>, PersistenceError> {
        match self {
            RecordFormat::Json => Ok(serde_json::to_vec_pretty(value)?),
            RecordFormat::Yaml => Ok(serde_yaml::to_string(value)?.into_bytes()),
        }
    }

    fn decode<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T, PersistenceError> {
        match self {
            RecordFormat::Json => Ok(serde_json::from_slice(bytes)?),
            RecordFormat::Yaml => Ok(serde_yaml::from_slice(bytes)?),
        }
    }
}

/// Read and decode the record at `path`, format chosen by extension.
pub async fn read_record<T: DeserializeOwned>(
    path: &Path,
    policy: &RetryPolicy,
) -> Result<T, PersistenceError> {
    let format = RecordFormat::from_path(path);
    let bytes = retry_with_backoff(policy, "read_record", || async {
        tokio::fs::read(path).await.map_err(PersistenceError::from)
    })
    .await?;
    format.decode(&bytes)
}

/// Encode `value` and write it to `path`, creating parent directories.
pub async fn write_record<T: Serialize>(
    path: &Path,
    value: &T,
    policy: &RetryPolicy,
) -> Result<(), PersistenceError> {
    let bytes = RecordFormat::from_path(path).encode(value)?;
    retry_with_backoff(policy, "write_record", || write_bytes(path, &bytes)).await
}

async fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::{Project, Task};

    #[tokio::test]
    async fn test_json_round_trip_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/project.json");

        let mut project = Project::new("p1", "demo");
        project.add_task(Task::new("a", "A")).unwrap();

        write_record(&path, &project, &RetryPolicy::default()).await.unwrap();
        let loaded: Project = read_record(&path, &RetryPolicy::default()).await.unwrap();
        assert_eq!(loaded, project);
    }

    #[tokio::test]
    async fn test_yaml_selected_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.yaml");

        write_record(&path, &Project::new("p2", "yaml"), &RetryPolicy::default())
            .await
            .unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("id: p2"));
    }

    #[tokio::test]
    async fn test_missing_file_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_record::<Project>(&dir.path().join("absent.json"), &RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert!(matches!(err, PersistenceError::Io(ref e) if e.kind() == io::ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_corrupt_record_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, b"{not json").unwrap();

        let err = read_record::<Project>(&path, &RetryPolicy::default()).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Serialization(_)));
    }
}
