//! JSON-file checkpoint store.
//!
//! One document per workflow at `{dir}/{workflow_id}.checkpoint.json`,
//! replaced atomically on every save.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use steadfast_core::repository::checkpoint::CheckpointStore;
use steadfast_types::checkpoint::WorkflowCheckpoint;
use steadfast_types::config::CheckpointConfig;
use steadfast_types::error::StoreError;
use tokio::sync::Mutex;

use super::{checkpoint_dir, io_error, validate_key, write_atomic};

const CHECKPOINT_SUFFIX: &str = ".checkpoint.json";

/// Checkpoint store backed by one JSON file per workflow.
///
/// Clones share the per-workflow lock map, so every handle in the process
/// serializes writes to the same file.
#[derive(Debug, Clone)]
pub struct JsonFileCheckpointStore {
    dir: PathBuf,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl JsonFileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for a workflow's checkpoint.
    pub fn path_for(&self, workflow_id: &str) -> Result<PathBuf, StoreError> {
        validate_key(workflow_id)?;
        Ok(self.dir.join(format!("{workflow_id}{CHECKPOINT_SUFFIX}")))
    }

    fn lock_for(&self, workflow_id: &str) -> Arc<Mutex<()>> {
        let entry = self.locks.entry(workflow_id.to_string()).or_default();
        Arc::clone(entry.value())
    }
}

impl CheckpointStore for JsonFileCheckpointStore {
    async fn load(&self, workflow_id: &str) -> Result<Option<WorkflowCheckpoint>, StoreError> {
        let path = self.path_for(workflow_id)?;

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::Malformed {
                path: path.display().to_string(),
                message: e.to_string(),
            })
    }

    async fn save(&self, checkpoint: &WorkflowCheckpoint) -> Result<(), StoreError> {
        let path = self.path_for(&checkpoint.workflow_id)?;
        let bytes = serde_json::to_vec_pretty(checkpoint)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let lock = self.lock_for(&checkpoint.workflow_id);
        let _guard = lock.lock().await;
        write_atomic(&path, &bytes)
            .await
            .map_err(|e| io_error(&path, e))?;

        tracing::trace!(
            workflow_id = %checkpoint.workflow_id,
            path = %path.display(),
            "checkpoint written"
        );
        Ok(())
    }

    async fn delete(&self, workflow_id: &str) -> Result<bool, StoreError> {
        let path = self.path_for(workflow_id)?;

        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}

/// Workflow ids of every checkpoint file in `dir`, sorted.
///
/// A missing directory yields an empty list.
pub async fn list_checkpoints(dir: &Path) -> Result<Vec<String>, StoreError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(dir, e)),
    };

    let mut ids = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(dir, e))? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with('.') {
            continue;
        }
        if let Some(id) = name.strip_suffix(CHECKPOINT_SUFFIX) {
            ids.push(id.to_string());
        }
    }
    ids.sort();
    Ok(ids)
}

/// Remove checkpoint files in `dir` last modified more than `retention_hours` ago.
///
/// Returns how many files were removed. Entries whose metadata cannot be
/// read, or that fail to delete, are logged and skipped.
pub async fn cleanup_old_checkpoints(dir: &Path, retention_hours: u64) -> usize {
    let retention = Duration::from_secs(retention_hours.saturating_mul(3600));

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(dir = %dir.display(), "no checkpoint directory, nothing to clean");
            return 0;
        }
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot read checkpoint directory");
            return 0;
        }
    };

    let now = SystemTime::now();
    let mut removed = 0;

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "failed to read directory entry");
                break;
            }
        };

        let path = entry.path();
        let is_checkpoint = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| !name.starts_with('.') && name.ends_with(CHECKPOINT_SUFFIX));
        if !is_checkpoint {
            continue;
        }

        let modified = match entry.metadata().await.and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable checkpoint");
                continue;
            }
        };

        // Files with a modification time in the future are never expired.
        let age = now.duration_since(modified).unwrap_or_default();
        if age <= retention {
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), age_secs = age.as_secs(), "removed expired checkpoint");
                removed += 1;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove expired checkpoint");
            }
        }
    }

    if removed > 0 {
        tracing::info!(dir = %dir.display(), removed, retention_hours, "checkpoint cleanup finished");
    }
    removed
}

/// Apply the `[checkpoint]` retention to the configured checkpoint directory.
pub async fn cleanup_expired(data_dir: &Path, config: &CheckpointConfig) -> usize {
    cleanup_old_checkpoints(&checkpoint_dir(data_dir, config), config.retention_hours).await
}
