//! Run summaries written as `{dir}/{workflow_id}.run.json`.

use std::path::{Path, PathBuf};

use steadfast_core::repository::checkpoint::RunStateStore;
use steadfast_types::error::StoreError;
use steadfast_types::run::RunState;

use super::{io_error, validate_key, write_atomic};

/// Run-state store writing one JSON file per workflow run.
#[derive(Debug, Clone)]
pub struct FileRunStateStore {
    dir: PathBuf,
}

impl FileRunStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, workflow_id: &str) -> Result<PathBuf, StoreError> {
        validate_key(workflow_id)?;
        Ok(self.dir.join(format!("{workflow_id}.run.json")))
    }
}

impl RunStateStore for FileRunStateStore {
    async fn save_run_state(&self, state: &RunState) -> Result<PathBuf, StoreError> {
        let path = self.path_for(&state.workflow_id)?;
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        write_atomic(&path, &bytes)
            .await
            .map_err(|e| io_error(&path, e))?;
        Ok(path)
    }

    async fn load_run_state(&self, path: &Path) -> Result<Option<RunState>, StoreError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(path, e)),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::Malformed {
                path: path.display().to_string(),
                message: e.to_string(),
            })
    }
}
