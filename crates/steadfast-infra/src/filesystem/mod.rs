//! Filesystem layout and atomic file writes for Steadfast data.

pub mod checkpoint;
pub mod run_state;

use std::path::{Path, PathBuf};

use steadfast_types::config::CheckpointConfig;
use steadfast_types::error::StoreError;
use tokio::io::AsyncWriteExt;

pub use checkpoint::{
    JsonFileCheckpointStore, cleanup_expired, cleanup_old_checkpoints, list_checkpoints,
};
pub use run_state::FileRunStateStore;

/// Resolve the Steadfast data directory.
///
/// Checks `STEADFAST_DATA_DIR` first, then `~/.steadfast`, and finally a
/// relative `.steadfast` when no home directory is available.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("STEADFAST_DATA_DIR") {
        return PathBuf::from(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".steadfast"))
        .unwrap_or_else(|| PathBuf::from(".steadfast"))
}

/// Resolve the checkpoint directory from the `[checkpoint]` section.
///
/// Absolute `dir` values are used as-is; relative ones are joined onto
/// `data_dir`. Without a configured dir, checkpoints live in
/// `{data_dir}/checkpoints`.
pub fn checkpoint_dir(data_dir: &Path, config: &CheckpointConfig) -> PathBuf {
    match config.dir.as_deref() {
        Some(dir) if Path::new(dir).is_absolute() => PathBuf::from(dir),
        Some(dir) => data_dir.join(dir),
        None => data_dir.join("checkpoints"),
    }
}

/// Write `contents` to `path` so that readers only ever see the old or the new file.
///
/// Data goes to a hidden sibling temp file which is synced and then renamed
/// over the target. The temp file is removed if any step fails.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    tokio::fs::create_dir_all(parent).await?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("steadfast");
    let tmp_path = parent.join(format!(
        ".{file_name}.{}.tmp",
        uuid::Uuid::now_v7().simple()
    ));

    let result = async {
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, path).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp_path).await;
    }
    result
}

pub(crate) fn io_error(path: &Path, err: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

/// Reject ids that would escape the store directory.
pub(crate) fn validate_key(workflow_id: &str) -> Result<(), StoreError> {
    let bad = workflow_id.is_empty()
        || workflow_id == "."
        || workflow_id == ".."
        || workflow_id.contains(['/', '\\', '\0']);
    if bad {
        return Err(StoreError::InvalidKey(workflow_id.to_string()));
    }
    Ok(())
}
