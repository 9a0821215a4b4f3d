//! Checkpoint and run-state store traits.
//!
//! The infrastructure layer (steadfast-infra) implements these with JSON
//! files. Tests use in-memory implementations.

use std::path::{Path, PathBuf};

use steadfast_types::checkpoint::WorkflowCheckpoint;
use steadfast_types::error::StoreError;
use steadfast_types::run::RunState;

/// Durable storage for one checkpoint document per workflow id.
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint for `workflow_id`, `None` if none exists.
    ///
    /// A present but unreadable document is `StoreError::Malformed`.
    fn load(
        &self,
        workflow_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowCheckpoint>, StoreError>> + Send;

    /// Replace the stored checkpoint with `checkpoint` as a whole.
    fn save(
        &self,
        checkpoint: &WorkflowCheckpoint,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Delete the checkpoint. Returns `true` if it existed.
    fn delete(
        &self,
        workflow_id: &str,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;
}

/// Storage for executor run summaries.
pub trait RunStateStore: Send + Sync {
    /// Persist `state`, returning the location it was written to.
    fn save_run_state(
        &self,
        state: &RunState,
    ) -> impl std::future::Future<Output = Result<PathBuf, StoreError>> + Send;

    /// Load a run summary previously written to `path`.
    fn load_run_state(
        &self,
        path: &Path,
    ) -> impl std::future::Future<Output = Result<Option<RunState>, StoreError>> + Send;
}
