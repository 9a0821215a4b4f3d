//! Durable per-stage checkpoint manager.
//!
//! Wraps a `CheckpointStore` with a higher-level API for recording stage
//! transitions of one workflow. Every transition rewrites the whole
//! checkpoint so that a crashed run can resume after its last completed
//! stage. Store failures are logged and swallowed: a run never fails
//! because its checkpoint could not be written.

use chrono::Utc;
use steadfast_types::checkpoint::{
    CheckpointSummary, JsonMap, StageCheckpoint, StagePayload, StageStatus, WorkflowCheckpoint,
    payload_to_map,
};
use steadfast_types::error::StoreError;
use tokio::sync::Mutex;

use crate::repository::checkpoint::CheckpointStore;

#[derive(Debug, Default)]
struct Slot {
    loaded: bool,
    checkpoint: Option<WorkflowCheckpoint>,
}

// ---------------------------------------------------------------------------
// CheckpointManager
// ---------------------------------------------------------------------------

/// Manages the checkpoint of a single workflow id.
///
/// Generic over `S: CheckpointStore` so it works with the JSON file store
/// or an in-memory mock. The in-memory copy is loaded lazily on first use
/// and guarded by an async mutex that is held across the store write, so
/// concurrent saves on one manager never lose each other's stages.
pub struct CheckpointManager<S: CheckpointStore> {
    store: S,
    workflow_id: String,
    workflow_type: String,
    slot: Mutex<Slot>,
}

impl<S: CheckpointStore> CheckpointManager<S> {
    pub fn new(store: S, workflow_id: impl Into<String>, workflow_type: impl Into<String>) -> Self {
        Self {
            store,
            workflow_id: workflow_id.into(),
            workflow_type: workflow_type.into(),
            slot: Mutex::new(Slot::default()),
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Upsert `stage` with `status`, merging `data` and `global_data` key by key.
    ///
    /// A completed stage keeps its `completed` status; later saves only merge data.
    pub async fn save_checkpoint(
        &self,
        stage: &str,
        status: StageStatus,
        data: Option<JsonMap>,
        global_data: Option<JsonMap>,
    ) {
        self.transition(stage, status, data, global_data, None).await;
    }

    pub async fn mark_stage_in_progress(&self, stage: &str) {
        self.transition(stage, StageStatus::InProgress, None, None, None)
            .await;
    }

    pub async fn mark_stage_complete(&self, stage: &str, data: Option<JsonMap>) {
        self.transition(stage, StageStatus::Completed, data, None, None)
            .await;
    }

    /// Mark `stage` failed and record `error` as the workflow's last error.
    pub async fn mark_stage_failed(&self, stage: &str, error: &str, data: Option<JsonMap>) {
        self.transition(stage, StageStatus::Failed, data, None, Some(error))
            .await;
    }

    /// Merge a typed payload into its stage's data.
    pub async fn save_stage_payload<P: StagePayload>(
        &self,
        payload: &P,
        status: StageStatus,
    ) -> Result<(), StoreError> {
        let data = payload_to_map(payload).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.transition(P::STAGE, status, Some(data), None, None)
            .await;
        Ok(())
    }

    /// Record a workflow-level error without touching any stage.
    pub async fn record_error(&self, error: &str) {
        let mut slot = self.slot.lock().await;
        self.ensure_loaded(&mut slot).await;
        let checkpoint = slot
            .checkpoint
            .get_or_insert_with(|| WorkflowCheckpoint::new(&self.workflow_id, &self.workflow_type));
        checkpoint.last_error = Some(error.to_string());
        checkpoint.updated_at = Utc::now();
        self.persist(checkpoint).await;
    }

    /// Increment the retry counter of `stage`, or of the workflow when `None`.
    ///
    /// Returns the new count.
    pub async fn increment_retry(&self, stage: Option<&str>) -> u32 {
        let mut slot = self.slot.lock().await;
        self.ensure_loaded(&mut slot).await;
        let checkpoint = slot
            .checkpoint
            .get_or_insert_with(|| WorkflowCheckpoint::new(&self.workflow_id, &self.workflow_type));

        let count = match stage {
            Some(name) => {
                let entry = checkpoint
                    .stages
                    .entry(name.to_string())
                    .or_insert_with(|| StageCheckpoint::new(name));
                entry.retry_count += 1;
                entry.retry_count
            }
            None => {
                checkpoint.retry_count += 1;
                checkpoint.retry_count
            }
        };
        checkpoint.updated_at = Utc::now();

        tracing::debug!(
            workflow_id = %self.workflow_id,
            stage = stage.unwrap_or("<workflow>"),
            count,
            "incremented retry count"
        );
        self.persist(checkpoint).await;
        count
    }

    /// Delete the stored checkpoint and reset the in-memory copy.
    pub async fn clear_checkpoint(&self) {
        let mut slot = self.slot.lock().await;
        match self.store.delete(&self.workflow_id).await {
            Ok(existed) => {
                tracing::debug!(workflow_id = %self.workflow_id, existed, "cleared checkpoint");
            }
            Err(e) => {
                tracing::warn!(workflow_id = %self.workflow_id, error = %e, "failed to delete checkpoint");
            }
        }
        slot.checkpoint = None;
        slot.loaded = true;
    }

    async fn transition(
        &self,
        stage: &str,
        status: StageStatus,
        data: Option<JsonMap>,
        global_data: Option<JsonMap>,
        error: Option<&str>,
    ) {
        let mut slot = self.slot.lock().await;
        self.ensure_loaded(&mut slot).await;

        let now = Utc::now();
        let checkpoint = slot
            .checkpoint
            .get_or_insert_with(|| WorkflowCheckpoint::new(&self.workflow_id, &self.workflow_type));
        let entry = checkpoint
            .stages
            .entry(stage.to_string())
            .or_insert_with(|| StageCheckpoint::new(stage));

        let locked = entry.status == StageStatus::Completed && status != StageStatus::Completed;
        if locked {
            tracing::debug!(
                workflow_id = %self.workflow_id,
                stage,
                requested = %status,
                "stage already completed; keeping status"
            );
        } else {
            entry.status = status;
            if entry.start_time.is_none() {
                entry.start_time = Some(now);
            }
            if status.is_terminal() {
                entry.end_time = Some(now);
            }
            if let Some(message) = error {
                entry.error = Some(message.to_string());
            }
        }
        if let Some(message) = error {
            checkpoint.last_error = Some(message.to_string());
        }

        if let Some(data) = data {
            entry.data.extend(data);
        }
        if let Some(global) = global_data {
            checkpoint.global_data.extend(global);
        }
        checkpoint.current_stage = Some(stage.to_string());
        checkpoint.updated_at = now;

        tracing::debug!(
            workflow_id = %self.workflow_id,
            stage,
            status = %status,
            "checkpointed stage"
        );
        self.persist(checkpoint).await;
    }

    async fn persist(&self, checkpoint: &WorkflowCheckpoint) {
        if let Err(e) = self.store.save(checkpoint).await {
            tracing::warn!(
                workflow_id = %self.workflow_id,
                error = %e,
                "failed to persist checkpoint; resume will not see this transition"
            );
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    async fn fetch(&self) -> Option<WorkflowCheckpoint> {
        match self.store.load(&self.workflow_id).await {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                tracing::warn!(
                    workflow_id = %self.workflow_id,
                    error = %e,
                    "ignoring unreadable checkpoint"
                );
                None
            }
        }
    }

    async fn ensure_loaded(&self, slot: &mut Slot) {
        if !slot.loaded {
            slot.checkpoint = self.fetch().await;
            slot.loaded = true;
        }
    }

    /// Reload from the store. Missing or malformed documents yield `None`.
    pub async fn load_checkpoint(&self) -> Option<WorkflowCheckpoint> {
        let mut slot = self.slot.lock().await;
        slot.checkpoint = self.fetch().await;
        slot.loaded = true;
        if let Some(checkpoint) = &slot.checkpoint {
            tracing::info!(
                workflow_id = %self.workflow_id,
                completed = checkpoint.completed_stages().len(),
                "loaded checkpoint"
            );
        }
        slot.checkpoint.clone()
    }

    async fn read<T>(&self, f: impl FnOnce(Option<&WorkflowCheckpoint>) -> T) -> T {
        let mut slot = self.slot.lock().await;
        self.ensure_loaded(&mut slot).await;
        f(slot.checkpoint.as_ref())
    }

    /// Current in-memory checkpoint.
    pub async fn snapshot(&self) -> Option<WorkflowCheckpoint> {
        self.read(|cp| cp.cloned()).await
    }

    /// True iff `stage` is recorded as completed.
    pub async fn should_skip_stage(&self, stage: &str) -> bool {
        self.read(|cp| cp.is_some_and(|c| c.is_stage_completed(stage)))
            .await
    }

    pub async fn completed_stages(&self) -> Vec<String> {
        self.read(|cp| cp.map(WorkflowCheckpoint::completed_stages).unwrap_or_default())
            .await
    }

    pub async fn failed_stages(&self) -> Vec<String> {
        self.read(|cp| cp.map(WorkflowCheckpoint::failed_stages).unwrap_or_default())
            .await
    }

    pub async fn is_resumable(&self) -> bool {
        self.read(|cp| cp.is_some_and(WorkflowCheckpoint::is_resumable))
            .await
    }

    pub async fn stage_data(&self, stage: &str) -> Option<JsonMap> {
        self.read(|cp| cp.and_then(|c| c.stage(stage)).map(|s| s.data.clone()))
            .await
    }

    /// Decode a stage's data as `P`. `Ok(None)` if the stage was never recorded.
    pub async fn stage_payload<P: StagePayload>(&self) -> Result<Option<P>, StoreError> {
        let Some(data) = self.stage_data(P::STAGE).await else {
            return Ok(None);
        };
        serde_json::from_value(serde_json::Value::Object(data))
            .map(Some)
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub async fn global_data(&self) -> JsonMap {
        self.read(|cp| cp.map(|c| c.global_data.clone()).unwrap_or_default())
            .await
    }

    pub async fn summary(&self) -> Option<CheckpointSummary> {
        self.read(|cp| cp.map(WorkflowCheckpoint::summary)).await
    }
}
