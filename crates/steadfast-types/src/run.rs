//! Run-level state mirrored by the workflow executor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checkpoint::JsonMap;

/// Run lifecycle: `running -> {completed, failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// How the executor applies retries to a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryMode {
    /// Invoke the stage function once.
    None,
    /// Retry the whole stage function; completed stages are skipped on re-entry.
    #[default]
    WholeRun,
    /// Retry each stage individually inside `run_stage`.
    PerStage,
}

/// Run summary persisted as `{workflow_id}.run.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub workflow_id: String,
    pub status: RunStatus,
    pub current_stage: Option<String>,
    #[serde(default)]
    pub completed_stages: Vec<String>,
    #[serde(default)]
    pub failed_stages: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
    #[serde(default)]
    pub context: JsonMap,
    #[serde(default)]
    pub checkpoint_data: JsonMap,
}

impl RunState {
    pub fn new(workflow_id: impl Into<String>, context: JsonMap) -> Self {
        let now = Utc::now();
        Self {
            workflow_id: workflow_id.into(),
            status: RunStatus::Running,
            current_stage: None,
            completed_stages: Vec::new(),
            failed_stages: Vec::new(),
            start_time: now,
            update_time: now,
            context,
            checkpoint_data: JsonMap::new(),
        }
    }

    /// Record a stage as completed (idempotent, keeps first-completion order).
    pub fn record_completed(&mut self, stage: &str) {
        self.failed_stages.retain(|s| s != stage);
        if !self.completed_stages.iter().any(|s| s == stage) {
            self.completed_stages.push(stage.to_string());
        }
        self.update_time = Utc::now();
    }

    pub fn record_failed(&mut self, stage: &str) {
        if !self.failed_stages.iter().any(|s| s == stage) {
            self.failed_stages.push(stage.to_string());
        }
        self.update_time = Utc::now();
    }
}

/// Timing and counters for one executor run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub stages_completed: usize,
    pub stages_failed: usize,
}
