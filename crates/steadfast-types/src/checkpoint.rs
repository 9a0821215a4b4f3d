//! Workflow and stage checkpoint records.
//!
//! A `WorkflowCheckpoint` is persisted as a single JSON document per
//! workflow id. Field names and status strings are part of the on-disk
//! format and must round-trip exactly.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Free-form JSON object used for stage data and global data.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// StageStatus
// ---------------------------------------------------------------------------

/// Status of one stage within a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StageStatus {
    /// Completed and failed are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Failed)
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StageStatus::Pending => "pending",
            StageStatus::InProgress => "in_progress",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// StageCheckpoint
// ---------------------------------------------------------------------------

/// Progress record of a single stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageCheckpoint {
    pub name: String,
    pub status: StageStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data: JsonMap,
    pub error: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
}

impl StageCheckpoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Pending,
            start_time: None,
            end_time: None,
            data: JsonMap::new(),
            error: None,
            retry_count: 0,
        }
    }

    /// Decode the stage data as a typed payload.
    pub fn payload<P: StagePayload>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(self.data.clone()))
    }
}

// ---------------------------------------------------------------------------
// WorkflowCheckpoint
// ---------------------------------------------------------------------------

/// Durable progress record of a whole workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowCheckpoint {
    pub workflow_id: String,
    pub workflow_type: String,
    pub current_stage: Option<String>,
    #[serde(default)]
    pub stages: BTreeMap<String, StageCheckpoint>,
    #[serde(default)]
    pub global_data: JsonMap,
    #[serde(default)]
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowCheckpoint {
    /// A fresh checkpoint with no stages.
    pub fn new(workflow_id: impl Into<String>, workflow_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            workflow_id: workflow_id.into(),
            workflow_type: workflow_type.into(),
            current_stage: None,
            stages: BTreeMap::new(),
            global_data: JsonMap::new(),
            retry_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn stage(&self, name: &str) -> Option<&StageCheckpoint> {
        self.stages.get(name)
    }

    pub fn is_stage_completed(&self, name: &str) -> bool {
        self.stages
            .get(name)
            .is_some_and(|s| s.status == StageStatus::Completed)
    }

    /// Names of stages with the given status, in name order.
    pub fn stages_with_status(&self, status: StageStatus) -> Vec<String> {
        self.stages
            .values()
            .filter(|s| s.status == status)
            .map(|s| s.name.clone())
            .collect()
    }

    pub fn completed_stages(&self) -> Vec<String> {
        self.stages_with_status(StageStatus::Completed)
    }

    pub fn failed_stages(&self) -> Vec<String> {
        self.stages_with_status(StageStatus::Failed)
    }

    /// At least one stage completed and at least one recorded stage is not.
    pub fn is_resumable(&self) -> bool {
        let completed = self
            .stages
            .values()
            .filter(|s| s.status == StageStatus::Completed)
            .count();
        completed > 0 && completed < self.stages.len()
    }

    /// Compact overview for operators and log lines.
    pub fn summary(&self) -> CheckpointSummary {
        let count = |status| self.stages.values().filter(|s| s.status == status).count();
        CheckpointSummary {
            workflow_id: self.workflow_id.clone(),
            workflow_type: self.workflow_type.clone(),
            current_stage: self.current_stage.clone(),
            total_stages: self.stages.len(),
            completed: count(StageStatus::Completed),
            failed: count(StageStatus::Failed),
            in_progress: count(StageStatus::InProgress),
            retry_count: self.retry_count,
            last_error: self.last_error.clone(),
            resumable: self.is_resumable(),
            updated_at: self.updated_at,
        }
    }
}

/// Aggregated view of a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub workflow_id: String,
    pub workflow_type: String,
    pub current_stage: Option<String>,
    pub total_stages: usize,
    pub completed: usize,
    pub failed: usize,
    pub in_progress: usize,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub resumable: bool,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// StagePayload
// ---------------------------------------------------------------------------

/// Typed view of a stage's `data` object.
///
/// Each stage type declares one payload struct. The payload must serialize
/// to a JSON object; its fields are merged key-by-key into the stored data.
pub trait StagePayload: Serialize + DeserializeOwned {
    /// Stage name this payload belongs to.
    const STAGE: &'static str;
}

/// Serialize a payload into a JSON object map.
///
/// Non-object payloads (e.g. a bare string) are wrapped under `"value"`.
pub fn payload_to_map<P: StagePayload>(payload: &P) -> Result<JsonMap, serde_json::Error> {
    match serde_json::to_value(payload)? {
        serde_json::Value::Object(map) => Ok(map),
        other => {
            let mut map = JsonMap::new();
            map.insert("value".to_string(), other);
            Ok(map)
        }
    }
}
