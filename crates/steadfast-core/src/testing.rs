//! Test doubles for the driver and store ports.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use steadfast_types::checkpoint::WorkflowCheckpoint;
use steadfast_types::driver::{Action, StructuralSignature, WaitState};
use steadfast_types::error::{DriverError, StoreError};
use steadfast_types::run::RunState;

use crate::driver::AutomationDriver;
use crate::repository::checkpoint::{CheckpointStore, RunStateStore};

// ---------------------------------------------------------------------------
// MockDriver
// ---------------------------------------------------------------------------

/// Scriptable driver. Handles are the selector strings that resolved.
#[derive(Default)]
pub(crate) struct MockDriver {
    /// Network goes idle after this long; `None` means never.
    pub network_idle_after: Option<Duration>,
    /// Signatures returned in order; the last one repeats.
    signatures: Mutex<VecDeque<StructuralSignature>>,
    signature_error: bool,
    /// Per-selector outcomes consumed in order, then `static_selectors`.
    scripts: Mutex<HashMap<String, VecDeque<bool>>>,
    static_selectors: HashMap<String, bool>,
    resolve_delay: Duration,
    fail_actions: bool,
    pub actions: Mutex<Vec<(String, Action)>>,
    pub resolve_calls: Mutex<Vec<(String, Duration)>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn network_idle_after(mut self, after: Duration) -> Self {
        self.network_idle_after = Some(after);
        self
    }

    pub fn signatures(self, sigs: Vec<StructuralSignature>) -> Self {
        *self.signatures.lock().unwrap() = sigs.into();
        self
    }

    pub fn failing_signatures(mut self) -> Self {
        self.signature_error = true;
        self
    }

    pub fn selector(mut self, selector: &str, found: bool) -> Self {
        self.static_selectors.insert(selector.to_string(), found);
        self
    }

    pub fn selector_script(self, selector: &str, outcomes: Vec<bool>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(selector.to_string(), outcomes.into());
        self
    }

    pub fn resolve_delay(mut self, delay: Duration) -> Self {
        self.resolve_delay = delay;
        self
    }

    pub fn failing_actions(mut self) -> Self {
        self.fail_actions = true;
        self
    }

    fn next_outcome(&self, selector: &str) -> bool {
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(selector)
            .and_then(|queue| queue.pop_front());
        scripted.unwrap_or_else(|| self.static_selectors.get(selector).copied().unwrap_or(false))
    }
}

impl AutomationDriver for MockDriver {
    type Handle = String;

    async fn await_network_idle(&self, timeout: Duration) -> bool {
        match self.network_idle_after {
            Some(after) if after <= timeout => {
                tokio::time::sleep(after).await;
                true
            }
            _ => {
                tokio::time::sleep(timeout).await;
                false
            }
        }
    }

    async fn read_structural_signature(&self) -> Result<StructuralSignature, DriverError> {
        if self.signature_error {
            return Err(DriverError::Disconnected);
        }
        let mut sigs = self.signatures.lock().unwrap();
        let sig = if sigs.len() > 1 {
            sigs.pop_front()
        } else {
            sigs.front().copied()
        };
        Ok(sig.unwrap_or_default())
    }

    async fn resolve_selector(
        &self,
        selector: &str,
        _state: WaitState,
        timeout: Duration,
    ) -> Result<String, DriverError> {
        self.resolve_calls
            .lock()
            .unwrap()
            .push((selector.to_string(), timeout));
        if self.next_outcome(selector) {
            tokio::time::sleep(self.resolve_delay.min(timeout)).await;
            Ok(selector.to_string())
        } else {
            tokio::time::sleep(timeout).await;
            Err(DriverError::Timeout {
                target: selector.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }

    async fn perform_action(&self, handle: &String, action: &Action) -> Result<(), DriverError> {
        if self.fail_actions {
            return Err(DriverError::ActionFailed(format!("{} on {handle}", action.kind())));
        }
        self.actions
            .lock()
            .unwrap()
            .push((handle.clone(), action.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory stores
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub(crate) struct MemoryCheckpointStore {
    pub docs: Arc<Mutex<HashMap<String, WorkflowCheckpoint>>>,
    pub saves: Arc<AtomicU32>,
    pub fail_writes: Arc<AtomicBool>,
    pub malformed: Arc<AtomicBool>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, workflow_id: &str) -> Option<WorkflowCheckpoint> {
        self.docs.lock().unwrap().get(workflow_id).cloned()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, workflow_id: &str) -> Result<Option<WorkflowCheckpoint>, StoreError> {
        if self.malformed.load(Ordering::SeqCst) {
            return Err(StoreError::Malformed {
                path: workflow_id.to_string(),
                message: "expected value at line 1 column 1".to_string(),
            });
        }
        Ok(self.get(workflow_id))
    }

    async fn save(&self, checkpoint: &WorkflowCheckpoint) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                path: checkpoint.workflow_id.clone(),
                message: "disk full".to_string(),
            });
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.docs
            .lock()
            .unwrap()
            .insert(checkpoint.workflow_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn delete(&self, workflow_id: &str) -> Result<bool, StoreError> {
        Ok(self.docs.lock().unwrap().remove(workflow_id).is_some())
    }
}

#[derive(Clone, Default)]
pub(crate) struct MemoryRunStateStore {
    pub runs: Arc<Mutex<HashMap<PathBuf, RunState>>>,
}

impl MemoryRunStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path_for(workflow_id: &str) -> PathBuf {
        PathBuf::from(format!("{workflow_id}.run.json"))
    }

    pub fn get(&self, workflow_id: &str) -> Option<RunState> {
        self.runs
            .lock()
            .unwrap()
            .get(&Self::path_for(workflow_id))
            .cloned()
    }
}

impl RunStateStore for MemoryRunStateStore {
    async fn save_run_state(&self, state: &RunState) -> Result<PathBuf, StoreError> {
        let path = Self::path_for(&state.workflow_id);
        self.runs.lock().unwrap().insert(path.clone(), state.clone());
        Ok(path)
    }

    async fn load_run_state(&self, path: &Path) -> Result<Option<RunState>, StoreError> {
        Ok(self.runs.lock().unwrap().get(path).cloned())
    }
}
