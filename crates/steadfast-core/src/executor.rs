//! Workflow executor: sequential staged runs with retries and checkpoints.
//!
//! The executor is the composition root of the engine. It owns the run
//! lifecycle (`running -> completed | failed`), hands a [`RunContext`] to the
//! caller's stage function and persists a run summary next to the
//! checkpoint.
//!
//! # Execution flow
//!
//! 1. Assign a workflow id (UUIDv7 unless given) and open its checkpoint.
//! 2. Invoke the stage function directly or under the run-level retry handler.
//! 3. Inside the stage function, each `RunContext::run_stage` skips completed
//!    stages, records `in_progress`, runs the stage and records its terminal
//!    status before returning.
//! 4. Record the terminal run status and persist the run summary.

use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use steadfast_types::checkpoint::JsonMap;
use steadfast_types::config::EngineConfig;
use steadfast_types::locator::LocatorConfig;
use steadfast_types::error::{ResumeError, RetryClassify};
use steadfast_types::retry::RetryMetrics;
use steadfast_types::run::{ExecutionMetrics, RetryMode, RunState, RunStatus};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

use crate::checkpoint::CheckpointManager;
use crate::locator::ResilientLocator;
use crate::repository::checkpoint::{CheckpointStore, RunStateStore};
use crate::retry::{EnhancedRetryHandler, RetryPolicy};
use crate::wait::{AdaptiveWaitTracker, WaitStrategy};

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

struct RunInner<C: CheckpointStore, R: RunStateStore> {
    workflow_id: String,
    context: JsonMap,
    checkpoint: CheckpointManager<C>,
    runs: Arc<R>,
    state: Mutex<RunState>,
    stage_retry: Option<Arc<EnhancedRetryHandler>>,
    waits: Arc<AdaptiveWaitTracker>,
    wait_strategy: WaitStrategy,
    locator: Arc<ResilientLocator>,
    resumed_stages: HashSet<String>,
    resumed_data: JsonMap,
}

/// Handle passed to the stage function of a run. Cheap to clone.
pub struct RunContext<C: CheckpointStore, R: RunStateStore> {
    inner: Arc<RunInner<C, R>>,
}

impl<C: CheckpointStore, R: RunStateStore> Clone for RunContext<C, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: CheckpointStore, R: RunStateStore> RunContext<C, R> {
    pub fn workflow_id(&self) -> &str {
        &self.inner.workflow_id
    }

    /// Caller-supplied context of the run.
    pub fn context(&self) -> &JsonMap {
        &self.inner.context
    }

    pub fn checkpoint(&self) -> &CheckpointManager<C> {
        &self.inner.checkpoint
    }

    /// Adaptive wait tracker shared by every run of the executor.
    pub fn waits(&self) -> &AdaptiveWaitTracker {
        &self.inner.waits
    }

    /// Polling schedule for [`wait_until`](crate::wait::wait_until) calls made by stages.
    pub fn wait_strategy(&self) -> &WaitStrategy {
        &self.inner.wait_strategy
    }

    /// Fallback-chain locator shared by every run of the executor.
    pub fn locator(&self) -> &ResilientLocator {
        &self.inner.locator
    }

    /// `checkpoint_data` carried over from the run being resumed.
    pub fn resumed_data(&self) -> &JsonMap {
        &self.inner.resumed_data
    }

    /// Snapshot of the run-state mirror.
    pub async fn state(&self) -> RunState {
        self.inner.state.lock().await.clone()
    }

    /// True when `stage` completed in this checkpoint or in the resumed run.
    pub async fn should_skip_stage(&self, stage: &str) -> bool {
        self.inner.resumed_stages.contains(stage)
            || self.inner.checkpoint.should_skip_stage(stage).await
    }

    /// Run one stage to a persisted terminal state.
    ///
    /// Returns `Ok(None)` when the stage was already completed. Under
    /// `RetryMode::PerStage` the operation runs through the stage retry
    /// handler. The original error is returned on failure.
    pub async fn run_stage<T, E, F, Fut>(&self, stage: &str, mut operation: F) -> Result<Option<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClassify + Display,
    {
        if self.should_skip_stage(stage).await {
            tracing::info!(workflow_id = %self.inner.workflow_id, stage, "skipping completed stage");
            self.update_state(|s| s.record_completed(stage)).await;
            return Ok(None);
        }

        self.inner.checkpoint.mark_stage_in_progress(stage).await;
        self.update_state(|s| {
            s.current_stage = Some(stage.to_string());
            s.update_time = Utc::now();
        })
        .await;
        tracing::info!(workflow_id = %self.inner.workflow_id, stage, "stage started");

        let result = match &self.inner.stage_retry {
            Some(handler) => {
                let checkpoint = &self.inner.checkpoint;
                let mut attempt = 0u32;
                handler
                    .execute(|| {
                        attempt += 1;
                        let is_retry = attempt > 1;
                        let fut = operation();
                        async move {
                            if is_retry {
                                checkpoint.increment_retry(Some(stage)).await;
                            }
                            fut.await
                        }
                    })
                    .await
            }
            None => operation().await,
        };

        match result {
            Ok(value) => {
                self.inner.checkpoint.mark_stage_complete(stage, None).await;
                self.update_state(|s| s.record_completed(stage)).await;
                tracing::info!(workflow_id = %self.inner.workflow_id, stage, "stage completed");
                Ok(Some(value))
            }
            Err(e) => {
                let message = e.to_string();
                self.inner
                    .checkpoint
                    .mark_stage_failed(stage, &message, None)
                    .await;
                self.update_state(|s| s.record_failed(stage)).await;
                tracing::error!(
                    workflow_id = %self.inner.workflow_id,
                    stage,
                    error = %message,
                    "stage failed"
                );
                Err(e)
            }
        }
    }

    async fn update_state(&self, f: impl FnOnce(&mut RunState)) {
        {
            let mut state = self.inner.state.lock().await;
            f(&mut state);
        }
        self.persist_state().await;
    }

    async fn persist_state(&self) {
        let snapshot = self.inner.state.lock().await.clone();
        if let Err(e) = self.inner.runs.save_run_state(&snapshot).await {
            tracing::warn!(
                workflow_id = %self.inner.workflow_id,
                error = %e,
                "failed to persist run state"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

/// Runs staged workflows with retries, checkpoints and run summaries.
///
/// Generic over the checkpoint store `C` (cloned into one
/// `CheckpointManager` per run) and the run-state store `R`.
pub struct WorkflowExecutor<C: CheckpointStore + Clone, R: RunStateStore> {
    checkpoints: C,
    runs: Arc<R>,
    retry_mode: RetryMode,
    workflow_type: String,
    clear_on_success: bool,
    run_retry: EnhancedRetryHandler,
    stage_retry: Arc<EnhancedRetryHandler>,
    waits: Arc<AdaptiveWaitTracker>,
    wait_strategy: WaitStrategy,
    locator: Arc<ResilientLocator>,
    current: RwLock<Option<RunContext<C, R>>>,
    metrics: RwLock<ExecutionMetrics>,
}

impl<C: CheckpointStore + Clone, R: RunStateStore> WorkflowExecutor<C, R> {
    /// Executor with whole-run retries under `policy`.
    pub fn new(checkpoints: C, runs: R, policy: RetryPolicy) -> Self {
        Self {
            checkpoints,
            runs: Arc::new(runs),
            retry_mode: RetryMode::default(),
            workflow_type: "workflow".to_string(),
            clear_on_success: true,
            run_retry: EnhancedRetryHandler::new(policy.clone()),
            stage_retry: Arc::new(EnhancedRetryHandler::new(policy)),
            waits: Arc::new(AdaptiveWaitTracker::default()),
            wait_strategy: WaitStrategy::default(),
            locator: Arc::new(ResilientLocator::new(LocatorConfig::default())),
            current: RwLock::new(None),
            metrics: RwLock::new(ExecutionMetrics::default()),
        }
    }

    /// Build from the `[retry]`, `[wait]`, `[locator]`, `[executor]` and
    /// `[checkpoint]` config sections.
    pub fn from_config(checkpoints: C, runs: R, config: &EngineConfig) -> Self {
        Self::new(checkpoints, runs, RetryPolicy::new(config.retry.clone()))
            .with_retry_mode(config.executor.retry_mode)
            .with_workflow_type(config.executor.workflow_type.clone())
            .with_clear_on_success(config.checkpoint.clear_on_success)
            .with_wait_tracker(Arc::new(AdaptiveWaitTracker::new(
                config.wait.adaptive.clone(),
            )))
            .with_wait_strategy(WaitStrategy::new(config.wait.strategy))
            .with_locator(Arc::new(ResilientLocator::new(config.locator.clone())))
    }

    /// Use `tracker` for this executor's runs. Pass the same `Arc` to several
    /// executors to share learned waits between them.
    pub fn with_wait_tracker(mut self, tracker: Arc<AdaptiveWaitTracker>) -> Self {
        self.waits = tracker;
        self
    }

    pub fn with_wait_strategy(mut self, strategy: WaitStrategy) -> Self {
        self.wait_strategy = strategy;
        self
    }

    /// Use `locator` (and its registered chains) for this executor's runs.
    pub fn with_locator(mut self, locator: Arc<ResilientLocator>) -> Self {
        self.locator = locator;
        self
    }

    pub fn with_retry_mode(mut self, mode: RetryMode) -> Self {
        self.retry_mode = mode;
        self
    }

    pub fn with_workflow_type(mut self, workflow_type: impl Into<String>) -> Self {
        self.workflow_type = workflow_type.into();
        self
    }

    pub fn with_clear_on_success(mut self, clear: bool) -> Self {
        self.clear_on_success = clear;
        self
    }

    /// Run `stage_fn` as a new workflow (or under `workflow_id` if given).
    ///
    /// Returns the stage function's value, or its original error.
    pub async fn execute<T, E, F, Fut>(
        &self,
        stage_fn: F,
        context: JsonMap,
        workflow_id: Option<String>,
    ) -> Result<T, E>
    where
        F: FnMut(RunContext<C, R>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClassify + Display,
    {
        self.run(stage_fn, context, workflow_id, None).await
    }

    /// Resume the run summarised in `state_file`.
    ///
    /// The prior workflow id, context, completed stages and checkpoint data
    /// are carried over. A completed run is refused.
    pub async fn resume<T, E, F, Fut>(
        &self,
        state_file: &Path,
        stage_fn: F,
    ) -> Result<T, ResumeError<E>>
    where
        F: FnMut(RunContext<C, R>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClassify + Display,
    {
        let prior = self
            .runs
            .load_run_state(state_file)
            .await?
            .ok_or_else(|| ResumeError::NotFound(state_file.to_path_buf()))?;

        if prior.status == RunStatus::Completed {
            tracing::warn!(workflow_id = %prior.workflow_id, "refusing to resume completed run");
            return Err(ResumeError::AlreadyCompleted(prior.workflow_id));
        }

        tracing::info!(
            workflow_id = %prior.workflow_id,
            completed = prior.completed_stages.len(),
            "resuming workflow"
        );
        let workflow_id = prior.workflow_id.clone();
        let context = prior.context.clone();
        self.run(stage_fn, context, Some(workflow_id), Some(prior))
            .await
            .map_err(ResumeError::Workflow)
    }

    async fn run<T, E, F, Fut>(
        &self,
        mut stage_fn: F,
        context: JsonMap,
        workflow_id: Option<String>,
        prior: Option<RunState>,
    ) -> Result<T, E>
    where
        F: FnMut(RunContext<C, R>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClassify + Display,
    {
        let workflow_id = workflow_id.unwrap_or_else(|| Uuid::now_v7().to_string());
        let ctx = self.open_run(&workflow_id, context, prior).await;

        let started = Instant::now();
        *self.metrics.write().await = ExecutionMetrics {
            started_at: Some(Utc::now()),
            ..ExecutionMetrics::default()
        };
        *self.current.write().await = Some(ctx.clone());
        ctx.persist_state().await;
        tracing::info!(
            workflow_id = %workflow_id,
            retry_mode = ?self.retry_mode,
            "workflow started"
        );

        let result = match self.retry_mode {
            RetryMode::WholeRun => {
                let mut attempt = 0u32;
                self.run_retry
                    .execute(|| {
                        attempt += 1;
                        let is_retry = attempt > 1;
                        let retry_ctx = ctx.clone();
                        let fut = stage_fn(ctx.clone());
                        async move {
                            if is_retry {
                                retry_ctx.checkpoint().increment_retry(None).await;
                            }
                            fut.await
                        }
                    })
                    .await
            }
            RetryMode::None | RetryMode::PerStage => stage_fn(ctx.clone()).await,
        };

        self.finish(&ctx, &result, started).await;
        result
    }

    async fn open_run(
        &self,
        workflow_id: &str,
        context: JsonMap,
        prior: Option<RunState>,
    ) -> RunContext<C, R> {
        let mut state = RunState::new(workflow_id, context.clone());
        let (resumed_stages, resumed_data) = match prior {
            Some(prior) => {
                state.completed_stages = prior.completed_stages.clone();
                state.checkpoint_data = prior.checkpoint_data.clone();
                (
                    prior.completed_stages.into_iter().collect(),
                    prior.checkpoint_data,
                )
            }
            None => (HashSet::new(), JsonMap::new()),
        };

        let stage_retry = match self.retry_mode {
            RetryMode::PerStage => Some(Arc::clone(&self.stage_retry)),
            RetryMode::None | RetryMode::WholeRun => None,
        };

        RunContext {
            inner: Arc::new(RunInner {
                workflow_id: workflow_id.to_string(),
                context,
                checkpoint: CheckpointManager::new(
                    self.checkpoints.clone(),
                    workflow_id,
                    self.workflow_type.as_str(),
                ),
                runs: Arc::clone(&self.runs),
                state: Mutex::new(state),
                stage_retry,
                waits: Arc::clone(&self.waits),
                wait_strategy: self.wait_strategy,
                locator: Arc::clone(&self.locator),
                resumed_stages,
                resumed_data,
            }),
        }
    }

    async fn finish<T, E: Display>(
        &self,
        ctx: &RunContext<C, R>,
        result: &Result<T, E>,
        started: Instant,
    ) {
        if let Err(e) = result {
            ctx.checkpoint().record_error(&e.to_string()).await;
        }
        let global = ctx.checkpoint().global_data().await;

        let final_state = {
            let mut state = ctx.inner.state.lock().await;
            state.status = if result.is_ok() {
                RunStatus::Completed
            } else {
                RunStatus::Failed
            };
            state.checkpoint_data.extend(global);
            state.update_time = Utc::now();
            state.clone()
        };
        ctx.persist_state().await;

        let duration_ms = started.elapsed().as_millis() as u64;
        {
            let mut metrics = self.metrics.write().await;
            metrics.finished_at = Some(Utc::now());
            metrics.duration_ms = Some(duration_ms);
            metrics.stages_completed = final_state.completed_stages.len();
            metrics.stages_failed = final_state.failed_stages.len();
        }

        match result {
            Ok(_) => {
                if self.clear_on_success {
                    ctx.checkpoint().clear_checkpoint().await;
                }
                tracing::info!(
                    workflow_id = %final_state.workflow_id,
                    duration_ms,
                    stages = final_state.completed_stages.len(),
                    "workflow completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    workflow_id = %final_state.workflow_id,
                    duration_ms,
                    error = %e,
                    "workflow failed"
                );
            }
        }
    }

    /// Run-state mirror of the current (or last) run.
    pub async fn status(&self) -> Option<RunState> {
        let ctx = self.current.read().await.clone();
        match ctx {
            Some(ctx) => Some(ctx.state().await),
            None => None,
        }
    }

    /// Timing and stage counts of the current (or last) run.
    pub async fn metrics(&self) -> ExecutionMetrics {
        self.metrics.read().await.clone()
    }

    pub fn run_retry_metrics(&self) -> RetryMetrics {
        self.run_retry.metrics()
    }

    pub fn stage_retry_metrics(&self) -> RetryMetrics {
        self.stage_retry.metrics()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use serde_json::json;
    use steadfast_types::error::DriverError;
    use steadfast_types::retry::RetryConfig;

    use super::*;
    use crate::testing::{MemoryCheckpointStore, MemoryRunStateStore};

    type Ctx = RunContext<MemoryCheckpointStore, MemoryRunStateStore>;

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts,
            initial_delay_ms: 10,
            jitter: false,
            ..RetryConfig::default()
        })
    }

    fn executor(
        checkpoints: &MemoryCheckpointStore,
        runs: &MemoryRunStateStore,
        mode: RetryMode,
    ) -> WorkflowExecutor<MemoryCheckpointStore, MemoryRunStateStore> {
        WorkflowExecutor::new(checkpoints.clone(), runs.clone(), quick_policy(3))
            .with_retry_mode(mode)
            .with_workflow_type("bulk_claim")
    }

    fn ctx_map(value: serde_json::Value) -> JsonMap {
        match value {
            serde_json::Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_run_completes_and_clears_checkpoint() {
        let checkpoints = MemoryCheckpointStore::new();
        let runs = MemoryRunStateStore::new();
        let executor = executor(&checkpoints, &runs, RetryMode::None);

        let total = executor
            .execute(
                |ctx: Ctx| async move {
                    let a = ctx.run_stage("login", || async { Ok::<u32, DriverError>(1) }).await?;
                    let b = ctx.run_stage("claim", || async { Ok::<u32, DriverError>(2) }).await?;
                    Ok::<u32, DriverError>(a.unwrap_or(0) + b.unwrap_or(0))
                },
                ctx_map(json!({"account": "alice"})),
                Some("wf-ok".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(total, 3);

        let state = runs.get("wf-ok").unwrap();
        assert_eq!(state.status, RunStatus::Completed);
        assert_eq!(state.completed_stages, vec!["login", "claim"]);
        assert_eq!(state.context["account"], json!("alice"));
        assert!(checkpoints.get("wf-ok").is_none(), "cleared on success");

        let metrics = executor.metrics().await;
        assert_eq!(metrics.stages_completed, 2);
        assert!(metrics.finished_at.is_some());
        assert_eq!(executor.status().await.unwrap().status, RunStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkpoint_kept_when_clear_disabled() {
        let checkpoints = MemoryCheckpointStore::new();
        let runs = MemoryRunStateStore::new();
        let executor =
            executor(&checkpoints, &runs, RetryMode::None).with_clear_on_success(false);

        executor
            .execute(
                |ctx: Ctx| async move {
                    ctx.run_stage("only", || async { Ok::<(), DriverError>(()) }).await?;
                    Ok::<(), DriverError>(())
                },
                JsonMap::new(),
                Some("wf-keep".to_string()),
            )
            .await
            .unwrap();

        let stored = checkpoints.get("wf-keep").unwrap();
        assert_eq!(stored.workflow_type, "bulk_claim");
        assert_eq!(stored.completed_stages(), vec!["only".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_returns_original_error_and_records_state() {
        let checkpoints = MemoryCheckpointStore::new();
        let runs = MemoryRunStateStore::new();
        let executor = executor(&checkpoints, &runs, RetryMode::None);

        let err = executor
            .execute(
                |ctx: Ctx| async move {
                    ctx.run_stage("login", || async { Ok::<(), DriverError>(()) }).await?;
                    ctx.run_stage("claim", || async {
                        Err::<(), _>(DriverError::NotFound("#claim".to_string()))
                    })
                    .await?;
                    Ok::<(), DriverError>(())
                },
                JsonMap::new(),
                Some("wf-fail".to_string()),
            )
            .await
            .unwrap_err();
        assert_eq!(err, DriverError::NotFound("#claim".to_string()));

        let state = runs.get("wf-fail").unwrap();
        assert_eq!(state.status, RunStatus::Failed);
        assert_eq!(state.failed_stages, vec!["claim"]);
        assert_eq!(state.current_stage.as_deref(), Some("claim"));

        let stored = checkpoints.get("wf-fail").unwrap();
        assert!(stored.is_resumable());
        assert_eq!(
            stored.last_error.as_deref(),
            Some("element not found: #claim")
        );
        assert_eq!(executor.metrics().await.stages_failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_whole_run_retry_skips_completed_stages() {
        let checkpoints = MemoryCheckpointStore::new();
        let runs = MemoryRunStateStore::new();
        let executor = executor(&checkpoints, &runs, RetryMode::WholeRun);
        let login_calls = Arc::new(AtomicU32::new(0));
        let claim_calls = Arc::new(AtomicU32::new(0));

        executor
            .execute(
                |ctx: Ctx| {
                    let login_calls = login_calls.clone();
                    let claim_calls = claim_calls.clone();
                    async move {
                        ctx.run_stage("login", || {
                            login_calls.fetch_add(1, Ordering::SeqCst);
                            async { Ok::<(), DriverError>(()) }
                        })
                        .await?;
                        ctx.run_stage("claim", || {
                            let n = claim_calls.fetch_add(1, Ordering::SeqCst);
                            async move {
                                if n == 0 {
                                    Err(DriverError::Network("reset".to_string()))
                                } else {
                                    Ok(())
                                }
                            }
                        })
                        .await?;
                        Ok::<(), DriverError>(())
                    }
                },
                JsonMap::new(),
                Some("wf-retry".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(login_calls.load(Ordering::SeqCst), 1);
        assert_eq!(claim_calls.load(Ordering::SeqCst), 2);
        assert_eq!(executor.run_retry_metrics().total_retries, 1);

        let state = runs.get("wf-retry").unwrap();
        assert_eq!(state.status, RunStatus::Completed);
        assert!(state.failed_stages.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_stage_retry_counts_in_checkpoint() {
        let checkpoints = MemoryCheckpointStore::new();
        let runs = MemoryRunStateStore::new();
        let executor = executor(&checkpoints, &runs, RetryMode::PerStage)
            .with_clear_on_success(false);
        let calls = Arc::new(AtomicU32::new(0));

        executor
            .execute(
                |ctx: Ctx| {
                    let calls = calls.clone();
                    async move {
                        ctx.run_stage("flaky", || {
                            let n = calls.fetch_add(1, Ordering::SeqCst);
                            async move {
                                if n < 2 {
                                    Err(DriverError::Timeout {
                                        target: "#row".to_string(),
                                        timeout_ms: 100,
                                    })
                                } else {
                                    Ok(n)
                                }
                            }
                        })
                        .await?;
                        Ok::<(), DriverError>(())
                    }
                },
                JsonMap::new(),
                Some("wf-stage".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let stored = checkpoints.get("wf-stage").unwrap();
        assert_eq!(stored.stages["flaky"].retry_count, 2);
        assert_eq!(executor.stage_retry_metrics().total_retries, 2);
        assert_eq!(executor.run_retry_metrics().total_executions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generated_workflow_id_is_uuid() {
        let executor = executor(
            &MemoryCheckpointStore::new(),
            &MemoryRunStateStore::new(),
            RetryMode::None,
        );
        executor
            .execute(
                |_ctx: Ctx| async { Ok::<(), DriverError>(()) },
                JsonMap::new(),
                None,
            )
            .await
            .unwrap();
        let id = executor.status().await.unwrap().workflow_id;
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_skips_completed_stages() {
        let checkpoints = MemoryCheckpointStore::new();
        let runs = MemoryRunStateStore::new();
        let first = executor(&checkpoints, &runs, RetryMode::None);

        let _ = first
            .execute(
                |ctx: Ctx| async move {
                    ctx.run_stage("login", || async { Ok::<(), DriverError>(()) }).await?;
                    ctx.checkpoint()
                        .save_checkpoint(
                            "login",
                            steadfast_types::checkpoint::StageStatus::Completed,
                            None,
                            Some(ctx_map(json!({"session": "s-1"}))),
                        )
                        .await;
                    ctx.run_stage("claim", || async {
                        Err::<(), _>(DriverError::Network("down".to_string()))
                    })
                    .await?;
                    Ok::<(), DriverError>(())
                },
                ctx_map(json!({"account": "alice"})),
                Some("wf-resume".to_string()),
            )
            .await;

        let state_file = MemoryRunStateStore::path_for("wf-resume");
        assert_eq!(runs.get("wf-resume").unwrap().checkpoint_data["session"], json!("s-1"));

        let second = executor(&checkpoints, &runs, RetryMode::None);
        let login_calls = Arc::new(AtomicU32::new(0));
        let account = second
            .resume(&state_file, |ctx: Ctx| {
                let login_calls = login_calls.clone();
                async move {
                    ctx.run_stage("login", || {
                        login_calls.fetch_add(1, Ordering::SeqCst);
                        async { Ok::<(), DriverError>(()) }
                    })
                    .await?;
                    ctx.run_stage("claim", || async { Ok::<(), DriverError>(()) }).await?;
                    assert_eq!(ctx.resumed_data()["session"], json!("s-1"));
                    Ok::<String, DriverError>(ctx.context()["account"].to_string())
                }
            })
            .await
            .unwrap();

        assert_eq!(account, "\"alice\"");
        assert_eq!(login_calls.load(Ordering::SeqCst), 0);
        let state = runs.get("wf-resume").unwrap();
        assert_eq!(state.status, RunStatus::Completed);
        assert_eq!(state.completed_stages, vec!["login", "claim"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_refuses_completed_run() {
        let checkpoints = MemoryCheckpointStore::new();
        let runs = MemoryRunStateStore::new();
        let executor = executor(&checkpoints, &runs, RetryMode::None);
        executor
            .execute(
                |_ctx: Ctx| async { Ok::<(), DriverError>(()) },
                JsonMap::new(),
                Some("wf-done".to_string()),
            )
            .await
            .unwrap();

        let err = executor
            .resume(&MemoryRunStateStore::path_for("wf-done"), |_ctx: Ctx| async {
                Ok::<(), DriverError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ResumeError::AlreadyCompleted(id) if id == "wf-done"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_missing_state_file() {
        let executor = executor(
            &MemoryCheckpointStore::new(),
            &MemoryRunStateStore::new(),
            RetryMode::None,
        );
        let err = executor
            .resume(Path::new("nope.run.json"), |_ctx: Ctx| async {
                Ok::<(), DriverError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ResumeError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_from_config() {
        let mut config = EngineConfig::default();
        config.executor.retry_mode = RetryMode::PerStage;
        config.executor.workflow_type = "nightly".to_string();
        config.checkpoint.clear_on_success = false;
        let checkpoints = MemoryCheckpointStore::new();
        let executor =
            WorkflowExecutor::from_config(checkpoints.clone(), MemoryRunStateStore::new(), &config);

        executor
            .execute(
                |ctx: Ctx| async move {
                    ctx.run_stage("s1", || async { Ok::<(), DriverError>(()) }).await?;
                    Ok::<(), DriverError>(())
                },
                JsonMap::new(),
                Some("wf-cfg".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(checkpoints.get("wf-cfg").unwrap().workflow_type, "nightly");
    }

    #[tokio::test(start_paused = true)]
    async fn test_injected_services_reach_run_context() {
        use steadfast_types::locator::SelectorChain;

        let locator = Arc::new(ResilientLocator::new(LocatorConfig::default()));
        locator
            .register_chain(SelectorChain::new("submit", "#submit", 1_000).with_fallback("button.submit"))
            .unwrap();
        let tracker = Arc::new(AdaptiveWaitTracker::default());

        let executor = executor(
            &MemoryCheckpointStore::new(),
            &MemoryRunStateStore::new(),
            RetryMode::None,
        )
        .with_locator(Arc::clone(&locator))
        .with_wait_tracker(Arc::clone(&tracker));

        let chain_len = executor
            .execute(
                |ctx: Ctx| async move {
                    assert!(ctx.waits().learned_wait("page_load").is_none());
                    Ok::<usize, DriverError>(ctx.locator().chain("submit").map_or(0, |c| c.len()))
                },
                JsonMap::new(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(chain_len, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_wait_strategy_bounds_stage_waits() {
        let mut config = EngineConfig::default();
        config.executor.retry_mode = RetryMode::None;
        config.wait.strategy.initial_interval_ms = 50;
        config.wait.strategy.max_interval_ms = 50;
        config.wait.strategy.backoff_factor = 1.0;
        config.wait.strategy.total_timeout_ms = 300;
        let configured = WorkflowExecutor::from_config(
            MemoryCheckpointStore::new(),
            MemoryRunStateStore::new(),
            &config,
        );

        let (ready, waited) = configured
            .execute(
                |ctx: Ctx| async move {
                    assert_eq!(ctx.wait_strategy().total_timeout(), Duration::from_millis(300));
                    let start = Instant::now();
                    let ready =
                        crate::wait::wait_until(|| async { false }, ctx.wait_strategy()).await;
                    Ok::<_, DriverError>((ready, start.elapsed()))
                },
                JsonMap::new(),
                None,
            )
            .await
            .unwrap();
        assert!(!ready);
        assert_eq!(waited, Duration::from_millis(300));

        let custom = executor(
            &MemoryCheckpointStore::new(),
            &MemoryRunStateStore::new(),
            RetryMode::None,
        )
        .with_wait_strategy(WaitStrategy::fixed(10, 40));
        let timeout = custom
            .execute(
                |ctx: Ctx| async move { Ok::<_, DriverError>(ctx.wait_strategy().total_timeout()) },
                JsonMap::new(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(timeout, Duration::from_millis(40));
    }
}
