//! Retry executor with recovery hooks and cumulative metrics.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use steadfast_types::error::{ErrorKind, RetryClassify};
use steadfast_types::retry::{AttemptError, RetryMetrics, RetryOutcome};

use super::policy::RetryPolicy;

// ---------------------------------------------------------------------------
// RetryResult
// ---------------------------------------------------------------------------

/// Detailed record of one retried execution.
#[derive(Debug)]
pub struct RetryResult<T, E> {
    pub outcome: RetryOutcome,
    /// The value, or the original error of the last executed attempt.
    pub result: Result<T, E>,
    pub total_attempts: u32,
    /// Sum of backoff sleeps.
    pub total_delay: Duration,
    pub attempt_errors: Vec<AttemptError>,
}

impl<T, E> RetryResult<T, E> {
    pub fn is_success(&self) -> bool {
        self.outcome == RetryOutcome::Success
    }

    pub fn value(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&E> {
        self.result.as_ref().err()
    }

    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

// ---------------------------------------------------------------------------
// EnhancedRetryHandler
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Counters {
    total_executions: AtomicU64,
    successful_executions: AtomicU64,
    total_retries: AtomicU64,
    total_failures: AtomicU64,
}

/// Executes async operations under a [`RetryPolicy`].
///
/// Attempt flow:
/// 1. Attempt 1 runs the operation immediately.
/// 2. On failure the `state_checker` runs first; `false` ends with
///    `StateInvalid`. Otherwise the error's [`ErrorKind`] decides:
///    `NonRetryable` and `StateInvalid` stop, `Retryable` continues.
/// 3. Before each further attempt: backoff sleep, `pre_retry_action`,
///    then `recovery_validator`.
///
/// The original error is always returned unchanged.
#[derive(Debug)]
pub struct EnhancedRetryHandler {
    policy: RetryPolicy,
    counters: Counters,
}

impl EnhancedRetryHandler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            counters: Counters::default(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation`, returning its value or its last original error.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClassify + Display,
    {
        self.execute_detailed(operation).await.into_result()
    }

    /// Like [`execute`](Self::execute) but reports attempts, delays and outcome.
    pub async fn execute_detailed<T, E, F, Fut>(&self, operation: F) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClassify + Display,
    {
        self.run(operation, |err: &E| err.error_kind()).await
    }

    /// Run with a per-call classifier that overrides the error's own kind.
    pub async fn execute_classified<T, E, F, Fut, C>(
        &self,
        operation: F,
        classify: C,
    ) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        C: Fn(&E) -> ErrorKind,
    {
        self.run(operation, classify).await
    }

    async fn run<T, E, F, Fut, C>(&self, mut operation: F, classify: C) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        C: Fn(&E) -> ErrorKind,
    {
        self.counters.total_executions.fetch_add(1, Ordering::Relaxed);

        let max_attempts = self.policy.max_attempts();
        let mut attempt: u32 = 1;
        let mut total_delay = Duration::ZERO;
        let mut attempt_errors = Vec::new();

        let mut error = match operation().await {
            Ok(value) => return self.succeed(value, attempt, total_delay, attempt_errors),
            Err(err) => err,
        };

        loop {
            tracing::debug!(attempt, max_attempts, error = %error, "attempt failed");
            attempt_errors.push(AttemptError {
                attempt,
                message: error.to_string(),
            });

            if let Some(outcome) = self.abort_outcome(&error, &classify).await {
                return self.fail(outcome, error, attempt, total_delay, attempt_errors);
            }

            // Advance to the next attempt that actually runs the operation.
            loop {
                if attempt >= max_attempts {
                    return self.fail(
                        RetryOutcome::Exhausted,
                        error,
                        attempt,
                        total_delay,
                        attempt_errors,
                    );
                }
                attempt += 1;
                self.counters.total_retries.fetch_add(1, Ordering::Relaxed);

                if self.prepare_retry(attempt, &mut total_delay).await {
                    break;
                }
                attempt_errors.push(AttemptError {
                    attempt,
                    message: "recovery validation failed".to_string(),
                });
            }

            error = match operation().await {
                Ok(value) => return self.succeed(value, attempt, total_delay, attempt_errors),
                Err(err) => err,
            };
        }
    }

    /// Decide whether a failure stops execution regardless of remaining attempts.
    async fn abort_outcome<E, C>(&self, error: &E, classify: &C) -> Option<RetryOutcome>
    where
        C: Fn(&E) -> ErrorKind,
    {
        if let Some(checker) = &self.policy.hooks().state_checker {
            if !checker().await {
                tracing::warn!("state checker reported invalid environment; aborting retries");
                return Some(RetryOutcome::StateInvalid);
            }
        }

        match classify(error) {
            ErrorKind::Retryable => None,
            ErrorKind::NonRetryable => Some(RetryOutcome::NonRetryable),
            ErrorKind::StateInvalid => Some(RetryOutcome::StateInvalid),
        }
    }

    /// Sleep, run the pre-retry action, then validate recovery.
    ///
    /// Returns `false` when the attempt must be counted as failed without
    /// invoking the operation.
    async fn prepare_retry(&self, attempt: u32, total_delay: &mut Duration) -> bool {
        let delay = self.policy.get_delay(attempt as i32 - 2);
        tracing::warn!(
            attempt,
            max_attempts = self.policy.max_attempts(),
            delay_ms = delay.as_millis() as u64,
            "retrying after backoff"
        );
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
            *total_delay += delay;
        }

        let hooks = self.policy.hooks();
        if let Some(action) = &hooks.pre_retry_action {
            action().await;
        }

        if let Some(validator) = &hooks.recovery_validator {
            if !validator().await {
                if self.policy.config().skip_retry_on_validation_failure {
                    tracing::warn!(attempt, "recovery validation failed; skipping attempt");
                    return false;
                }
                tracing::warn!(attempt, "recovery validation failed; retrying anyway");
            }
        }

        true
    }

    fn succeed<T, E>(
        &self,
        value: T,
        attempt: u32,
        total_delay: Duration,
        attempt_errors: Vec<AttemptError>,
    ) -> RetryResult<T, E> {
        self.counters
            .successful_executions
            .fetch_add(1, Ordering::Relaxed);
        if attempt > 1 {
            tracing::debug!(attempt, "operation succeeded after retry");
        }
        RetryResult {
            outcome: RetryOutcome::Success,
            result: Ok(value),
            total_attempts: attempt,
            total_delay,
            attempt_errors,
        }
    }

    fn fail<T, E: Display>(
        &self,
        outcome: RetryOutcome,
        error: E,
        attempt: u32,
        total_delay: Duration,
        attempt_errors: Vec<AttemptError>,
    ) -> RetryResult<T, E> {
        self.counters.total_failures.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            outcome = ?outcome,
            attempts = attempt,
            error = %error,
            "operation failed"
        );
        RetryResult {
            outcome,
            result: Err(error),
            total_attempts: attempt,
            total_delay,
            attempt_errors,
        }
    }

    /// Snapshot of cumulative counters.
    pub fn metrics(&self) -> RetryMetrics {
        RetryMetrics {
            total_executions: self.counters.total_executions.load(Ordering::Relaxed),
            successful_executions: self.counters.successful_executions.load(Ordering::Relaxed),
            total_retries: self.counters.total_retries.load(Ordering::Relaxed),
            total_failures: self.counters.total_failures.load(Ordering::Relaxed),
        }
    }

    pub fn reset_metrics(&self) {
        self.counters.total_executions.store(0, Ordering::Relaxed);
        self.counters.successful_executions.store(0, Ordering::Relaxed);
        self.counters.total_retries.store(0, Ordering::Relaxed);
        self.counters.total_failures.store(0, Ordering::Relaxed);
    }
}

/// One-off retried execution without keeping a handler around.
pub async fn with_retry<T, E, F, Fut>(policy: RetryPolicy, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryClassify + Display,
{
    EnhancedRetryHandler::new(policy).execute(operation).await
}
