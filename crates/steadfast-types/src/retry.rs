//! Retry configuration and outcome types.
//!
//! `RetryConfig` is the serialisable half of a retry policy (the `[retry]`
//! section of `steadfast.toml`). Hooks and classification overrides are
//! attached in `steadfast-core` when a `RetryPolicy` is built from it.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RetryConfig
// ---------------------------------------------------------------------------

/// Numeric retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Multiplier applied to the delay after each retry.
    pub backoff_factor: f64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Whether to randomise delays.
    pub jitter: bool,
    /// Relative jitter range; 0.1 means ±10%.
    pub jitter_factor: f64,
    /// When the recovery validator fails, count the attempt as failed
    /// without re-invoking the operation.
    pub skip_retry_on_validation_failure: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            backoff_factor: 2.0,
            max_delay_ms: 30_000,
            jitter: true,
            jitter_factor: 0.1,
            skip_retry_on_validation_failure: false,
        }
    }
}

impl RetryConfig {
    /// Transient network operations: 5 attempts starting at 500ms.
    pub fn network() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            ..Self::default()
        }
    }

    /// Element lookups on a rendering page: quick, short backoff.
    pub fn element_lookup() -> Self {
        Self {
            max_attempts: 4,
            initial_delay_ms: 250,
            backoff_factor: 1.5,
            max_delay_ms: 2_000,
            ..Self::default()
        }
    }

    /// Side-effecting actions that must not be replayed blindly.
    ///
    /// Retries only proceed when the recovery validator confirms the
    /// environment is back in a known state.
    pub fn critical_action() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 2_000,
            max_delay_ms: 15_000,
            skip_retry_on_validation_failure: true,
            ..Self::default()
        }
    }

    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 0,
            jitter: false,
            ..Self::default()
        }
    }

    /// Disable jitter (deterministic delays).
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }
}

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// How a retried execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryOutcome {
    Success,
    /// Every attempt failed with a retryable error.
    Exhausted,
    /// A non-retryable error stopped execution.
    NonRetryable,
    /// The state checker reported a broken environment.
    StateInvalid,
}

/// One failed attempt, in order of occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptError {
    /// 1-based attempt number.
    pub attempt: u32,
    pub message: String,
}

/// Cumulative counters of a retry handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryMetrics {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub total_retries: u64,
    pub total_failures: u64,
}

impl RetryMetrics {
    /// Fraction of executions that eventually succeeded (0 when none ran).
    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            return 0.0;
        }
        self.successful_executions as f64 / self.total_executions as f64
    }
}
