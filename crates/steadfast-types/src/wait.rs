//! Adaptive-wait configuration and metrics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::driver::WaitState;

/// Tuning for `AdaptiveWaitTracker`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveWaitConfig {
    /// Default floor for waits, in milliseconds.
    pub min_wait_ms: u64,
    /// Default ceiling for waits, in milliseconds.
    pub max_wait_ms: u64,
    /// EMA smoothing factor, in (0, 1].
    pub learning_factor: f64,
    /// Interval between DOM signature samples.
    pub stability_interval_ms: u64,
    /// Consecutive identical samples needed to call the DOM stable.
    pub stable_samples_required: u32,
}

impl Default for AdaptiveWaitConfig {
    fn default() -> Self {
        Self {
            min_wait_ms: 100,
            max_wait_ms: 10_000,
            learning_factor: 0.3,
            stability_interval_ms: 100,
            stable_samples_required: 3,
        }
    }
}

/// Polling schedule for `wait_until`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitStrategyConfig {
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub backoff_factor: f64,
    pub total_timeout_ms: u64,
}

impl Default for WaitStrategyConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 100,
            max_interval_ms: 2_000,
            backoff_factor: 1.5,
            total_timeout_ms: 30_000,
        }
    }
}

/// Cumulative wait counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitMetrics {
    pub success_count: u64,
    pub failure_count: u64,
    pub total_wait_ms: u64,
    pub avg_wait_ms: f64,
}

impl WaitMetrics {
    pub fn total_samples(&self) -> u64 {
        self.success_count + self.failure_count
    }
}

/// Snapshot returned by `get_wait_statistics`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitStatistics {
    pub success_count: u64,
    pub failure_count: u64,
    pub total_samples: u64,
    pub total_wait_ms: u64,
    pub avg_wait_ms: f64,
    pub success_rate: f64,
    /// Learned average per operation, in milliseconds.
    pub learned_waits: BTreeMap<String, f64>,
}

/// A condition awaited by `batch_wait`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaitCondition {
    NetworkIdle,
    DomStable,
    Selector { selector: String, state: WaitState },
}

impl WaitCondition {
    pub fn label(&self) -> &str {
        match self {
            WaitCondition::NetworkIdle => "network_idle",
            WaitCondition::DomStable => "dom_stable",
            WaitCondition::Selector { selector, .. } => selector,
        }
    }
}
