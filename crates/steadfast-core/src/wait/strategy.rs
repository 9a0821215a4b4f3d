//! Polling schedule arithmetic and the `wait_until` loop.

use std::future::Future;
use std::time::Duration;

use steadfast_types::wait::WaitStrategyConfig;
use tokio::time::Instant;

/// Backoff and timeout arithmetic for polling waits. Pure; no I/O.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitStrategy {
    config: WaitStrategyConfig,
}

impl Default for WaitStrategy {
    fn default() -> Self {
        Self::new(WaitStrategyConfig::default())
    }
}

impl WaitStrategy {
    pub fn new(config: WaitStrategyConfig) -> Self {
        Self { config }
    }

    /// Fixed-interval polling with a total timeout.
    pub fn fixed(interval_ms: u64, total_timeout_ms: u64) -> Self {
        Self::new(WaitStrategyConfig {
            initial_interval_ms: interval_ms,
            max_interval_ms: interval_ms,
            backoff_factor: 1.0,
            total_timeout_ms,
        })
    }

    pub fn config(&self) -> &WaitStrategyConfig {
        &self.config
    }

    pub fn total_timeout(&self) -> Duration {
        Duration::from_millis(self.config.total_timeout_ms)
    }

    /// Sleep before poll `poll_index + 1`: `min(initial * factor^i, max)`.
    pub fn interval_for(&self, poll_index: u32) -> Duration {
        let exponent = i32::try_from(poll_index).unwrap_or(i32::MAX);
        let raw = self.config.initial_interval_ms as f64 * self.config.backoff_factor.powi(exponent);
        let capped = raw.min(self.config.max_interval_ms as f64).max(0.0);
        Duration::from_millis(capped.round() as u64)
    }

    /// Time left of the total budget after `elapsed`.
    pub fn remaining(&self, elapsed: Duration) -> Duration {
        self.total_timeout().saturating_sub(elapsed)
    }

    pub fn is_expired(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_timeout()
    }

    /// Bound a requested timeout by the total budget.
    pub fn clamp_timeout(&self, timeout_ms: u64) -> Duration {
        Duration::from_millis(timeout_ms.min(self.config.total_timeout_ms))
    }
}

/// Poll `condition` on the `strategy` schedule until it returns `true`.
///
/// Returns `false` once the total timeout has elapsed. Each poll is bounded
/// by the remaining budget; a poll still pending at the deadline counts as
/// not ready. The condition is evaluated one final time at the deadline.
pub async fn wait_until<F, Fut>(mut condition: F, strategy: &WaitStrategy) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    let mut poll_index = 0;

    loop {
        let budget = strategy.remaining(start.elapsed());
        if tokio::time::timeout(budget, condition()).await.unwrap_or(false) {
            tracing::debug!(polls = poll_index + 1, "wait condition satisfied");
            return true;
        }

        let elapsed = start.elapsed();
        if strategy.is_expired(elapsed) {
            tracing::debug!(
                polls = poll_index + 1,
                timeout_ms = strategy.config().total_timeout_ms,
                "wait condition timed out"
            );
            return false;
        }

        let pause = strategy.interval_for(poll_index).min(strategy.remaining(elapsed));
        tokio::time::sleep(pause).await;
        poll_index += 1;
    }
}
