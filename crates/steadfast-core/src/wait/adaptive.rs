//! Self-tuning waits driven by network and DOM stability checks.
//!
//! The tracker learns, per named operation, how long the environment
//! usually needs to settle (an exponential moving average of observed
//! waits) and uses it to size the next round's check timeout.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use steadfast_types::driver::StructuralSignature;
use steadfast_types::wait::{AdaptiveWaitConfig, WaitCondition, WaitMetrics, WaitStatistics};
use tokio::time::{Instant, timeout};

use crate::driver::AutomationDriver;

/// Online learner of per-operation wait durations.
///
/// One instance lives for the whole process and is shared by reference.
#[derive(Debug)]
pub struct AdaptiveWaitTracker {
    config: AdaptiveWaitConfig,
    learned: DashMap<String, f64>,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    total_wait_ms: AtomicU64,
}

impl Default for AdaptiveWaitTracker {
    fn default() -> Self {
        Self::new(AdaptiveWaitConfig::default())
    }
}

impl AdaptiveWaitTracker {
    pub fn new(config: AdaptiveWaitConfig) -> Self {
        Self {
            config,
            learned: DashMap::new(),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            total_wait_ms: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &AdaptiveWaitConfig {
        &self.config
    }

    /// Wait for `operation` to settle and return the elapsed time.
    ///
    /// The check timeout is the learned average for `operation` (or `max_ms`
    /// when nothing was learned yet) clamped into `[min_ms, max_ms]`. The
    /// requested checks run concurrently. The result is never shorter than
    /// `min_ms`.
    pub async fn adaptive_wait<D: AutomationDriver>(
        &self,
        driver: &D,
        operation: &str,
        min_ms: u64,
        max_ms: u64,
        wait_for_network: bool,
        wait_for_dom: bool,
    ) -> Duration {
        let (min_ms, max_ms) = (min_ms.min(max_ms), min_ms.max(max_ms));
        let floor = Duration::from_millis(min_ms);
        let start = Instant::now();

        if !wait_for_network && !wait_for_dom {
            tokio::time::sleep(floor).await;
            let elapsed = start.elapsed();
            self.record(elapsed, true);
            return elapsed;
        }

        let budget = Duration::from_millis(self.check_budget_ms(operation, min_ms, max_ms));
        tracing::debug!(
            operation,
            budget_ms = budget.as_millis() as u64,
            wait_for_network,
            wait_for_dom,
            "adaptive wait started"
        );

        let network = async {
            !wait_for_network || self.network_idle(driver, budget).await
        };
        let dom = async { !wait_for_dom || self.dom_stable(driver, budget).await };
        let (network_ok, dom_ok) = tokio::join!(network, dom);

        let observed = start.elapsed();
        if observed < floor {
            tokio::time::sleep(floor - observed).await;
        }

        let elapsed = start.elapsed();
        let success = network_ok && dom_ok;
        self.learn(operation, elapsed);
        self.record(elapsed, success);

        tracing::debug!(
            operation,
            elapsed_ms = elapsed.as_millis() as u64,
            network_ok,
            dom_ok,
            "adaptive wait finished"
        );
        elapsed
    }

    /// `adaptive_wait` with the configured bounds and both checks enabled.
    pub async fn wait_for<D: AutomationDriver>(&self, driver: &D, operation: &str) -> Duration {
        self.adaptive_wait(
            driver,
            operation,
            self.config.min_wait_ms,
            self.config.max_wait_ms,
            true,
            true,
        )
        .await
    }

    /// Await several conditions together, each bounded by `limit`.
    ///
    /// Returns one readiness flag per condition, in input order.
    pub async fn batch_wait<D: AutomationDriver>(
        &self,
        driver: &D,
        conditions: &[WaitCondition],
        limit: Duration,
    ) -> Vec<bool> {
        let results = join_all(
            conditions
                .iter()
                .map(|condition| self.check_condition(driver, condition, limit)),
        )
        .await;

        for (condition, ready) in conditions.iter().zip(&results) {
            if !ready {
                tracing::debug!(condition = condition.label(), "batch wait condition not ready");
            }
        }
        results
    }

    async fn check_condition<D: AutomationDriver>(
        &self,
        driver: &D,
        condition: &WaitCondition,
        limit: Duration,
    ) -> bool {
        match condition {
            WaitCondition::NetworkIdle => self.network_idle(driver, limit).await,
            WaitCondition::DomStable => self.dom_stable(driver, limit).await,
            WaitCondition::Selector { selector, state } => matches!(
                timeout(limit, driver.resolve_selector(selector, *state, limit)).await,
                Ok(Ok(_))
            ),
        }
    }

    // -----------------------------------------------------------------------
    // Stability checks
    // -----------------------------------------------------------------------

    async fn network_idle<D: AutomationDriver>(&self, driver: &D, limit: Duration) -> bool {
        timeout(limit, driver.await_network_idle(limit))
            .await
            .unwrap_or(false)
    }

    /// Sample the structural signature until enough consecutive samples match.
    ///
    /// A driver error or the timeout counts as "not stable".
    async fn dom_stable<D: AutomationDriver>(&self, driver: &D, limit: Duration) -> bool {
        let interval = Duration::from_millis(self.config.stability_interval_ms.max(1));
        let required = self.config.stable_samples_required.max(1);

        let sampling = async {
            let mut previous: Option<StructuralSignature> = None;
            let mut run = 0u32;
            loop {
                match driver.read_structural_signature().await {
                    Ok(sig) => {
                        run = if previous == Some(sig) { run + 1 } else { 1 };
                        previous = Some(sig);
                        if run >= required {
                            return true;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "structural signature read failed");
                        return false;
                    }
                }
                tokio::time::sleep(interval).await;
            }
        };

        timeout(limit, sampling).await.unwrap_or(false)
    }

    // -----------------------------------------------------------------------
    // Learning and statistics
    // -----------------------------------------------------------------------

    fn check_budget_ms(&self, operation: &str, min_ms: u64, max_ms: u64) -> u64 {
        let learned = self.learned.get(operation).map(|avg| *avg);
        let candidate = learned.unwrap_or(max_ms as f64);
        candidate.clamp(min_ms as f64, max_ms as f64).round() as u64
    }

    fn learn(&self, operation: &str, elapsed: Duration) {
        let sample = elapsed.as_millis() as f64;
        let alpha = self.config.learning_factor;
        self.learned
            .entry(operation.to_string())
            .and_modify(|avg| *avg = (*avg * (1.0 - alpha) + sample * alpha).max(0.0))
            .or_insert(sample);
    }

    fn record(&self, elapsed: Duration, success: bool) {
        if success {
            self.success_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
        }
        self.total_wait_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    /// Learned average for `operation`, in milliseconds.
    pub fn learned_wait(&self, operation: &str) -> Option<f64> {
        self.learned.get(operation).map(|avg| *avg)
    }

    /// Cumulative counters.
    pub fn metrics(&self) -> WaitMetrics {
        let success_count = self.success_count.load(Ordering::Relaxed);
        let failure_count = self.failure_count.load(Ordering::Relaxed);
        let total_wait_ms = self.total_wait_ms.load(Ordering::Relaxed);
        let samples = success_count + failure_count;
        WaitMetrics {
            success_count,
            failure_count,
            total_wait_ms,
            avg_wait_ms: if samples == 0 {
                0.0
            } else {
                total_wait_ms as f64 / samples as f64
            },
        }
    }

    pub fn get_wait_statistics(&self) -> WaitStatistics {
        let metrics = self.metrics();
        let total_samples = metrics.total_samples();
        let learned_waits: BTreeMap<String, f64> = self
            .learned
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        WaitStatistics {
            success_count: metrics.success_count,
            failure_count: metrics.failure_count,
            total_samples,
            total_wait_ms: metrics.total_wait_ms,
            avg_wait_ms: metrics.avg_wait_ms,
            success_rate: if total_samples == 0 {
                0.0
            } else {
                metrics.success_count as f64 / total_samples as f64
            },
            learned_waits,
        }
    }

    /// Forget all learned averages and metrics.
    pub fn reset_wait_cache(&self) {
        self.learned.clear();
        self.success_count.store(0, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);
        self.total_wait_ms.store(0, Ordering::Relaxed);
        tracing::debug!("adaptive wait cache reset");
    }
}
