//! Fallback-chain element location.
//!
//! Resolves an element through an ordered chain of selectors. Selectors are
//! tried strictly in order; the first to resolve wins. Every lookup records
//! which index won (or a miss) so stale primaries can be detected and
//! reported through `suggest_optimizations`.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use steadfast_types::driver::Action;
use steadfast_types::error::LocatorError;
use steadfast_types::locator::{
    LocatorConfig, OptimizationSuggestion, SelectorChain, SelectorHitMetrics, SuggestionKind,
};
use tokio::time::{Instant, timeout};

use crate::driver::AutomationDriver;

/// Registry of selector chains with online hit-rate metrics.
#[derive(Debug, Default)]
pub struct ResilientLocator {
    config: LocatorConfig,
    chains: DashMap<String, Arc<SelectorChain>>,
    metrics: DashMap<String, SelectorHitMetrics>,
}

impl ResilientLocator {
    pub fn new(config: LocatorConfig) -> Self {
        Self {
            config,
            chains: DashMap::new(),
            metrics: DashMap::new(),
        }
    }

    /// Register (or replace) a chain. Existing metrics for the key are kept.
    pub fn register_chain(&self, chain: SelectorChain) -> Result<(), LocatorError> {
        if chain.is_empty() {
            return Err(LocatorError::EmptyChain(chain.key));
        }
        let key = chain.key.clone();
        self.metrics
            .entry(key.clone())
            .or_insert_with(|| SelectorHitMetrics::new(key.clone()));
        tracing::debug!(chain = %key, selectors = chain.len(), "registered selector chain");
        self.chains.insert(key, Arc::new(chain));
        Ok(())
    }

    pub fn chain(&self, key: &str) -> Option<Arc<SelectorChain>> {
        self.chains.get(key).map(|c| Arc::clone(c.value()))
    }

    /// Resolve `chain_key` within `overall` (default from config).
    ///
    /// Each selector gets `min(chain.timeout, remaining budget)`. Returns
    /// `Ok(None)` when every selector failed; the caller decides whether
    /// that is fatal.
    pub async fn locate<D: AutomationDriver>(
        &self,
        driver: &D,
        chain_key: &str,
        overall: Option<Duration>,
    ) -> Result<Option<D::Handle>, LocatorError> {
        let chain = self
            .chain(chain_key)
            .ok_or_else(|| LocatorError::UnknownChain(chain_key.to_string()))?;
        let budget =
            overall.unwrap_or_else(|| Duration::from_millis(self.config.default_timeout_ms));
        let per_selector = Duration::from_millis(chain.timeout_ms);
        let start = Instant::now();

        for (index, selector) in chain.selectors().enumerate() {
            let remaining = budget.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                tracing::debug!(chain = chain_key, index, "locate budget exhausted");
                break;
            }
            let sub_timeout = per_selector.min(remaining);

            match timeout(
                sub_timeout,
                driver.resolve_selector(selector, chain.wait_state, sub_timeout),
            )
            .await
            {
                Ok(Ok(handle)) => {
                    let elapsed = start.elapsed();
                    self.record_hit(chain_key, index, elapsed);
                    if index > 0 {
                        tracing::info!(
                            chain = chain_key,
                            index,
                            selector,
                            "resolved through fallback selector"
                        );
                    }
                    return Ok(Some(handle));
                }
                Ok(Err(e)) => {
                    tracing::debug!(chain = chain_key, index, selector, error = %e, "selector failed");
                }
                Err(_) => {
                    tracing::debug!(
                        chain = chain_key,
                        index,
                        selector,
                        timeout_ms = sub_timeout.as_millis() as u64,
                        "selector timed out"
                    );
                }
            }
        }

        self.record_miss(chain_key, start.elapsed());
        tracing::warn!(chain = chain_key, "no selector in chain resolved");
        Ok(None)
    }

    /// Locate then click. Any failure is reported as `false`.
    pub async fn click<D: AutomationDriver>(&self, driver: &D, chain_key: &str) -> bool {
        self.act(driver, chain_key, &Action::Click).await
    }

    /// Locate then fill with `text`. Any failure is reported as `false`.
    pub async fn fill<D: AutomationDriver>(&self, driver: &D, chain_key: &str, text: &str) -> bool {
        let action = Action::Fill {
            text: text.to_string(),
        };
        self.act(driver, chain_key, &action).await
    }

    async fn act<D: AutomationDriver>(&self, driver: &D, chain_key: &str, action: &Action) -> bool {
        let handle = match self.locate(driver, chain_key, None).await {
            Ok(Some(handle)) => handle,
            Ok(None) => return false,
            Err(e) => {
                tracing::error!(chain = chain_key, error = %e, "cannot locate element");
                return false;
            }
        };

        match driver.perform_action(&handle, action).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    chain = chain_key,
                    action = action.kind(),
                    error = %e,
                    "action failed on located element"
                );
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Metrics
    // -----------------------------------------------------------------------

    fn record_hit(&self, chain_key: &str, index: usize, elapsed: Duration) {
        self.metrics
            .entry(chain_key.to_string())
            .or_insert_with(|| SelectorHitMetrics::new(chain_key))
            .record_hit(index, elapsed.as_millis() as u64);
    }

    fn record_miss(&self, chain_key: &str, elapsed: Duration) {
        self.metrics
            .entry(chain_key.to_string())
            .or_insert_with(|| SelectorHitMetrics::new(chain_key))
            .record_miss(elapsed.as_millis() as u64);
    }

    pub fn metrics(&self, chain_key: &str) -> Option<SelectorHitMetrics> {
        self.metrics.get(chain_key).map(|m| m.value().clone())
    }

    /// Metrics for every chain, ordered by key.
    pub fn all_metrics(&self) -> Vec<SelectorHitMetrics> {
        let mut all: Vec<SelectorHitMetrics> =
            self.metrics.iter().map(|m| m.value().clone()).collect();
        all.sort_by(|a, b| a.chain_key.cmp(&b.chain_key));
        all
    }

    pub fn reset_metrics(&self) {
        for mut entry in self.metrics.iter_mut() {
            let key = entry.key().clone();
            *entry.value_mut() = SelectorHitMetrics::new(key);
        }
    }

    /// Analyse accumulated metrics.
    ///
    /// Chains with fewer than `min_samples` lookups are ignored. A primary
    /// hit rate below threshold yields a reorder naming the best selector;
    /// a success rate below threshold asks for more fallbacks.
    pub fn suggest_optimizations(&self) -> Vec<OptimizationSuggestion> {
        let mut suggestions = Vec::new();

        for metrics in self.all_metrics() {
            let samples = metrics.total_lookups();
            if samples < self.config.min_samples {
                continue;
            }
            let primary_hit_rate = metrics.primary_hit_rate();
            let success_rate = metrics.success_rate();

            if primary_hit_rate < self.config.primary_hit_threshold {
                let best = metrics.best_index().filter(|&i| i > 0).and_then(|i| {
                    let chain = self.chain(&metrics.chain_key)?;
                    let selector = chain.selectors().nth(i)?.to_string();
                    Some((i, selector))
                });
                if let Some((best_index, best_selector)) = best {
                    suggestions.push(OptimizationSuggestion {
                        chain_key: metrics.chain_key.clone(),
                        kind: SuggestionKind::Reorder {
                            best_index,
                            best_selector,
                        },
                        primary_hit_rate,
                        success_rate,
                        samples,
                    });
                }
            }

            if success_rate < self.config.success_rate_threshold {
                suggestions.push(OptimizationSuggestion {
                    chain_key: metrics.chain_key.clone(),
                    kind: SuggestionKind::AddFallbacks,
                    primary_hit_rate,
                    success_rate,
                    samples,
                });
            }
        }

        suggestions
    }
}
