//! Selector chains and their hit-rate metrics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::driver::WaitState;

/// An ordered list of selectors that all target the same element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorChain {
    /// Registry key, e.g. `"claim_button"`.
    pub key: String,
    pub primary: String,
    #[serde(default)]
    pub fallbacks: Vec<String>,
    #[serde(default)]
    pub wait_state: WaitState,
    /// Per-selector timeout in milliseconds.
    pub timeout_ms: u64,
}

impl SelectorChain {
    pub fn new(key: impl Into<String>, primary: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            key: key.into(),
            primary: primary.into(),
            fallbacks: Vec::new(),
            wait_state: WaitState::default(),
            timeout_ms,
        }
    }

    pub fn with_fallback(mut self, selector: impl Into<String>) -> Self {
        self.fallbacks.push(selector.into());
        self
    }

    pub fn with_wait_state(mut self, state: WaitState) -> Self {
        self.wait_state = state;
        self
    }

    /// Primary followed by fallbacks, in resolution order.
    pub fn selectors(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(self.fallbacks.iter().map(String::as_str))
    }

    pub fn len(&self) -> usize {
        1 + self.fallbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.fallbacks.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Online reliability metrics for one chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectorHitMetrics {
    pub chain_key: String,
    /// Successful lookups keyed by the winning selector index.
    pub hits: BTreeMap<usize, u64>,
    pub misses: u64,
    pub total_time_ms: u64,
}

impl SelectorHitMetrics {
    pub fn new(chain_key: impl Into<String>) -> Self {
        Self {
            chain_key: chain_key.into(),
            ..Self::default()
        }
    }

    pub fn record_hit(&mut self, index: usize, elapsed_ms: u64) {
        *self.hits.entry(index).or_insert(0) += 1;
        self.total_time_ms += elapsed_ms;
    }

    pub fn record_miss(&mut self, elapsed_ms: u64) {
        self.misses += 1;
        self.total_time_ms += elapsed_ms;
    }

    pub fn total_hits(&self) -> u64 {
        self.hits.values().sum()
    }

    pub fn total_lookups(&self) -> u64 {
        self.total_hits() + self.misses
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.total_lookups();
        if total == 0 {
            return 0.0;
        }
        self.total_hits() as f64 / total as f64
    }

    pub fn primary_hit_rate(&self) -> f64 {
        let total = self.total_lookups();
        if total == 0 {
            return 0.0;
        }
        self.hits.get(&0).copied().unwrap_or(0) as f64 / total as f64
    }

    pub fn avg_time_ms(&self) -> f64 {
        let total = self.total_lookups();
        if total == 0 {
            return 0.0;
        }
        self.total_time_ms as f64 / total as f64
    }

    /// Index with the most hits; ties go to the lower index.
    pub fn best_index(&self) -> Option<usize> {
        self.hits
            .iter()
            .filter(|(_, count)| **count > 0)
            .max_by(|(ia, ca), (ib, cb)| ca.cmp(cb).then(ib.cmp(ia)))
            .map(|(index, _)| *index)
    }
}

/// Tuning for `ResilientLocator::suggest_optimizations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Lookups required before a chain is analysed.
    pub min_samples: u64,
    /// Primary hit rate below which a reorder is suggested.
    pub primary_hit_threshold: f64,
    /// Success rate below which more fallbacks are suggested.
    pub success_rate_threshold: f64,
    /// Overall budget for `locate` when the caller passes none.
    pub default_timeout_ms: u64,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,
            primary_hit_threshold: 0.5,
            success_rate_threshold: 0.8,
            default_timeout_ms: 10_000,
        }
    }
}

/// What to change about a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SuggestionKind {
    /// Promote the selector at `best_index` to primary.
    Reorder { best_index: usize, best_selector: String },
    /// Too many total misses; the chain needs more fallbacks.
    AddFallbacks,
}

/// One optimisation hint produced from accumulated metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationSuggestion {
    pub chain_key: String,
    pub kind: SuggestionKind,
    pub primary_hit_rate: f64,
    pub success_rate: f64,
    pub samples: u64,
}
