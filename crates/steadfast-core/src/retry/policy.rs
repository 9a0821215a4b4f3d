//! Retry policy: attempt budget, backoff arithmetic and recovery hooks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use steadfast_types::retry::RetryConfig;

/// Boxed future returned by recovery hooks.
pub type HookFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A shareable async hook.
pub type Hook<T> = Arc<dyn Fn() -> HookFuture<T> + Send + Sync>;

fn boxed_hook<T, F, Fut>(f: F) -> Hook<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    Arc::new(move || Box::pin(f()) as HookFuture<T>)
}

// ---------------------------------------------------------------------------
// RetryHooks
// ---------------------------------------------------------------------------

/// Optional callbacks invoked around retries.
#[derive(Clone, Default)]
pub struct RetryHooks {
    /// Runs after the backoff sleep, before the next attempt (e.g. reload a page).
    pub pre_retry_action: Option<Hook<()>>,
    /// Confirms the environment recovered before the next attempt.
    pub recovery_validator: Option<Hook<bool>>,
    /// Checked on every failure; `false` aborts all remaining attempts.
    pub state_checker: Option<Hook<bool>>,
}

impl std::fmt::Debug for RetryHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryHooks")
            .field("pre_retry_action", &self.pre_retry_action.is_some())
            .field("recovery_validator", &self.recovery_validator.is_some())
            .field("state_checker", &self.state_checker.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Immutable retry policy built from a [`RetryConfig`] plus hooks.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    hooks: RetryHooks,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Build a policy. `max_attempts = 0` is treated as 1.
    pub fn new(mut config: RetryConfig) -> Self {
        config.max_attempts = config.max_attempts.max(1);
        Self {
            config,
            hooks: RetryHooks::default(),
        }
    }

    pub fn network() -> Self {
        Self::new(RetryConfig::network())
    }

    pub fn element_lookup() -> Self {
        Self::new(RetryConfig::element_lookup())
    }

    pub fn critical_action() -> Self {
        Self::new(RetryConfig::critical_action())
    }

    pub fn no_retry() -> Self {
        Self::new(RetryConfig::no_retry())
    }

    pub fn with_pre_retry_action<F, Fut>(mut self, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.pre_retry_action = Some(boxed_hook(action));
        self
    }

    pub fn with_recovery_validator<F, Fut>(mut self, validator: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.hooks.recovery_validator = Some(boxed_hook(validator));
        self
    }

    pub fn with_state_checker<F, Fut>(mut self, checker: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.hooks.state_checker = Some(boxed_hook(checker));
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn hooks(&self) -> &RetryHooks {
        &self.hooks
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Deterministic backoff for zero-based retry index `i`, in milliseconds:
    /// `min(initial * factor^i, max)`. Negative indices count as 0.
    pub fn base_delay_ms(&self, retry_index: i32) -> f64 {
        let exponent = retry_index.max(0);
        let raw = self.config.initial_delay_ms as f64 * self.config.backoff_factor.powi(exponent);
        raw.min(self.config.max_delay_ms as f64)
    }

    /// Delay before the retry with zero-based index `retry_index`.
    ///
    /// With jitter enabled the base delay is scaled by a uniform factor in
    /// `[1 - jitter_factor, 1 + jitter_factor]`, then clamped to
    /// `[0, max_delay_ms]`. `jitter_factor` is clamped to `[0, 1]`; a
    /// non-finite factor disables jitter.
    pub fn get_delay(&self, retry_index: i32) -> Duration {
        let mut delay_ms = self.base_delay_ms(retry_index);

        let spread = if self.config.jitter_factor.is_finite() {
            self.config.jitter_factor.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if self.config.jitter && spread > 0.0 && delay_ms > 0.0 {
            let factor: f64 = rand::rng().random_range(-spread..=spread);
            delay_ms += delay_ms * factor;
        }

        let clamped = delay_ms.clamp(0.0, self.config.max_delay_ms as f64);
        Duration::from_millis(clamped.round() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(initial: u64, factor: f64, max: u64) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts: 5,
            initial_delay_ms: initial,
            backoff_factor: factor,
            max_delay_ms: max,
            jitter: false,
            ..RetryConfig::default()
        })
    }

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = fixed(100, 2.0, 10_000);
        assert_eq!(policy.get_delay(0), Duration::from_millis(100));
        assert_eq!(policy.get_delay(1), Duration::from_millis(200));
        assert_eq!(policy.get_delay(2), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = fixed(1_000, 3.0, 5_000);
        assert_eq!(policy.get_delay(5), Duration::from_millis(5_000));
        assert_eq!(policy.get_delay(i32::MAX), Duration::from_millis(5_000));
    }

    #[test]
    fn test_negative_index_treated_as_zero() {
        let policy = fixed(250, 2.0, 10_000);
        assert_eq!(policy.get_delay(-3), policy.get_delay(0));
    }

    #[test]
    fn test_zero_initial_delay() {
        let policy = fixed(0, 2.0, 10_000);
        assert_eq!(policy.get_delay(3), Duration::ZERO);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(RetryConfig {
            initial_delay_ms: 1_000,
            backoff_factor: 2.0,
            max_delay_ms: 1_500,
            jitter: true,
            jitter_factor: 0.5,
            ..RetryConfig::default()
        });
        for _ in 0..200 {
            let first = policy.get_delay(0).as_millis();
            assert!((500..=1_500).contains(&first), "got {first}");
            // Base 2000 is capped to 1500 before jitter; jitter cannot exceed max.
            let second = policy.get_delay(1).as_millis();
            assert!((750..=1_500).contains(&second), "got {second}");
        }
    }

    #[test]
    fn test_out_of_range_jitter_factor_is_clamped() {
        let wide = RetryPolicy::new(RetryConfig {
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            jitter: true,
            jitter_factor: 5.0,
            ..RetryConfig::default()
        });
        for _ in 0..100 {
            assert!(wide.get_delay(0) <= Duration::from_millis(200));
        }

        for factor in [f64::INFINITY, f64::NAN] {
            let broken = RetryPolicy::new(RetryConfig {
                initial_delay_ms: 100,
                max_delay_ms: 10_000,
                jitter: true,
                jitter_factor: factor,
                ..RetryConfig::default()
            });
            assert_eq!(broken.get_delay(0), Duration::from_millis(100));
        }
    }

    #[test]
    fn test_zero_attempts_normalised() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        });
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_hooks_debug_shows_presence() {
        let policy = RetryPolicy::no_retry().with_state_checker(|| async { true });
        let debug = format!("{:?}", policy.hooks());
        assert!(debug.contains("state_checker: true"));
        assert!(debug.contains("recovery_validator: false"));
    }
}
