//! Engine configuration for Steadfast.
//!
//! `EngineConfig` represents `steadfast.toml`. Every section and field has a
//! default, so an empty file (or no file) yields a usable configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::locator::LocatorConfig;
use crate::retry::RetryConfig;
use crate::run::RetryMode;
use crate::wait::{AdaptiveWaitConfig, WaitStrategyConfig};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub wait: WaitConfig,
    #[serde(default)]
    pub locator: LocatorConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

/// `[wait]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitConfig {
    #[serde(default)]
    pub adaptive: AdaptiveWaitConfig,
    #[serde(default)]
    pub strategy: WaitStrategyConfig,
}

/// `[checkpoint]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Directory for checkpoint and run files. Relative paths are resolved
    /// against the data directory; `None` means `{data_dir}/checkpoints`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    /// Age after which `cleanup_old_checkpoints` removes a file.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
    /// Delete the checkpoint after a fully successful run.
    #[serde(default = "default_true")]
    pub clear_on_success: bool,
}

fn default_retention_hours() -> u64 {
    24 * 7
}

fn default_true() -> bool {
    true
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dir: None,
            retention_hours: default_retention_hours(),
            clear_on_success: true,
        }
    }
}

/// `[executor]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub retry_mode: RetryMode,
    /// Stored as `workflow_type` in new checkpoints.
    #[serde(default = "default_workflow_type")]
    pub workflow_type: String,
}

fn default_workflow_type() -> String {
    "workflow".to_string()
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            retry_mode: RetryMode::default(),
            workflow_type: default_workflow_type(),
        }
    }
}

impl EngineConfig {
    /// Reject values the engine cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |section, field, reason: &str| ConfigError::Invalid {
            section,
            field,
            reason: reason.to_string(),
        };

        if !(self.retry.backoff_factor >= 1.0) {
            return Err(invalid("retry", "backoff_factor", "must be >= 1.0"));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(invalid("retry", "jitter_factor", "must be within [0, 1]"));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(invalid(
                "retry",
                "initial_delay_ms",
                "must not exceed max_delay_ms",
            ));
        }

        let adaptive = &self.wait.adaptive;
        if !(adaptive.learning_factor > 0.0 && adaptive.learning_factor <= 1.0) {
            return Err(invalid("wait", "learning_factor", "must be within (0, 1]"));
        }
        if adaptive.min_wait_ms > adaptive.max_wait_ms {
            return Err(invalid("wait", "min_wait_ms", "must not exceed max_wait_ms"));
        }
        if adaptive.stable_samples_required == 0 {
            return Err(invalid("wait", "stable_samples_required", "must be at least 1"));
        }
        if adaptive.stability_interval_ms == 0 {
            return Err(invalid("wait", "stability_interval_ms", "must be positive"));
        }

        let strategy = &self.wait.strategy;
        if !(strategy.backoff_factor >= 1.0) {
            return Err(invalid("wait.strategy", "backoff_factor", "must be >= 1.0"));
        }
        if strategy.initial_interval_ms == 0 {
            return Err(invalid("wait.strategy", "initial_interval_ms", "must be positive"));
        }

        for (field, value) in [
            ("primary_hit_threshold", self.locator.primary_hit_threshold),
            ("success_rate_threshold", self.locator.success_rate_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid("locator", field, "must be within [0, 1]"));
            }
        }

        if self.executor.workflow_type.trim().is_empty() {
            return Err(invalid("executor", "workflow_type", "must not be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.checkpoint.retention_hours, 168);
        assert!(config.checkpoint.clear_on_success);
        assert_eq!(config.executor.workflow_type, "workflow");
    }

    #[test]
    fn test_engine_config_empty_toml() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_engine_config_deserialize_with_values() {
        let toml_str = r#"
[retry]
max_attempts = 5
jitter = false

[wait.adaptive]
learning_factor = 0.5
min_wait_ms = 50

[wait.strategy]
total_timeout_ms = 5000

[locator]
min_samples = 20

[checkpoint]
dir = "/tmp/cp"
retention_hours = 48
clear_on_success = false

[executor]
retry_mode = "per_stage"
workflow_type = "bulk_claim"
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert!(!config.retry.jitter);
        assert!((config.wait.adaptive.learning_factor - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.wait.adaptive.min_wait_ms, 50);
        assert_eq!(config.wait.adaptive.max_wait_ms, 10_000);
        assert_eq!(config.wait.strategy.total_timeout_ms, 5_000);
        assert_eq!(config.locator.min_samples, 20);
        assert_eq!(config.checkpoint.dir.as_deref(), Some("/tmp/cp"));
        assert_eq!(config.checkpoint.retention_hours, 48);
        assert!(!config.checkpoint.clear_on_success);
        assert_eq!(config.executor.retry_mode, RetryMode::PerStage);
        assert_eq!(config.executor.workflow_type, "bulk_claim");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_learning_factor() {
        let mut config = EngineConfig::default();
        config.wait.adaptive.learning_factor = 0.0;
        let err = config.validate().unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                section: "wait",
                field: "learning_factor",
                reason: "must be within (0, 1]".to_string(),
            }
        );
    }

    #[test]
    fn test_validate_rejects_inverted_waits() {
        let mut config = EngineConfig::default();
        config.wait.adaptive.min_wait_ms = 20_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_nan_backoff() {
        let mut config = EngineConfig::default();
        config.retry.backoff_factor = f64::NAN;
        assert!(config.validate().is_err());
    }
}
