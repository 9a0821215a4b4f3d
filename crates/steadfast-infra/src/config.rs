//! Engine configuration loader for Steadfast.
//!
//! Reads `steadfast.toml` from the data directory (`~/.steadfast/` in
//! production) into [`EngineConfig`]. Falls back to defaults when the file is
//! missing, malformed, or fails validation.

use std::path::Path;

use steadfast_types::config::EngineConfig;

/// Name of the configuration file inside the data directory.
pub const CONFIG_FILE: &str = "steadfast.toml";

/// Load engine configuration from `{data_dir}/steadfast.toml`.
///
/// - Missing file: [`EngineConfig::default()`].
/// - Unreadable, unparsable or invalid file: logs a warning and returns the default.
pub async fn load_engine_config(data_dir: &Path) -> EngineConfig {
    let config_path = data_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("no {CONFIG_FILE} found at {}, using defaults", config_path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("failed to read {}: {err}, using defaults", config_path.display());
            return EngineConfig::default();
        }
    };

    let config = match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            return EngineConfig::default();
        }
    };

    if let Err(err) = config.validate() {
        tracing::warn!("invalid {}: {err}, using defaults", config_path.display());
        return EngineConfig::default();
    }
    config
}
