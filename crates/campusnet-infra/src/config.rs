//! Global configuration loader for CampusNet.
//!
//! Reads `config.toml` from the data directory (`~/.campusnet/` in production)
//! and deserializes it into [`GlobalConfig`]. Falls back to defaults when the
//! file is missing, malformed, or describes an unusable chunk policy.

use std::path::Path;

use campusnet_types::config::GlobalConfig;

use crate::filesystem::config_path;

/// Load global configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`GlobalConfig::default()`].
/// - If the file fails to parse, logs a warning and returns the default.
/// - If the `[chunking]` section fails validation (e.g. a zero capacity or
///   weight), logs a warning and falls back to the default chunking.
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let path = config_path(data_dir);

    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", path.display());
            return GlobalConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return GlobalConfig::default();
        }
    };

    let mut config = match toml::from_str::<GlobalConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            return GlobalConfig::default();
        }
    };

    if let Err(reason) = config.chunking.validate() {
        tracing::warn!(
            "Invalid [chunking] in {}: {reason}, using default chunking",
            path.display()
        );
        config.chunking = Default::default();
    }

    config
}
