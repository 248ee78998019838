use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::Config;
use crate::error::{Error, Result};

/// Points at the configuration file when `--config` is not given
pub const CONFIG_ENV: &str = "DELIVERY_METRICS_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "config.yml";

/// Explicit path, then `DELIVERY_METRICS_CONFIG`, then `config.yml`
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match std::env::var(CONFIG_ENV) {
        Ok(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_CONFIG_FILE),
    }
}

/// Read, override from the environment, and validate the configuration
pub async fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = resolve_config_path(explicit);
    debug!("Loading configuration from {}", path.display());

    let content = fs::read_to_string(&path).await.map_err(|e| {
        Error::Config(format!("cannot read {}: {e}", path.display()))
    })?;
    let mut config: Config = serde_yaml::from_str(&content)?;

    config.merge_env_vars();
    config.validate()?;

    debug!(
        "Loaded {} adapters and {} repositories",
        config.adapters.len(),
        config.repositories.len()
    );
    Ok(config)
}
