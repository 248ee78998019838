//! Run configuration
//!
//! A YAML document names the adapters (source APIs with credentials), the
//! repositories to mine through each adapter, and the storage, aggregation and
//! HTTP settings. Environment variables can override a few values, see
//! [`Config::merge_env_vars`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::storage::StorageConfig;

pub mod loader;

pub use loader::{load_config, resolve_config_path, CONFIG_ENV, DEFAULT_CONFIG_FILE};

/// Overrides the file backend's base directory
pub const STORAGE_DIR_ENV: &str = "DELIVERY_METRICS_STORAGE_DIR";
/// Prefix of per-adapter token variables, e.g. `DELIVERY_METRICS_TOKEN_GITHUB`
pub const TOKEN_ENV_PREFIX: &str = "DELIVERY_METRICS_TOKEN_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub adapters: Vec<AdapterConfig>,
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// One upstream source API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub name: String,
    pub baseurl: String,
    #[serde(default)]
    pub token: String,
}

/// A repository to mine, by its id within the adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub id: String,
    pub adapter: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Repositories aggregated at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout, e.g. `30s` or `2m`
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
        }
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Name of the token variable for an adapter
pub fn token_env_var(adapter: &str) -> String {
    let suffix: String = adapter
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{TOKEN_ENV_PREFIX}{suffix}")
}

impl Config {
    /// Apply environment overrides
    ///
    /// `DELIVERY_METRICS_STORAGE_DIR` replaces the file backend directory and
    /// `DELIVERY_METRICS_TOKEN_<ADAPTER>` fills tokens the file leaves empty.
    pub fn merge_env_vars(&mut self) {
        if let Ok(dir) = std::env::var(STORAGE_DIR_ENV) {
            if !dir.is_empty() {
                self.storage.file.base_dir = PathBuf::from(dir);
            }
        }

        for adapter in &mut self.adapters {
            if adapter.token.is_empty() {
                if let Ok(token) = std::env::var(token_env_var(&adapter.name)) {
                    adapter.token = token;
                }
            }
        }
    }

    /// Look up an adapter by name, ignoring case
    pub fn find_adapter(&self, name: &str) -> Option<&AdapterConfig> {
        self.adapters
            .iter()
            .find(|adapter| adapter.name.eq_ignore_ascii_case(name))
    }

    /// Adapter names in configuration order
    pub fn adapter_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.adapters
            .iter()
            .filter(|adapter| seen.insert(adapter.name.to_ascii_lowercase()))
            .map(|adapter| adapter.name.as_str())
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.aggregation.concurrency == 0 {
            return Err(Error::Validation(
                "aggregation.concurrency must be at least 1".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for adapter in &self.adapters {
            if adapter.name.trim().is_empty() {
                return Err(Error::Validation("adapter with an empty name".to_string()));
            }
            if !names.insert(adapter.name.to_ascii_lowercase()) {
                return Err(Error::Validation(format!(
                    "adapter '{}' is configured more than once",
                    adapter.name
                )));
            }
            url::Url::parse(&adapter.baseurl).map_err(|e| {
                Error::Validation(format!(
                    "adapter '{}' has an invalid baseurl '{}': {e}",
                    adapter.name, adapter.baseurl
                ))
            })?;
        }

        for repository in &self.repositories {
            if self.find_adapter(&repository.adapter).is_none() {
                return Err(Error::Validation(format!(
                    "repository '{}' names unknown adapter '{}'",
                    repository.id, repository.adapter
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const SAMPLE: &str = r#"
adapters:
  - name: GitHub
    baseurl: http://localhost:8787
    token: secret
  - name: azure
    baseurl: http://localhost:8788/
repositories:
  - id: octo%2Fservice
    adapter: github
  - id: "42"
    adapter: Azure
aggregation:
  concurrency: 2
http:
  timeout: 1m 30s
"#;

    fn sample() -> Config {
        serde_yaml::from_str(SAMPLE).unwrap()
    }

    #[test]
    fn test_parse_sample_config() {
        let config = sample();

        assert_eq!(config.adapters.len(), 2);
        assert_eq!(config.repositories[0].id, "octo%2Fservice");
        assert_eq!(config.aggregation.concurrency, 2);
        assert_eq!(config.http.timeout, Duration::from_secs(90));
        assert!(config.adapters[1].token.is_empty());
    }

    #[test]
    fn test_defaults_for_missing_sections() {
        let config: Config = serde_yaml::from_str("adapters: []").unwrap();

        assert_eq!(config.aggregation.concurrency, 4);
        assert_eq!(config.http.timeout, Duration::from_secs(30));
        assert!(config.repositories.is_empty());
    }

    #[test]
    fn test_find_adapter_ignores_case() {
        let config = sample();

        assert_eq!(config.find_adapter("GITHUB").unwrap().token, "secret");
        assert!(config.find_adapter("gitlab").is_none());
        assert_eq!(config.adapter_names(), vec!["GitHub", "azure"]);
    }

    #[test]
    fn test_validate_accepts_sample() {
        sample().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_unknown_adapter() {
        let mut config = sample();
        config.repositories.push(RepositoryConfig {
            id: "x".to_string(),
            adapter: "gitlab".to_string(),
        });

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unknown adapter 'gitlab'"));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = sample();
        config.aggregation.concurrency = 0;

        assert!(matches!(config.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_bad_baseurl() {
        let mut config = sample();
        config.adapters[0].baseurl = "not a url".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_token_env_var_name() {
        assert_eq!(token_env_var("GitHub"), "DELIVERY_METRICS_TOKEN_GITHUB");
        assert_eq!(token_env_var("azure-devops"), "DELIVERY_METRICS_TOKEN_AZURE_DEVOPS");
    }

    #[test]
    #[serial]
    fn test_env_token_fills_only_empty_tokens() {
        std::env::set_var("DELIVERY_METRICS_TOKEN_AZURE", "from-env");
        std::env::set_var("DELIVERY_METRICS_TOKEN_GITHUB", "ignored");

        let mut config = sample();
        config.merge_env_vars();

        std::env::remove_var("DELIVERY_METRICS_TOKEN_AZURE");
        std::env::remove_var("DELIVERY_METRICS_TOKEN_GITHUB");

        assert_eq!(config.find_adapter("azure").unwrap().token, "from-env");
        assert_eq!(config.find_adapter("github").unwrap().token, "secret");
    }

    #[test]
    #[serial]
    fn test_env_storage_dir_override() {
        std::env::set_var(STORAGE_DIR_ENV, "/tmp/delivery-metrics-test");

        let mut config = sample();
        config.merge_env_vars();

        std::env::remove_var(STORAGE_DIR_ENV);

        assert_eq!(
            config.storage.file.base_dir,
            PathBuf::from("/tmp/delivery-metrics-test")
        );
    }
}
