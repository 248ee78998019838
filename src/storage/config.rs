//! Storage configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage backend type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// JSON documents on disk (default)
    #[default]
    File,
    /// Process-local maps, for tests and dry runs
    Memory,
}

/// Main storage configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend type
    #[serde(default)]
    pub backend: BackendType,

    /// File backend settings
    #[serde(default)]
    pub file: FileConfig,
}

/// File storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    /// Base directory for storage
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Pretty-print stored documents
    #[serde(default)]
    pub pretty: bool,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            pretty: false,
        }
    }
}

/// `~/.delivery-metrics`, or a relative directory when no home is known
pub fn default_base_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".delivery-metrics"))
        .unwrap_or_else(|| PathBuf::from(".delivery-metrics"))
}
