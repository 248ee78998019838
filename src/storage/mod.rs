//! Storage abstraction layer
//!
//! Raw repository activity and computed metrics are persisted per adapter and
//! repository. Backends implement the capability traits in [`traits`]; the
//! [`StorageFactory`] picks one from configuration.

pub mod backends;
pub mod config;
pub mod error;
pub mod factory;
pub mod traits;
pub mod types;

pub use backends::{FileBackend, MemoryBackend};
pub use config::{BackendType, FileConfig, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use factory::{StorageFactory, StorageHandles};
pub use traits::{EntityLoader, EntityWriter, MetricsReader, MetricsWriter, UnifiedStorage};
pub use types::{HealthStatus, Record, RecordMap, StoredMetrics};
