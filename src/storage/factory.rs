//! Storage factory for creating storage instances

use std::sync::Arc;
use tracing::info;

use super::backends::{FileBackend, MemoryBackend};
use super::config::{BackendType, StorageConfig};
use super::error::StorageResult;
use super::traits::{EntityLoader, EntityWriter, MetricsReader, MetricsWriter, UnifiedStorage};

/// One backend seen through each storage capability
///
/// Ingestion only needs the entity writer and aggregation only needs the
/// entity loader and the metrics writer; all handles share the same backend.
#[derive(Clone)]
pub struct StorageHandles {
    pub entities: Arc<dyn EntityLoader>,
    pub entity_writer: Arc<dyn EntityWriter>,
    pub metrics: Arc<dyn MetricsWriter>,
    pub metrics_reader: Arc<dyn MetricsReader>,
    pub unified: Arc<dyn UnifiedStorage>,
}

impl StorageHandles {
    /// Wrap a concrete backend
    pub fn from_backend<B: UnifiedStorage + 'static>(backend: B) -> Self {
        let backend = Arc::new(backend);
        Self {
            entities: backend.clone(),
            entity_writer: backend.clone(),
            metrics: backend.clone(),
            metrics_reader: backend.clone(),
            unified: backend,
        }
    }
}

/// Factory for creating storage instances
pub struct StorageFactory;

impl StorageFactory {
    /// Create storage from explicit configuration
    pub async fn from_config(config: &StorageConfig) -> StorageResult<StorageHandles> {
        match config.backend {
            BackendType::File => {
                info!(
                    "Using file storage at {}",
                    config.file.base_dir.display()
                );
                let backend = FileBackend::new(&config.file).await?;
                Ok(StorageHandles::from_backend(backend))
            }
            BackendType::Memory => {
                info!("Using in-memory storage; nothing will be persisted");
                Ok(StorageHandles::from_backend(MemoryBackend::new()))
            }
        }
    }

    /// Create an in-memory storage, for tests
    pub fn memory() -> StorageHandles {
        StorageHandles::from_backend(MemoryBackend::new())
    }
}
