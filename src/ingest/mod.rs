//! Ingestion of repository activity from source APIs
//!
//! Each configured repository is fetched through its adapter's
//! [`SourceClient`] and upserted through an
//! [`EntityWriter`](crate::storage::EntityWriter). [`Scraper::ingest`] waits
//! for every repository before returning, so aggregation can start right after.

pub mod client;
pub mod scraper;
pub mod wire;

use serde::Serialize;

pub use client::{HttpSourceClient, SourceClient};
pub use scraper::Scraper;

/// Counts written for one repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestedRepository {
    pub adapter: String,
    pub repository_id: String,
    pub issues: usize,
    pub commits: usize,
    pub pull_requests: usize,
    pub deployments: usize,
    pub environments: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestFailure {
    pub adapter: String,
    pub repository_id: String,
    pub error: String,
}

/// Outcome of one ingestion pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub succeeded: Vec<IngestedRepository>,
    pub failed: Vec<IngestFailure>,
}

impl IngestReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}
