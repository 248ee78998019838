//! Core trait definitions for the storage layer
//!
//! Ingestion writes raw entities through [`EntityWriter`]; aggregation reads
//! them back through [`EntityLoader`] and persists results through
//! [`MetricsWriter`]. Every write is an upsert keyed by adapter, repository and
//! entity id (or date), so rerunning either phase never accumulates.

use async_trait::async_trait;

use super::error::StorageResult;
use super::types::{HealthStatus, StoredMetrics};
use crate::domain::{
    Commit, Deployment, Environment, Issue, PullRequest, Repository, RepositorySnapshot,
};
use crate::metrics::{DeploymentFrequency, LeadTimes, RestoreTimes};

/// Read access to persisted repository activity
#[async_trait]
pub trait EntityLoader: Send + Sync {
    /// List every repository recorded for an adapter
    async fn list_repositories(&self, adapter: &str) -> StorageResult<Vec<Repository>>;

    async fn list_issues(&self, adapter: &str, repository: &Repository) -> StorageResult<Vec<Issue>>;

    async fn list_commits(&self, adapter: &str, repository: &Repository)
        -> StorageResult<Vec<Commit>>;

    async fn list_pull_requests(
        &self,
        adapter: &str,
        repository: &Repository,
    ) -> StorageResult<Vec<PullRequest>>;

    async fn list_deployments(
        &self,
        adapter: &str,
        repository: &Repository,
    ) -> StorageResult<Vec<Deployment>>;

    async fn list_environments(
        &self,
        adapter: &str,
        repository: &Repository,
    ) -> StorageResult<Vec<Environment>>;

    /// Load every collection of one repository
    async fn load_snapshot(
        &self,
        adapter: &str,
        repository: &Repository,
    ) -> StorageResult<RepositorySnapshot> {
        Ok(RepositorySnapshot {
            issues: self.list_issues(adapter, repository).await?,
            commits: self.list_commits(adapter, repository).await?,
            pull_requests: self.list_pull_requests(adapter, repository).await?,
            deployments: self.list_deployments(adapter, repository).await?,
            environments: self.list_environments(adapter, repository).await?,
        })
    }
}

/// Upserts of raw repository activity
///
/// Records marked as manually corrected are left untouched.
#[async_trait]
pub trait EntityWriter: Send + Sync {
    async fn upsert_repository(&self, adapter: &str, repository: &Repository) -> StorageResult<()>;

    async fn upsert_issues(
        &self,
        adapter: &str,
        repository: &Repository,
        issues: &[Issue],
    ) -> StorageResult<()>;

    async fn upsert_commits(
        &self,
        adapter: &str,
        repository: &Repository,
        commits: &[Commit],
    ) -> StorageResult<()>;

    async fn upsert_pull_requests(
        &self,
        adapter: &str,
        repository: &Repository,
        pull_requests: &[PullRequest],
    ) -> StorageResult<()>;

    async fn upsert_deployments(
        &self,
        adapter: &str,
        repository: &Repository,
        deployments: &[Deployment],
    ) -> StorageResult<()>;

    async fn upsert_environments(
        &self,
        adapter: &str,
        repository: &Repository,
        environments: &[Environment],
    ) -> StorageResult<()>;
}

/// Persistence of computed delivery metrics
#[async_trait]
pub trait MetricsWriter: Send + Sync {
    /// Upsert one count per date
    async fn write_deployment_frequency(
        &self,
        adapter: &str,
        repository: &Repository,
        frequency: &DeploymentFrequency,
    ) -> StorageResult<()>;

    /// Upsert one lead time per issue; unmeasurable lead times are stored as null
    async fn write_lead_time_for_change(
        &self,
        adapter: &str,
        repository: &Repository,
        lead_times: &LeadTimes,
    ) -> StorageResult<()>;

    /// Replace the repository's change failure rate
    async fn write_change_failure_rate(
        &self,
        adapter: &str,
        repository: &Repository,
        rate: f64,
    ) -> StorageResult<()>;

    /// Upsert one restore time per bug
    async fn write_times_to_restore_service(
        &self,
        adapter: &str,
        repository: &Repository,
        restore_times: &RestoreTimes,
    ) -> StorageResult<()>;
}

/// Read access to persisted metrics
#[async_trait]
pub trait MetricsReader: Send + Sync {
    async fn load_metrics(
        &self,
        adapter: &str,
        repository_id: &str,
    ) -> StorageResult<Option<StoredMetrics>>;
}

/// A backend providing every storage capability
#[async_trait]
pub trait UnifiedStorage: EntityLoader + EntityWriter + MetricsWriter + MetricsReader {
    /// Check the health of the storage backend
    async fn health_check(&self) -> StorageResult<HealthStatus>;
}
