//! In-memory storage backend for testing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{Commit, Deployment, Environment, Issue, PullRequest, Repository};
use crate::metrics::{DeploymentFrequency, LeadTimes, RestoreTimes};
use crate::storage::{
    error::StorageResult,
    traits::*,
    types::{record_values, upsert_records, HealthStatus, Record, RecordMap, StoredMetrics},
};

/// (adapter, repository id)
type RepoKey = (String, String);

#[derive(Debug, Default)]
struct RepositoryData {
    issues: RecordMap<Issue>,
    commits: RecordMap<Commit>,
    pull_requests: RecordMap<PullRequest>,
    deployments: RecordMap<Deployment>,
    environments: RecordMap<Environment>,
}

/// In-memory storage backend for testing
#[derive(Default)]
pub struct MemoryBackend {
    repositories: Arc<RwLock<HashMap<RepoKey, Record<Repository>>>>,
    data: Arc<RwLock<HashMap<RepoKey, RepositoryData>>>,
    metrics: Arc<RwLock<HashMap<RepoKey, StoredMetrics>>>,
}

fn key(adapter: &str, repository_id: &str) -> RepoKey {
    (adapter.to_string(), repository_id.to_string())
}

impl MemoryBackend {
    /// Create a new memory backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag a stored repository as manually corrected
    pub async fn mark_repository_corrected(&self, adapter: &str, repository_id: &str) -> bool {
        match self.repositories.write().await.get_mut(&key(adapter, repository_id)) {
            Some(record) => {
                record.manually_corrected = true;
                true
            }
            None => false,
        }
    }

    async fn read_collection<T: Clone>(
        &self,
        adapter: &str,
        repository: &Repository,
        select: impl Fn(&RepositoryData) -> &RecordMap<T>,
    ) -> Vec<T> {
        self.data
            .read()
            .await
            .get(&key(adapter, &repository.id))
            .map(|data| record_values(select(data)))
            .unwrap_or_default()
    }

    async fn update_metrics(
        &self,
        adapter: &str,
        repository: &Repository,
        apply: impl FnOnce(&mut StoredMetrics),
    ) {
        let mut metrics = self.metrics.write().await;
        let stored = metrics
            .entry(key(adapter, &repository.id))
            .or_insert_with(|| StoredMetrics::for_repository(repository));
        stored.label(repository);
        apply(stored);
    }
}

#[async_trait]
impl EntityLoader for MemoryBackend {
    async fn list_repositories(&self, adapter: &str) -> StorageResult<Vec<Repository>> {
        let repositories = self.repositories.read().await;
        let mut result: Vec<Repository> = repositories
            .iter()
            .filter(|((owner, _), _)| owner == adapter)
            .map(|(_, record)| record.value.clone())
            .collect();
        result.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(result)
    }

    async fn list_issues(&self, adapter: &str, repository: &Repository) -> StorageResult<Vec<Issue>> {
        Ok(self.read_collection(adapter, repository, |d| &d.issues).await)
    }

    async fn list_commits(
        &self,
        adapter: &str,
        repository: &Repository,
    ) -> StorageResult<Vec<Commit>> {
        Ok(self.read_collection(adapter, repository, |d| &d.commits).await)
    }

    async fn list_pull_requests(
        &self,
        adapter: &str,
        repository: &Repository,
    ) -> StorageResult<Vec<PullRequest>> {
        Ok(self
            .read_collection(adapter, repository, |d| &d.pull_requests)
            .await)
    }

    async fn list_deployments(
        &self,
        adapter: &str,
        repository: &Repository,
    ) -> StorageResult<Vec<Deployment>> {
        Ok(self.read_collection(adapter, repository, |d| &d.deployments).await)
    }

    async fn list_environments(
        &self,
        adapter: &str,
        repository: &Repository,
    ) -> StorageResult<Vec<Environment>> {
        Ok(self
            .read_collection(adapter, repository, |d| &d.environments)
            .await)
    }
}

#[async_trait]
impl EntityWriter for MemoryBackend {
    async fn upsert_repository(&self, adapter: &str, repository: &Repository) -> StorageResult<()> {
        let mut repositories = self.repositories.write().await;
        match repositories.get_mut(&key(adapter, &repository.id)) {
            Some(existing) if existing.manually_corrected => {}
            Some(existing) => existing.value = repository.clone(),
            None => {
                repositories.insert(key(adapter, &repository.id), Record::new(repository.clone()));
            }
        }
        Ok(())
    }

    async fn upsert_issues(
        &self,
        adapter: &str,
        repository: &Repository,
        issues: &[Issue],
    ) -> StorageResult<()> {
        let mut data = self.data.write().await;
        let entry = data.entry(key(adapter, &repository.id)).or_default();
        upsert_records(&mut entry.issues, issues, |i| i.id());
        Ok(())
    }

    async fn upsert_commits(
        &self,
        adapter: &str,
        repository: &Repository,
        commits: &[Commit],
    ) -> StorageResult<()> {
        let mut data = self.data.write().await;
        let entry = data.entry(key(adapter, &repository.id)).or_default();
        upsert_records(&mut entry.commits, commits, |c| &c.sha);
        Ok(())
    }

    async fn upsert_pull_requests(
        &self,
        adapter: &str,
        repository: &Repository,
        pull_requests: &[PullRequest],
    ) -> StorageResult<()> {
        let mut data = self.data.write().await;
        let entry = data.entry(key(adapter, &repository.id)).or_default();
        upsert_records(&mut entry.pull_requests, pull_requests, |p| p.id());
        Ok(())
    }

    async fn upsert_deployments(
        &self,
        adapter: &str,
        repository: &Repository,
        deployments: &[Deployment],
    ) -> StorageResult<()> {
        let mut data = self.data.write().await;
        let entry = data.entry(key(adapter, &repository.id)).or_default();
        upsert_records(&mut entry.deployments, deployments, |d| &d.id);
        Ok(())
    }

    async fn upsert_environments(
        &self,
        adapter: &str,
        repository: &Repository,
        environments: &[Environment],
    ) -> StorageResult<()> {
        let mut data = self.data.write().await;
        let entry = data.entry(key(adapter, &repository.id)).or_default();
        upsert_records(&mut entry.environments, environments, |e| &e.id);
        Ok(())
    }
}

#[async_trait]
impl MetricsWriter for MemoryBackend {
    async fn write_deployment_frequency(
        &self,
        adapter: &str,
        repository: &Repository,
        frequency: &DeploymentFrequency,
    ) -> StorageResult<()> {
        self.update_metrics(adapter, repository, |m| m.apply_deployment_frequency(frequency))
            .await;
        Ok(())
    }

    async fn write_lead_time_for_change(
        &self,
        adapter: &str,
        repository: &Repository,
        lead_times: &LeadTimes,
    ) -> StorageResult<()> {
        self.update_metrics(adapter, repository, |m| m.apply_lead_times(lead_times))
            .await;
        Ok(())
    }

    async fn write_change_failure_rate(
        &self,
        adapter: &str,
        repository: &Repository,
        rate: f64,
    ) -> StorageResult<()> {
        self.update_metrics(adapter, repository, |m| m.apply_change_failure_rate(rate))
            .await;
        Ok(())
    }

    async fn write_times_to_restore_service(
        &self,
        adapter: &str,
        repository: &Repository,
        restore_times: &RestoreTimes,
    ) -> StorageResult<()> {
        self.update_metrics(adapter, repository, |m| m.apply_restore_times(restore_times))
            .await;
        Ok(())
    }
}

#[async_trait]
impl MetricsReader for MemoryBackend {
    async fn load_metrics(
        &self,
        adapter: &str,
        repository_id: &str,
    ) -> StorageResult<Option<StoredMetrics>> {
        Ok(self
            .metrics
            .read()
            .await
            .get(&key(adapter, repository_id))
            .cloned())
    }
}

#[async_trait]
impl UnifiedStorage for MemoryBackend {
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Ok(HealthStatus {
            healthy: true,
            backend_type: "memory".to_string(),
            message: None,
        })
    }
}
