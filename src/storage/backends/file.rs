//! File-based storage backend implementation
//!
//! Layout under the base directory:
//!
//! ```text
//! base_data/<adapter>/repositories.json
//! base_data/<adapter>/<repository>/{issues,commits,pull_requests,deployments,environments}.json
//! metrics/<adapter>/<repository>.json
//! ```
//!
//! Each document is rewritten as a whole under a per-document lock, so two
//! writers never interleave inside one document.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::domain::{Commit, Deployment, Environment, Issue, PullRequest, Repository};
use crate::metrics::{DeploymentFrequency, LeadTimes, RestoreTimes};
use crate::storage::{
    config::FileConfig,
    error::{StorageError, StorageResult},
    traits::*,
    types::{record_values, upsert_records, HealthStatus, RecordMap, StoredMetrics},
};

const REPOSITORIES: &str = "repositories.json";
const ISSUES: &str = "issues.json";
const COMMITS: &str = "commits.json";
const PULL_REQUESTS: &str = "pull_requests.json";
const DEPLOYMENTS: &str = "deployments.json";
const ENVIRONMENTS: &str = "environments.json";

/// File-based storage backend
pub struct FileBackend {
    base_dir: PathBuf,
    pretty: bool,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

/// Encode an id so it is a single, safe path component
fn path_segment(id: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(id.as_bytes()).collect();
    match encoded.as_str() {
        "" => "%00".to_string(),
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => encoded,
    }
}

impl FileBackend {
    /// Create a new file backend, creating the base directory if needed
    pub async fn new(config: &FileConfig) -> StorageResult<Self> {
        if fs::metadata(&config.base_dir)
            .await
            .is_ok_and(|meta| !meta.is_dir())
        {
            return Err(StorageError::configuration(format!(
                "{} exists and is not a directory",
                config.base_dir.display()
            )));
        }
        fs::create_dir_all(&config.base_dir).await?;
        debug!("File storage rooted at {}", config.base_dir.display());

        Ok(Self {
            base_dir: config.base_dir.clone(),
            pretty: config.pretty,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn adapter_dir(&self, adapter: &str) -> PathBuf {
        self.base_dir.join("base_data").join(path_segment(adapter))
    }

    fn entity_path(&self, adapter: &str, repository_id: &str, document: &str) -> PathBuf {
        self.adapter_dir(adapter)
            .join(path_segment(repository_id))
            .join(document)
    }

    fn metrics_path(&self, adapter: &str, repository_id: &str) -> PathBuf {
        self.base_dir
            .join("metrics")
            .join(path_segment(adapter))
            .join(format!("{}.json", path_segment(repository_id)))
    }

    async fn document_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }

    /// Drop the lock entry for `path` once no writer holds or awaits it
    async fn release_document_lock(&self, path: &Path, lock: Arc<Mutex<()>>) {
        drop(lock);
        let mut locks = self.locks.lock().await;
        if locks.get(path).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            locks.remove(path);
        }
    }

    /// Read a JSON document, treating a missing file as empty
    async fn read_json<T: DeserializeOwned + Default>(&self, path: &Path) -> StorageResult<T> {
        match fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content).map_err(StorageError::serialization),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Write a JSON document through a temporary file so readers never see a partial write
    async fn write_json<T: Serialize>(&self, path: &Path, data: &T) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = if self.pretty {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        };

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, path).await?;
        trace!("Wrote {}", path.display());
        Ok(())
    }

    /// Read-modify-write one document under its lock
    async fn update_json<T, F>(&self, path: &Path, apply: F) -> StorageResult<()>
    where
        T: DeserializeOwned + Serialize + Default + Send,
        F: FnOnce(&mut T) + Send,
    {
        let lock = self.document_lock(path).await;
        let result = {
            let _guard = lock.lock().await;
            match self.read_json::<T>(path).await {
                Ok(mut document) => {
                    apply(&mut document);
                    self.write_json(path, &document).await
                }
                Err(e) => Err(e),
            }
        };
        self.release_document_lock(path, lock).await;
        result
    }

    async fn upsert_entities<T>(
        &self,
        adapter: &str,
        repository: &Repository,
        document: &str,
        items: &[T],
        key: fn(&T) -> &str,
    ) -> StorageResult<()>
    where
        T: Clone + DeserializeOwned + Serialize + Send + Sync,
    {
        let path = self.entity_path(adapter, &repository.id, document);
        self.update_json(&path, |records: &mut RecordMap<T>| {
            let written = upsert_records(records, items, key);
            debug!("Upserted {} of {} records into {}", written, items.len(), document);
        })
        .await
    }

    async fn list_entities<T>(
        &self,
        adapter: &str,
        repository: &Repository,
        document: &str,
    ) -> StorageResult<Vec<T>>
    where
        T: Clone + DeserializeOwned,
    {
        let path = self.entity_path(adapter, &repository.id, document);
        let records: RecordMap<T> = self.read_json(&path).await?;
        Ok(record_values(&records))
    }

    async fn update_metrics<F>(&self, adapter: &str, repository: &Repository, apply: F) -> StorageResult<()>
    where
        F: FnOnce(&mut StoredMetrics) + Send,
    {
        let path = self.metrics_path(adapter, &repository.id);
        self.update_json(&path, |stored: &mut StoredMetrics| {
            stored.label(repository);
            apply(stored);
        })
        .await
    }
}

#[async_trait]
impl EntityLoader for FileBackend {
    async fn list_repositories(&self, adapter: &str) -> StorageResult<Vec<Repository>> {
        let path = self.adapter_dir(adapter).join(REPOSITORIES);
        let records: RecordMap<Repository> = self.read_json(&path).await?;
        Ok(record_values(&records))
    }

    async fn list_issues(&self, adapter: &str, repository: &Repository) -> StorageResult<Vec<Issue>> {
        self.list_entities(adapter, repository, ISSUES).await
    }

    async fn list_commits(
        &self,
        adapter: &str,
        repository: &Repository,
    ) -> StorageResult<Vec<Commit>> {
        self.list_entities(adapter, repository, COMMITS).await
    }

    async fn list_pull_requests(
        &self,
        adapter: &str,
        repository: &Repository,
    ) -> StorageResult<Vec<PullRequest>> {
        self.list_entities(adapter, repository, PULL_REQUESTS).await
    }

    async fn list_deployments(
        &self,
        adapter: &str,
        repository: &Repository,
    ) -> StorageResult<Vec<Deployment>> {
        self.list_entities(adapter, repository, DEPLOYMENTS).await
    }

    async fn list_environments(
        &self,
        adapter: &str,
        repository: &Repository,
    ) -> StorageResult<Vec<Environment>> {
        self.list_entities(adapter, repository, ENVIRONMENTS).await
    }
}

#[async_trait]
impl EntityWriter for FileBackend {
    async fn upsert_repository(&self, adapter: &str, repository: &Repository) -> StorageResult<()> {
        let path = self.adapter_dir(adapter).join(REPOSITORIES);
        self.update_json(&path, |records: &mut RecordMap<Repository>| {
            upsert_records(records, std::slice::from_ref(repository), |r| &r.id);
        })
        .await
    }

    async fn upsert_issues(
        &self,
        adapter: &str,
        repository: &Repository,
        issues: &[Issue],
    ) -> StorageResult<()> {
        self.upsert_entities(adapter, repository, ISSUES, issues, |i| i.id())
            .await
    }

    async fn upsert_commits(
        &self,
        adapter: &str,
        repository: &Repository,
        commits: &[Commit],
    ) -> StorageResult<()> {
        self.upsert_entities(adapter, repository, COMMITS, commits, |c| &c.sha)
            .await
    }

    async fn upsert_pull_requests(
        &self,
        adapter: &str,
        repository: &Repository,
        pull_requests: &[PullRequest],
    ) -> StorageResult<()> {
        self.upsert_entities(adapter, repository, PULL_REQUESTS, pull_requests, |p| p.id())
            .await
    }

    async fn upsert_deployments(
        &self,
        adapter: &str,
        repository: &Repository,
        deployments: &[Deployment],
    ) -> StorageResult<()> {
        self.upsert_entities(adapter, repository, DEPLOYMENTS, deployments, |d| &d.id)
            .await
    }

    async fn upsert_environments(
        &self,
        adapter: &str,
        repository: &Repository,
        environments: &[Environment],
    ) -> StorageResult<()> {
        self.upsert_entities(adapter, repository, ENVIRONMENTS, environments, |e| &e.id)
            .await
    }
}

#[async_trait]
impl MetricsWriter for FileBackend {
    async fn write_deployment_frequency(
        &self,
        adapter: &str,
        repository: &Repository,
        frequency: &DeploymentFrequency,
    ) -> StorageResult<()> {
        self.update_metrics(adapter, repository, |m| m.apply_deployment_frequency(frequency))
            .await
    }

    async fn write_lead_time_for_change(
        &self,
        adapter: &str,
        repository: &Repository,
        lead_times: &LeadTimes,
    ) -> StorageResult<()> {
        self.update_metrics(adapter, repository, |m| m.apply_lead_times(lead_times))
            .await
    }

    async fn write_change_failure_rate(
        &self,
        adapter: &str,
        repository: &Repository,
        rate: f64,
    ) -> StorageResult<()> {
        self.update_metrics(adapter, repository, |m| m.apply_change_failure_rate(rate))
            .await
    }

    async fn write_times_to_restore_service(
        &self,
        adapter: &str,
        repository: &Repository,
        restore_times: &RestoreTimes,
    ) -> StorageResult<()> {
        self.update_metrics(adapter, repository, |m| m.apply_restore_times(restore_times))
            .await
    }
}

#[async_trait]
impl MetricsReader for FileBackend {
    async fn load_metrics(
        &self,
        adapter: &str,
        repository_id: &str,
    ) -> StorageResult<Option<StoredMetrics>> {
        let path = self.metrics_path(adapter, repository_id);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[async_trait]
impl UnifiedStorage for FileBackend {
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let writable = match fs::metadata(&self.base_dir).await {
            Ok(meta) => !meta.permissions().readonly(),
            Err(_) => false,
        };

        Ok(HealthStatus {
            healthy: writable,
            backend_type: "file".to_string(),
            message: (!writable).then(|| format!("{} is not writable", self.base_dir.display())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Head, IssueType, WorkItem};
    use chrono::{NaiveDate, TimeDelta, TimeZone, Utc};
    use tempfile::TempDir;

    async fn backend(dir: &TempDir) -> FileBackend {
        FileBackend::new(&FileConfig {
            base_dir: dir.path().to_path_buf(),
            pretty: true,
        })
        .await
        .unwrap()
    }

    fn repository() -> Repository {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Repository {
            id: "octo%2Fservice".to_string(),
            full_name: "service".to_string(),
            default_branch: "main".to_string(),
            created_at: at,
            updated_at: at,
            grouping_key: None,
        }
    }

    #[test]
    fn test_path_segment_is_a_single_component() {
        assert_eq!(path_segment("octo/service"), "octo%2Fservice");
        assert_eq!(path_segment(".."), "%2E%2E");
        assert!(!path_segment("a\\b").contains('\\'));
    }

    #[tokio::test]
    async fn test_entities_round_trip_through_disk() {
        let dir = TempDir::new().unwrap();
        let storage = backend(&dir).await;
        let repo = repository();
        let created = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let pull_request = PullRequest {
            work_item: WorkItem::new("5", created),
            head: Head::new("feature"),
            base: Head::new("main"),
            merged_at: Some(created),
            issues: vec!["1".to_string()],
            commits: vec![Commit::sha_only("abc")],
        };
        let issue = Issue {
            work_item: WorkItem::new("1", created),
            pull_requests: vec!["5".to_string()],
            issue_type: Some(IssueType::Bug),
        };

        storage.upsert_repository("github", &repo).await.unwrap();
        storage
            .upsert_pull_requests("github", &repo, std::slice::from_ref(&pull_request))
            .await
            .unwrap();
        storage
            .upsert_issues("github", &repo, std::slice::from_ref(&issue))
            .await
            .unwrap();

        let reopened = backend(&dir).await;
        assert_eq!(reopened.list_repositories("github").await.unwrap(), vec![repo.clone()]);
        assert_eq!(
            reopened.list_pull_requests("github", &repo).await.unwrap(),
            vec![pull_request]
        );
        assert_eq!(reopened.list_issues("github", &repo).await.unwrap(), vec![issue]);
        assert!(reopened.list_deployments("github", &repo).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_manually_corrected_file_record_survives_upsert() {
        let dir = TempDir::new().unwrap();
        let storage = backend(&dir).await;
        let repo = repository();
        let commit = Commit::new("abc", Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap());
        storage
            .upsert_commits("github", &repo, std::slice::from_ref(&commit))
            .await
            .unwrap();

        let path = storage.entity_path("github", &repo.id, COMMITS);
        let content = std::fs::read_to_string(&path).unwrap();
        let corrected = content.replace("\"manually_corrected\": false", "\"manually_corrected\": true");
        std::fs::write(&path, corrected).unwrap();

        storage
            .upsert_commits("github", &repo, &[Commit::sha_only("abc")])
            .await
            .unwrap();

        let commits = storage.list_commits("github", &repo).await.unwrap();
        assert_eq!(commits, vec![commit]);
    }

    #[tokio::test]
    async fn test_concurrent_metric_writes_all_land() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(backend(&dir).await);
        let repo = repository();

        let mut handles = Vec::new();
        for day in 1..=8u32 {
            let storage = Arc::clone(&storage);
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                let date = NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
                let frequency: DeploymentFrequency = [(date, day)].into_iter().collect();
                storage
                    .write_deployment_frequency("github", &repo, &frequency)
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = storage.load_metrics("github", &repo.id).await.unwrap().unwrap();
        assert_eq!(stored.deployment_frequency.len(), 8);
        assert_eq!(stored.repository_name, "service");
        assert!(storage.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_metrics_missing_until_written() {
        let dir = TempDir::new().unwrap();
        let storage = backend(&dir).await;
        let repo = repository();
        assert!(storage.load_metrics("github", &repo.id).await.unwrap().is_none());

        let lead_times: LeadTimes = [("1".to_string(), Some(TimeDelta::hours(1)))].into_iter().collect();
        storage
            .write_lead_time_for_change("github", &repo, &lead_times)
            .await
            .unwrap();

        let stored = storage.load_metrics("github", &repo.id).await.unwrap().unwrap();
        assert_eq!(stored.lead_times_ms["1"], Some(3_600_000));
        assert_eq!(stored.change_failure_rate, None);
    }

    #[tokio::test]
    async fn test_base_dir_must_be_a_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("occupied");
        std::fs::write(&file, "").unwrap();

        let result = FileBackend::new(&FileConfig {
            base_dir: file,
            pretty: false,
        })
        .await;

        assert!(matches!(result, Err(StorageError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_health_check_reports_file_backend() {
        let dir = TempDir::new().unwrap();
        let storage = backend(&dir).await;

        let health = storage.health_check().await.unwrap();

        assert!(health.healthy);
        assert_eq!(health.backend_type, "file");
    }
}
