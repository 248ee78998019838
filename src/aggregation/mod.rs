//! Per-adapter aggregation of stored activity into delivery metrics
//!
//! For each repository the loader knows for an adapter: load every collection,
//! back-fill commit timestamps, resolve commit lineage, run the calculators and
//! persist each metric on its own. A failure in one repository, or in one
//! metric write, leaves the rest of the pass untouched.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::domain::Repository;
use crate::lineage::{hydrate_commit_times, Lineage};
use crate::metrics::{DeliveryMetrics, MetricsSummary};
use crate::storage::{EntityLoader, MetricsWriter, StorageError, StorageResult};

/// The step of a repository's aggregation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Listing the adapter's repositories
    List,
    Load,
    DeploymentFrequency,
    LeadTimeForChange,
    ChangeFailureRate,
    TimeToRestoreService,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::List => "list repositories",
            Self::Load => "load",
            Self::DeploymentFrequency => "deployment frequency",
            Self::LeadTimeForChange => "lead time for change",
            Self::ChangeFailureRate => "change failure rate",
            Self::TimeToRestoreService => "time to restore service",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: String,
    /// Whether rerunning the pass may succeed
    pub retryable: bool,
}

impl StageFailure {
    fn new(stage: Stage, error: &StorageError) -> Self {
        Self {
            stage,
            error: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

/// Commit lineage figures for one repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LineageStats {
    pub commits_hydrated: usize,
    pub commits_resolved: usize,
    pub ambiguous_origins: usize,
    pub refs: usize,
}

/// Outcome of aggregating one repository
#[derive(Debug, Clone, Serialize)]
pub struct RepositoryAggregation {
    pub repository_id: String,
    pub repository_name: String,
    /// `None` when the repository could not be loaded
    pub summary: Option<MetricsSummary>,
    pub lineage: LineageStats,
    pub failures: Vec<StageFailure>,
}

impl RepositoryAggregation {
    fn new(repository: &Repository) -> Self {
        Self {
            repository_id: repository.id.clone(),
            repository_name: repository.full_name.clone(),
            summary: None,
            lineage: LineageStats::default(),
            failures: Vec::new(),
        }
    }

    fn record(&mut self, stage: Stage, result: StorageResult<()>) {
        if let Err(e) = result {
            error!(
                "Writing {} for {} failed: {}",
                stage, self.repository_id, e
            );
            self.failures.push(StageFailure::new(stage, &e));
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of one aggregation pass over an adapter
#[derive(Debug, Clone, Serialize)]
pub struct AggregationReport {
    pub adapter: String,
    pub computed_at: DateTime<Utc>,
    pub repositories: Vec<RepositoryAggregation>,
    /// Set when the adapter's repositories could not be listed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing: Option<StageFailure>,
}

impl AggregationReport {
    /// A pass that stopped before any repository because listing failed
    pub fn listing_failed(adapter: &str, computed_at: DateTime<Utc>, error: &StorageError) -> Self {
        Self {
            adapter: adapter.to_string(),
            computed_at,
            repositories: Vec::new(),
            listing: Some(StageFailure::new(Stage::List, error)),
        }
    }

    pub fn is_success(&self) -> bool {
        self.listing.is_none() && self.repositories.iter().all(RepositoryAggregation::is_success)
    }

    /// Every failed stage, keyed by repository id, or by adapter for a listing failure
    pub fn failures(&self) -> impl Iterator<Item = (&str, &StageFailure)> {
        let listing = self
            .listing
            .iter()
            .map(move |failure| (self.adapter.as_str(), failure));
        listing.chain(self.repositories.iter().flat_map(|repo| {
            repo.failures
                .iter()
                .map(move |failure| (repo.repository_id.as_str(), failure))
        }))
    }
}

/// Runs the aggregation pass for an adapter
pub struct Aggregator {
    loader: Arc<dyn EntityLoader>,
    writer: Arc<dyn MetricsWriter>,
    concurrency: usize,
}

impl Aggregator {
    pub fn new(loader: Arc<dyn EntityLoader>, writer: Arc<dyn MetricsWriter>) -> Self {
        Self {
            loader,
            writer,
            concurrency: 4,
        }
    }

    /// Number of repositories processed at once; at least one
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Aggregate every repository of `adapter` as of now
    pub async fn aggregate(&self, adapter: &str) -> StorageResult<AggregationReport> {
        self.aggregate_at(adapter, Utc::now()).await
    }

    /// Aggregate every repository of `adapter`, measuring open items up to `now`
    ///
    /// Only listing the repositories can fail the whole pass.
    pub async fn aggregate_at(
        &self,
        adapter: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<AggregationReport> {
        let repositories = self.loader.list_repositories(adapter).await?;
        info!(
            "Aggregating {} repositories for adapter {}",
            repositories.len(),
            adapter
        );

        let mut results: Vec<RepositoryAggregation> = stream::iter(repositories.iter())
            .map(|repository| self.aggregate_repository(adapter, repository, now))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        results.sort_by(|a, b| a.repository_id.cmp(&b.repository_id));

        Ok(AggregationReport {
            adapter: adapter.to_string(),
            computed_at: now,
            repositories: results,
            listing: None,
        })
    }

    async fn aggregate_repository(
        &self,
        adapter: &str,
        repository: &Repository,
        now: DateTime<Utc>,
    ) -> RepositoryAggregation {
        let mut outcome = RepositoryAggregation::new(repository);

        let mut snapshot = match self.loader.load_snapshot(adapter, repository).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Loading {}/{} failed: {}", adapter, repository.id, e);
                outcome.failures.push(StageFailure::new(Stage::Load, &e));
                return outcome;
            }
        };
        if snapshot.is_empty() {
            debug!("{}/{} has no stored activity", adapter, repository.id);
        }

        outcome.lineage.commits_hydrated =
            hydrate_commit_times(&mut snapshot.pull_requests, &snapshot.commits);
        let lineage = Lineage::build(&snapshot.pull_requests);
        outcome.lineage.commits_resolved = lineage.origins.len();
        outcome.lineage.ambiguous_origins = lineage.origins.ambiguous_count();
        outcome.lineage.refs = lineage.timeline.refs().count();
        if outcome.lineage.ambiguous_origins > 0 {
            warn!(
                "{}/{}: {} commits have no single originating pull request",
                adapter, repository.id, outcome.lineage.ambiguous_origins
            );
        }

        let metrics = DeliveryMetrics::calculate(&snapshot, now);

        let (frequency, lead_times, failure_rate, restore_times) = tokio::join!(
            self.writer
                .write_deployment_frequency(adapter, repository, &metrics.deployment_frequency),
            self.writer
                .write_lead_time_for_change(adapter, repository, &metrics.lead_times),
            self.writer
                .write_change_failure_rate(adapter, repository, metrics.change_failure_rate),
            self.writer
                .write_times_to_restore_service(adapter, repository, &metrics.restore_times),
        );
        outcome.record(Stage::DeploymentFrequency, frequency);
        outcome.record(Stage::LeadTimeForChange, lead_times);
        outcome.record(Stage::ChangeFailureRate, failure_rate);
        outcome.record(Stage::TimeToRestoreService, restore_times);

        let summary = metrics.summary();
        info!(
            "{}/{}: {} deployments over {} days, {} lead times, change failure rate {:.2}, {} restores",
            adapter,
            repository.id,
            summary.total_deployments,
            summary.deployment_days,
            summary.lead_time_samples,
            summary.change_failure_rate,
            summary.restore_samples
        );
        outcome.summary = Some(summary);
        outcome
    }
}
