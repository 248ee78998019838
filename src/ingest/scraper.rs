//! Fan-out ingestion of configured repositories

use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::client::{HttpSourceClient, SourceClient};
use super::wire::find_repository;
use super::{IngestFailure, IngestReport, IngestedRepository};
use crate::config::{Config, RepositoryConfig};
use crate::domain::{Commit, Deployment, Environment, Issue, PullRequest, Repository};
use crate::error::{Error, Result};
use crate::storage::EntityWriter;

struct Source {
    adapter: String,
    client: Arc<dyn SourceClient>,
}

/// Pulls repository activity from the source APIs into storage
pub struct Scraper {
    writer: Arc<dyn EntityWriter>,
    /// Keyed by lowercased adapter name
    sources: HashMap<String, Source>,
}

impl Scraper {
    pub fn new(writer: Arc<dyn EntityWriter>) -> Self {
        Self {
            writer,
            sources: HashMap::new(),
        }
    }

    /// One HTTP source per configured adapter
    pub fn from_config(config: &Config, writer: Arc<dyn EntityWriter>) -> Result<Self> {
        let mut scraper = Self::new(writer);
        for adapter in &config.adapters {
            let client = HttpSourceClient::new(adapter, config.http.timeout)?;
            scraper = scraper.with_source(&adapter.name, Arc::new(client));
        }
        Ok(scraper)
    }

    /// Register the client serving an adapter
    pub fn with_source(mut self, adapter: &str, client: Arc<dyn SourceClient>) -> Self {
        self.sources.insert(
            adapter.to_ascii_lowercase(),
            Source {
                adapter: adapter.to_string(),
                client,
            },
        );
        self
    }

    /// Ingest every repository concurrently, returning once all of them finished
    pub async fn ingest(&self, repositories: &[RepositoryConfig]) -> IngestReport {
        let mut report = IngestReport::default();
        let mut tasks = JoinSet::new();
        let mut spawned = HashMap::new();

        for repository in repositories {
            let Some(source) = self.sources.get(&repository.adapter.to_ascii_lowercase()) else {
                warn!(
                    "No source for adapter '{}', skipping repository {}",
                    repository.adapter, repository.id
                );
                report.failed.push(IngestFailure {
                    adapter: repository.adapter.clone(),
                    repository_id: repository.id.clone(),
                    error: format!("unknown adapter '{}'", repository.adapter),
                });
                continue;
            };

            let writer = Arc::clone(&self.writer);
            let client = Arc::clone(&source.client);
            let adapter = source.adapter.clone();
            let repository_id = repository.id.clone();

            let task = {
                let (adapter, repository_id) = (adapter.clone(), repository_id.clone());
                tasks.spawn(async move {
                    ingest_repository(writer.as_ref(), client.as_ref(), &adapter, &repository_id)
                        .await
                })
            };
            spawned.insert(task.id(), (adapter, repository_id));
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, result)) => (id, result.map_err(|e| e.to_string())),
                Err(e) => (e.id(), Err(format!("ingestion task did not complete: {e}"))),
            };
            let (adapter, repository_id) = spawned.remove(&id).unwrap_or_default();

            match result {
                Ok(ingested) => {
                    info!(
                        "Ingested {}/{}: {} issues, {} commits, {} pull requests, {} deployments",
                        ingested.adapter,
                        ingested.repository_id,
                        ingested.issues,
                        ingested.commits,
                        ingested.pull_requests,
                        ingested.deployments
                    );
                    report.succeeded.push(ingested);
                }
                Err(error) => {
                    error!("Ingestion of {}/{} failed: {}", adapter, repository_id, error);
                    report.failed.push(IngestFailure {
                        adapter,
                        repository_id,
                        error,
                    });
                }
            }
        }

        report
            .succeeded
            .sort_by(|a, b| (&a.adapter, &a.repository_id).cmp(&(&b.adapter, &b.repository_id)));
        report
    }
}

async fn ingest_repository(
    writer: &dyn EntityWriter,
    client: &dyn SourceClient,
    adapter: &str,
    repository_id: &str,
) -> Result<IngestedRepository> {
    debug!("Fetching {}/{}", adapter, repository_id);

    let (issues, commits, pull_requests, deployments, environments) = tokio::try_join!(
        client.fetch_issues(repository_id),
        client.fetch_commits(repository_id),
        client.fetch_pull_requests(repository_id),
        client.fetch_deployments(repository_id),
        client.fetch_environments(repository_id),
    )?;

    let repository: Repository = match find_repository(&issues, &pull_requests, &commits) {
        Some(embedded) => embedded.into(),
        None => client.fetch_repository(repository_id).await?.into(),
    };
    if repository.id.is_empty() {
        return Err(Error::NotFound(format!(
            "repository record for {adapter}/{repository_id}"
        )));
    }

    let issues: Vec<Issue> = issues.into_iter().map(Issue::from).collect();
    let commits: Vec<Commit> = commits.into_iter().map(Commit::from).collect();
    let pull_requests: Vec<PullRequest> = pull_requests.into_iter().map(PullRequest::from).collect();
    let deployments: Vec<Deployment> = deployments.into_iter().map(Deployment::from).collect();
    let environments: Vec<Environment> = environments.into_iter().map(Environment::from).collect();

    writer.upsert_repository(adapter, &repository).await?;
    writer.upsert_issues(adapter, &repository, &issues).await?;
    writer.upsert_commits(adapter, &repository, &commits).await?;
    writer
        .upsert_pull_requests(adapter, &repository, &pull_requests)
        .await?;
    writer
        .upsert_deployments(adapter, &repository, &deployments)
        .await?;
    writer
        .upsert_environments(adapter, &repository, &environments)
        .await?;

    Ok(IngestedRepository {
        adapter: adapter.to_string(),
        repository_id: repository.id,
        issues: issues.len(),
        commits: commits.len(),
        pull_requests: pull_requests.len(),
        deployments: deployments.len(),
        environments: environments.len(),
    })
}
