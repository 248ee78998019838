//! Access to an adapter's `direct` API

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::wire::{
    WireCommit, WireDeployment, WireEnvironment, WireIssue, WirePullRequest, WireRepository,
};
use crate::config::AdapterConfig;
use crate::error::{Error, Result};

/// Fetches the activity of one repository from a source API
#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn fetch_repository(&self, repository_id: &str) -> Result<WireRepository>;

    async fn fetch_issues(&self, repository_id: &str) -> Result<Vec<WireIssue>>;

    async fn fetch_commits(&self, repository_id: &str) -> Result<Vec<WireCommit>>;

    async fn fetch_pull_requests(&self, repository_id: &str) -> Result<Vec<WirePullRequest>>;

    async fn fetch_deployments(&self, repository_id: &str) -> Result<Vec<WireDeployment>>;

    async fn fetch_environments(&self, repository_id: &str) -> Result<Vec<WireEnvironment>>;
}

/// `SourceClient` over HTTP with bearer authentication
pub struct HttpSourceClient {
    client: Client,
    base_url: Url,
    token: String,
}

impl HttpSourceClient {
    pub fn new(adapter: &AdapterConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url(&adapter.baseurl)?,
            token: adapter.token.clone(),
        })
    }

    /// Resolve an endpoint relative to the adapter base URL
    pub fn build_url(&self, endpoint: &str) -> Result<Url> {
        Ok(self.base_url.join(endpoint)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = self.build_url(endpoint)?;
        debug!("GET {}", url);

        let mut request = self.client.get(url.clone());
        if !self.token.is_empty() {
            request = request.bearer_auth(&self.token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Error::HttpStatus(format!(
                "GET {} failed with status: {}",
                url,
                response.status()
            )));
        }

        Ok(response.json().await?)
    }
}

/// Parse a base URL so that relative endpoints append to its path
fn base_url(raw: &str) -> Result<Url> {
    if raw.ends_with('/') {
        Ok(Url::parse(raw)?)
    } else {
        Ok(Url::parse(&format!("{raw}/"))?)
    }
}

fn repo_endpoint(repository_id: &str, collection: Option<&str>) -> String {
    match collection {
        Some(collection) => format!("direct/repos/{repository_id}/{collection}"),
        None => format!("direct/repos/{repository_id}"),
    }
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    async fn fetch_repository(&self, repository_id: &str) -> Result<WireRepository> {
        self.get_json(&repo_endpoint(repository_id, None)).await
    }

    async fn fetch_issues(&self, repository_id: &str) -> Result<Vec<WireIssue>> {
        self.get_json(&repo_endpoint(repository_id, Some("issues")))
            .await
    }

    async fn fetch_commits(&self, repository_id: &str) -> Result<Vec<WireCommit>> {
        self.get_json(&repo_endpoint(repository_id, Some("commits")))
            .await
    }

    async fn fetch_pull_requests(&self, repository_id: &str) -> Result<Vec<WirePullRequest>> {
        self.get_json(&repo_endpoint(repository_id, Some("pulls")))
            .await
    }

    async fn fetch_deployments(&self, repository_id: &str) -> Result<Vec<WireDeployment>> {
        self.get_json(&repo_endpoint(repository_id, Some("deployments")))
            .await
    }

    async fn fetch_environments(&self, repository_id: &str) -> Result<Vec<WireEnvironment>> {
        self.get_json(&repo_endpoint(repository_id, Some("environments")))
            .await
    }
}
