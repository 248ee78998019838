//! JSON payloads served by the adapters' `direct` endpoints
//!
//! Adapters embed the owning repository in most items and sometimes serialize
//! timestamps with `created_At` style keys; both are absorbed here before the
//! values become domain entities.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::{
    Commit, Deployment, Environment, Head, Issue, IssueType, PullRequest, Repository, WorkItem,
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WireRepository {
    pub id: String,
    pub full_name: String,
    #[serde(default)]
    pub default_branch: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<WireRepository> for Repository {
    fn from(repo: WireRepository) -> Self {
        Self {
            id: repo.id,
            full_name: repo.full_name,
            default_branch: repo.default_branch,
            created_at: repo.created_at,
            updated_at: repo.updated_at,
            grouping_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireIssue {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub repo: Option<WireRepository>,
    #[serde(default)]
    pub pull_requests: Vec<String>,
    #[serde(default, rename = "type")]
    pub issue_type: Option<String>,
}

impl From<WireIssue> for Issue {
    fn from(issue: WireIssue) -> Self {
        Self {
            work_item: WorkItem {
                id: issue.id,
                created_at: issue.created_at,
                closed_at: issue.closed_at,
            },
            pull_requests: issue.pull_requests,
            issue_type: issue.issue_type.map(IssueType::from),
        }
    }
}

/// Issues appear on pull requests either as bare ids or as objects
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IssueRef {
    Id(String),
    Object { id: String },
}

impl IssueRef {
    pub fn into_id(self) -> String {
        match self {
            Self::Id(id) | Self::Object { id } => id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireHead {
    #[serde(rename = "ref")]
    pub ref_name: String,
    #[serde(default)]
    pub sha: Option<String>,
}

impl From<WireHead> for Head {
    fn from(head: WireHead) -> Self {
        Self {
            ref_name: head.ref_name,
            sha: head.sha.filter(|sha| !sha.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireCommit {
    pub sha: String,
    #[serde(default)]
    pub repo: Option<WireRepository>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<WireCommit> for Commit {
    fn from(commit: WireCommit) -> Self {
        Self {
            sha: commit.sha,
            created_at: commit.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WirePullRequest {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub repo: Option<WireRepository>,
    pub head: WireHead,
    pub base: WireHead,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub issues: Vec<IssueRef>,
    /// Single linked issue, as some adapters report it
    #[serde(default)]
    pub issue: Option<IssueRef>,
    #[serde(default)]
    pub commits: Vec<WireCommit>,
}

impl From<WirePullRequest> for PullRequest {
    fn from(pr: WirePullRequest) -> Self {
        let mut issues: Vec<String> = pr.issues.into_iter().map(IssueRef::into_id).collect();
        if let Some(issue) = pr.issue {
            let id = issue.into_id();
            if !issues.contains(&id) {
                issues.push(id);
            }
        }

        Self {
            work_item: WorkItem {
                id: pr.id,
                created_at: pr.created_at,
                closed_at: pr.closed_at,
            },
            head: pr.head.into(),
            base: pr.base.into(),
            merged_at: pr.merged_at,
            issues,
            commits: pr.commits.into_iter().map(Commit::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireEnvironment {
    pub id: String,
    pub name: String,
    #[serde(alias = "created_At")]
    pub created_at: DateTime<Utc>,
    #[serde(alias = "updated_At")]
    pub updated_at: DateTime<Utc>,
}

impl From<WireEnvironment> for Environment {
    fn from(env: WireEnvironment) -> Self {
        Self {
            id: env.id,
            name: env.name,
            created_at: env.created_at,
            updated_at: env.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireDeployment {
    pub id: String,
    pub sha: String,
    #[serde(default)]
    pub commit: Option<WireCommit>,
    #[serde(rename = "ref")]
    pub ref_name: String,
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub environment: Option<WireEnvironment>,
    #[serde(alias = "created_At")]
    pub created_at: DateTime<Utc>,
    #[serde(alias = "updated_At")]
    pub updated_at: DateTime<Utc>,
}

impl From<WireDeployment> for Deployment {
    fn from(deployment: WireDeployment) -> Self {
        Self {
            id: deployment.id,
            sha: deployment.sha,
            commit: deployment.commit.map(|c| c.sha),
            ref_name: deployment.ref_name,
            task: deployment.task,
            environment: deployment.environment.map(|e| e.id),
            created_at: deployment.created_at,
            updated_at: deployment.updated_at,
        }
    }
}

/// The repository record to store for a batch of fetched items
///
/// Takes the first embedded repository, then prefers later copies of the same
/// repository that were updated more recently. Issues are scanned first, then
/// pull requests, then commits.
pub fn find_repository(
    issues: &[WireIssue],
    pull_requests: &[WirePullRequest],
    commits: &[WireCommit],
) -> Option<WireRepository> {
    let embedded = issues
        .iter()
        .filter_map(|i| i.repo.as_ref())
        .chain(pull_requests.iter().filter_map(|p| p.repo.as_ref()))
        .chain(commits.iter().filter_map(|c| c.repo.as_ref()));

    let mut found: Option<&WireRepository> = None;
    for repo in embedded {
        match found {
            None => found = Some(repo),
            Some(current) if current.id == repo.id && repo.updated_at > current.updated_at => {
                found = Some(repo)
            }
            Some(_) => {}
        }
    }
    found.cloned()
}
