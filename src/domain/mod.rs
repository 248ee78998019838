//! Repository activity entities
//!
//! These are the records ingestion persists and aggregation reads back. Every
//! entity is scoped by `(adapter, repository id)` in storage, so none of them
//! carries a pointer back to its owning [`Repository`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A repository known to one adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub full_name: String,
    #[serde(default)]
    pub default_branch: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Logical grouping label used for cross-repository rollups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouping_key: Option<String>,
}

/// Fields shared by issues and pull requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// `None` while the item is still open
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            created_at,
            closed_at: None,
        }
    }

    /// Closing time, ignoring zero-value sentinels some stores write for open items
    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at.filter(|closed| closed.timestamp() > 0)
    }

    /// Time from creation until resolution, or until `now` for open items
    pub fn elapsed(&self, now: DateTime<Utc>) -> chrono::TimeDelta {
        self.resolved_at().unwrap_or(now) - self.created_at
    }
}

/// Classification label of an issue
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IssueType {
    Issue,
    Bug,
    Other(String),
}

impl IssueType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Issue => "Issue",
            Self::Bug => "Bug",
            Self::Other(label) => label,
        }
    }
}

impl From<String> for IssueType {
    fn from(label: String) -> Self {
        match label.as_str() {
            "Issue" => Self::Issue,
            "Bug" => Self::Bug,
            _ => Self::Other(label),
        }
    }
}

impl From<&str> for IssueType {
    fn from(label: &str) -> Self {
        Self::from(label.to_string())
    }
}

impl From<IssueType> for String {
    fn from(issue_type: IssueType) -> Self {
        match issue_type {
            IssueType::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(flatten)]
    pub work_item: WorkItem,
    /// Ids of the pull requests linked to this issue
    #[serde(default)]
    pub pull_requests: Vec<String>,
    /// `None` means unclassified
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub issue_type: Option<IssueType>,
}

impl Issue {
    pub fn id(&self) -> &str {
        &self.work_item.id
    }

    pub fn is_bug(&self) -> bool {
        self.issue_type == Some(IssueType::Bug)
    }

    /// Feature work: explicitly typed `Issue` or not classified at all
    pub fn is_change_request(&self) -> bool {
        matches!(self.issue_type, None | Some(IssueType::Issue))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    /// Authored (or committed) time; `None` when only the sha is known
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Commit {
    pub fn new(sha: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            sha: sha.into(),
            created_at: Some(created_at),
        }
    }

    pub fn sha_only(sha: impl Into<String>) -> Self {
        Self {
            sha: sha.into(),
            created_at: None,
        }
    }
}

/// A named ref at a specific commit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Head {
    #[serde(rename = "ref")]
    pub ref_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

impl Head {
    pub fn new(ref_name: impl Into<String>) -> Self {
        Self {
            ref_name: ref_name.into(),
            sha: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    #[serde(flatten)]
    pub work_item: WorkItem,
    /// Merge source
    pub head: Head,
    /// Merge target
    pub base: Head,
    /// `None` until merged
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
    /// Ids of the issues this pull request closes
    #[serde(default)]
    pub issues: Vec<String>,
    /// Commits introduced by this pull request
    #[serde(default)]
    pub commits: Vec<Commit>,
}

impl PullRequest {
    pub fn id(&self) -> &str {
        &self.work_item.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.work_item.created_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    pub sha: String,
    /// Sha of the deployed commit, when the source linked one
    #[serde(default)]
    pub commit: Option<String>,
    #[serde(rename = "ref")]
    pub ref_name: String,
    #[serde(default)]
    pub task: String,
    /// Id of the target environment
    #[serde(default)]
    pub environment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Every persisted collection of one repository
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepositorySnapshot {
    pub issues: Vec<Issue>,
    pub commits: Vec<Commit>,
    pub pull_requests: Vec<PullRequest>,
    pub deployments: Vec<Deployment>,
    pub environments: Vec<Environment>,
}

impl RepositorySnapshot {
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
            && self.commits.is_empty()
            && self.pull_requests.is_empty()
            && self.deployments.is_empty()
            && self.environments.is_empty()
    }
}
