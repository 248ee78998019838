//! Common test utilities and helpers
#![allow(dead_code)]

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use delivery_metrics::domain::{
    Commit, Deployment, Head, Issue, IssueType, PullRequest, Repository, WorkItem,
};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Midnight UTC on a day of January 2024, plus `hour`
pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
}

pub fn repository(id: &str) -> Repository {
    Repository {
        id: id.to_string(),
        full_name: format!("org/{id}"),
        default_branch: "main".to_string(),
        created_at: at(1, 0),
        updated_at: at(1, 0),
        grouping_key: None,
    }
}

pub fn issue(id: &str, issue_type: Option<&str>, created: DateTime<Utc>) -> Issue {
    Issue {
        work_item: WorkItem::new(id, created),
        pull_requests: vec![],
        issue_type: issue_type.map(IssueType::from),
    }
}

pub fn closed_issue(
    id: &str,
    issue_type: Option<&str>,
    created: DateTime<Utc>,
    closed: DateTime<Utc>,
) -> Issue {
    let mut issue = issue(id, issue_type, created);
    issue.work_item.closed_at = Some(closed);
    issue
}

pub fn deployment(id: &str, created: DateTime<Utc>) -> Deployment {
    Deployment {
        id: id.to_string(),
        sha: format!("sha-{id}"),
        commit: None,
        ref_name: "main".to_string(),
        task: "deploy".to_string(),
        environment: None,
        created_at: created,
        updated_at: created,
    }
}

pub fn pull_request(
    id: &str,
    head: &str,
    base: &str,
    created: DateTime<Utc>,
    merged: Option<DateTime<Utc>>,
    commits: &[(&str, DateTime<Utc>)],
) -> PullRequest {
    PullRequest {
        work_item: WorkItem::new(id, created),
        head: Head::new(head),
        base: Head::new(base),
        merged_at: merged,
        issues: vec![],
        commits: commits
            .iter()
            .map(|(sha, created)| Commit::new(*sha, *created))
            .collect(),
    }
}

/// Temporary working directory holding a config file and a storage directory
pub struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.temp_dir.path().join("store")
    }

    /// Write `config.yml` with file storage under [`Self::storage_dir`]
    pub fn write_config(&self, adapters: &[(&str, &str)], repositories: &[(&str, &str)]) -> Result<PathBuf> {
        let mut yaml = String::from("adapters:\n");
        for (name, baseurl) in adapters {
            yaml.push_str(&format!("  - name: {name}\n    baseurl: {baseurl}\n    token: test-token\n"));
        }
        if adapters.is_empty() {
            yaml = String::from("adapters: []\n");
        }
        yaml.push_str("repositories:\n");
        for (id, adapter) in repositories {
            yaml.push_str(&format!("  - id: \"{id}\"\n    adapter: {adapter}\n"));
        }
        if repositories.is_empty() {
            yaml.push_str("  []\n");
        }
        yaml.push_str(&format!(
            "storage:\n  backend: file\n  file:\n    base_dir: {}\n    pretty: true\n",
            self.storage_dir().display()
        ));

        let path = self.temp_dir.path().join("config.yml");
        fs::write(&path, yaml)?;
        Ok(path)
    }

    pub fn read_file(&self, path: impl AsRef<Path>) -> Result<String> {
        Ok(fs::read_to_string(self.temp_dir.path().join(path))?)
    }
}

/// Source API stand-in answering GET requests with canned JSON bodies
///
/// Unknown paths get a 404. Every request's path and `Authorization` header
/// are recorded. The server task stops when the value is dropped.
pub struct MockSourceApi {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<(String, Option<String>)>>>,
    server: JoinHandle<()>,
}

#[derive(Clone)]
struct MockState {
    routes: Arc<HashMap<String, String>>,
    requests: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

async fn serve_route(State(state): State<MockState>, uri: Uri, headers: HeaderMap) -> Response {
    let path = uri.path().to_string();
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    state.requests.lock().unwrap().push((path.clone(), authorization));

    match state.routes.get(&path) {
        Some(body) => ([(header::CONTENT_TYPE, "application/json")], body.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(serde_json::json!({}))).into_response(),
    }
}

impl MockSourceApi {
    pub async fn start(routes: HashMap<String, String>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let requests = Arc::new(Mutex::new(Vec::new()));

        let app = Router::new().fallback(serve_route).with_state(MockState {
            routes: Arc::new(routes),
            requests: Arc::clone(&requests),
        });
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("mock source API stopped: {e}");
            }
        });

        Ok(Self {
            addr,
            requests,
            server,
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(path, _)| path.clone())
            .collect()
    }
}

impl Drop for MockSourceApi {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Routes serving one small repository under `direct/repos/<id>`
pub fn repository_routes(id: &str) -> HashMap<String, String> {
    let repo = format!(
        r#"{{"id":"{id}","full_name":"org/{id}","default_branch":"main","created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-01T00:00:00Z"}}"#
    );
    let issues = format!(
        r#"[
  {{"id":"1","created_at":"2024-01-01T00:00:00Z","closed_at":"2024-01-03T00:00:00Z","repo":{repo}}},
  {{"id":"2","created_at":"2024-01-02T00:00:00Z","closed_at":"2024-01-02T06:00:00Z","type":"Bug","repo":{repo}}},
  {{"id":"3","created_at":"2024-01-02T00:00:00Z","closed_at":"2024-01-04T00:00:00Z","type":"Issue","repo":{repo}}}
]"#
    );
    let commits = r#"[{"sha":"c1","created_at":"2024-01-01T01:00:00Z"},{"sha":"c2","created_at":"2024-01-01T02:00:00Z"}]"#;
    let pulls = r#"[
  {"id":"10","created_at":"2024-01-01T03:00:00Z","head":{"ref":"feature/login"},"base":{"ref":"develop"},"merged_at":"2024-01-01T04:00:00Z","issues":["1"],"commits":[{"sha":"c1"},{"sha":"c2"}]},
  {"id":"11","created_at":"2024-01-02T00:00:00Z","head":{"ref":"develop"},"base":{"ref":"main"},"merged_at":"2024-01-02T01:00:00Z","commits":[{"sha":"c1"},{"sha":"c2"}]}
]"#;
    let deployments = r#"[
  {"id":"d1","sha":"c2","ref":"main","task":"deploy","created_at":"2024-01-01T10:00:00Z","updated_at":"2024-01-01T10:00:00Z"},
  {"id":"d2","sha":"c2","ref":"main","task":"deploy","created_at":"2024-01-01T18:00:00Z","updated_at":"2024-01-01T18:00:00Z"},
  {"id":"d3","sha":"c2","ref":"main","task":"deploy","created_At":"2024-01-03T09:00:00Z","updated_At":"2024-01-03T09:00:00Z"}
]"#;
    let environments = r#"[{"id":"e1","name":"production","created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-01T00:00:00Z"}]"#;

    let prefix = format!("/direct/repos/{id}");
    HashMap::from([
        (prefix.clone(), repo.clone()),
        (format!("{prefix}/issues"), issues),
        (format!("{prefix}/commits"), commits.to_string()),
        (format!("{prefix}/pulls"), pulls.to_string()),
        (format!("{prefix}/deployments"), deployments.to_string()),
        (format!("{prefix}/environments"), environments.to_string()),
    ])
}
