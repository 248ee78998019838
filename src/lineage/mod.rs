//! Commit lineage across pull requests
//!
//! - `origin` - decides which pull request introduced each commit
//! - `timeline` - earliest time each commit became reachable from each ref
//!
//! Both are pure functions over one repository's pull requests; they never
//! touch storage and can run for different repositories in parallel.

pub mod origin;
pub mod timeline;

pub use origin::{resolve_origins, Origin, OriginMap};
pub use timeline::{reconstruct_timeline, Timeline};

use std::collections::HashMap;

use crate::domain::{Commit, PullRequest};

/// Resolved origins together with the timeline built from them
#[derive(Debug, Clone, Default)]
pub struct Lineage {
    pub origins: OriginMap,
    pub timeline: Timeline,
}

impl Lineage {
    pub fn build(pull_requests: &[PullRequest]) -> Self {
        let origins = resolve_origins(pull_requests);
        let timeline = reconstruct_timeline(pull_requests, &origins);
        Self { origins, timeline }
    }
}

/// Fill in commit timestamps that stored pull requests only know by sha.
///
/// Returns the number of commits that received a timestamp.
pub fn hydrate_commit_times(pull_requests: &mut [PullRequest], commits: &[Commit]) -> usize {
    let known: HashMap<&str, _> = commits
        .iter()
        .filter_map(|c| c.created_at.map(|at| (c.sha.as_str(), at)))
        .collect();

    let mut filled = 0;
    for commit in pull_requests.iter_mut().flat_map(|pr| pr.commits.iter_mut()) {
        if commit.created_at.is_none() {
            if let Some(at) = known.get(commit.sha.as_str()) {
                commit.created_at = Some(*at);
                filled += 1;
            }
        }
    }
    filled
}
