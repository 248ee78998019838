//! Commit origin inference
//!
//! A commit may be listed by several pull requests: once on the feature branch,
//! again when `develop` is merged into `main`, again after a cherry-pick. The
//! resolver links those pull requests into a chain, where each link's base ref
//! continues the previous link's head ref, and records the end of that chain as
//! the commit's point of introduction.

use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use crate::domain::PullRequest;

/// Where a commit was introduced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// The pull request that introduced the commit
    Resolved(String),
    /// Candidates that could not be reduced to a single chain end
    Ambiguous(Vec<String>),
}

impl Origin {
    /// The owning pull request id, if the origin is unambiguous
    pub fn pull_request(&self) -> Option<&str> {
        match self {
            Self::Resolved(id) => Some(id),
            Self::Ambiguous(_) => None,
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Ambiguous(_))
    }
}

/// Commit sha -> origin, for every commit listed by at least one pull request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginMap {
    origins: HashMap<String, Origin>,
}

impl OriginMap {
    pub fn get(&self, sha: &str) -> Option<&Origin> {
        self.origins.get(sha)
    }

    /// True when `pull_request_id` is the resolved origin of `sha`
    pub fn is_origin(&self, sha: &str, pull_request_id: &str) -> bool {
        self.get(sha).and_then(Origin::pull_request) == Some(pull_request_id)
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    pub fn ambiguous_count(&self) -> usize {
        self.origins.values().filter(|o| o.is_ambiguous()).count()
    }
}

/// Determine the introducing pull request of every commit referenced by `pull_requests`
pub fn resolve_origins(pull_requests: &[PullRequest]) -> OriginMap {
    let mut referencing: HashMap<&str, Vec<&PullRequest>> = HashMap::new();
    for pull_request in pull_requests {
        for commit in &pull_request.commits {
            let candidates = referencing.entry(commit.sha.as_str()).or_default();
            if !candidates.iter().any(|c| c.id() == pull_request.id()) {
                candidates.push(pull_request);
            }
        }
    }

    let origins: HashMap<String, Origin> = referencing
        .into_iter()
        .map(|(sha, candidates)| {
            let origin = resolve_candidates(candidates);
            if let Origin::Ambiguous(ids) = &origin {
                warn!("Commit {} has an ambiguous origin among {:?}", sha, ids);
            }
            (sha.to_string(), origin)
        })
        .collect();

    debug!(
        "Resolved origins for {} commits across {} pull requests",
        origins.len(),
        pull_requests.len()
    );

    OriginMap { origins }
}

/// Reduce the pull requests sharing one commit to the end of their merge chain
fn resolve_candidates(mut candidates: Vec<&PullRequest>) -> Origin {
    candidates.sort_by(|a, b| a.id().cmp(b.id()));
    if let [only] = candidates.as_slice() {
        return Origin::Resolved(only.id().to_string());
    }

    let successors = continuations(&candidates);
    let mut has_predecessor = vec![false; candidates.len()];
    for next in successors.iter().flatten() {
        has_predecessor[*next] = true;
    }

    let mut visited = vec![false; candidates.len()];
    let mut ends = BTreeSet::new();
    for root in (0..candidates.len()).filter(|&i| !has_predecessor[i]) {
        walk_to_ends(root, &successors, &mut visited, &mut ends);
    }

    // Whatever the roots never reached sits on a cycle. Such a cycle is entered
    // at its earliest pull request; a tie leaves no defined entry point.
    while let Some(entry) = cycle_entry(&candidates, &visited) {
        match entry {
            Some(start) => walk_to_ends(start, &successors, &mut visited, &mut ends),
            None => {
                let mut ids: BTreeSet<&str> = ends.iter().map(|&i| candidates[i].id()).collect();
                ids.extend(
                    (0..candidates.len())
                        .filter(|&i| !visited[i])
                        .map(|i| candidates[i].id()),
                );
                return Origin::Ambiguous(ids.into_iter().map(str::to_string).collect());
            }
        }
    }

    let ids: Vec<String> = ends.into_iter().map(|i| candidates[i].id().to_string()).collect();
    match <[String; 1]>::try_from(ids) {
        Ok([id]) => Origin::Resolved(id),
        Err(ids) => Origin::Ambiguous(ids),
    }
}

/// For each candidate, the candidates whose base continues its head
fn continuations(candidates: &[&PullRequest]) -> Vec<Vec<usize>> {
    candidates
        .iter()
        .enumerate()
        .map(|(i, current)| {
            candidates
                .iter()
                .enumerate()
                .filter(|&(j, next)| j != i && next.base.ref_name == current.head.ref_name)
                .map(|(j, _)| j)
                .collect()
        })
        .collect()
}

/// Depth-first walk from `start`, collecting every candidate the chain can end on.
///
/// A candidate ends a chain when each of its continuations leads back into the
/// walk that reached it.
fn walk_to_ends(
    start: usize,
    successors: &[Vec<usize>],
    visited: &mut [bool],
    ends: &mut BTreeSet<usize>,
) {
    if visited[start] {
        return;
    }
    let mut on_path = vec![false; successors.len()];
    let mut stack = vec![(start, 0usize)];
    visited[start] = true;
    on_path[start] = true;

    while let Some((node, cursor)) = stack.pop() {
        match successors[node].get(cursor) {
            Some(&next) => {
                stack.push((node, cursor + 1));
                if !visited[next] {
                    visited[next] = true;
                    on_path[next] = true;
                    stack.push((next, 0));
                }
            }
            None => {
                on_path[node] = false;
                if successors[node].iter().all(|&next| on_path[next]) {
                    ends.insert(node);
                }
            }
        }
    }
}

/// Next entry point into an unvisited cycle.
///
/// `None` when every candidate has been walked, `Some(None)` when the earliest
/// unvisited pull requests tie on creation time.
fn cycle_entry(candidates: &[&PullRequest], visited: &[bool]) -> Option<Option<usize>> {
    let mut unvisited = (0..candidates.len()).filter(|&i| !visited[i]);
    let first = unvisited.next()?;
    let earliest = unvisited.fold(vec![first], |mut earliest, i| {
        let current = candidates[earliest[0]].created_at();
        match candidates[i].created_at().cmp(&current) {
            std::cmp::Ordering::Less => earliest = vec![i],
            std::cmp::Ordering::Equal => earliest.push(i),
            std::cmp::Ordering::Greater => {}
        }
        earliest
    });

    Some(match earliest.as_slice() {
        [only] => Some(*only),
        _ => None,
    })
}
