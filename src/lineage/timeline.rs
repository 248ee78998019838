//! Per-branch commit timelines

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

use super::origin::OriginMap;
use crate::domain::PullRequest;

type RefTimes = HashMap<String, HashMap<String, DateTime<Utc>>>;

/// Earliest known time each commit reached each ref
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    /// ref -> sha -> earliest merge time into that ref
    base_refs: RefTimes,
    /// ref -> sha -> earliest appearance on that ref as a merge source
    head_refs: RefTimes,
}

impl Timeline {
    /// When `sha` landed on `ref_name` through a merged pull request
    pub fn landed_at(&self, ref_name: &str, sha: &str) -> Option<DateTime<Utc>> {
        lookup(&self.base_refs, ref_name, sha)
    }

    /// When `sha` first appeared on `ref_name` as the source of a pull request
    pub fn first_seen(&self, ref_name: &str, sha: &str) -> Option<DateTime<Utc>> {
        lookup(&self.head_refs, ref_name, sha)
    }

    /// Earliest time `sha` was reachable from `ref_name` by either route
    pub fn reachable_at(&self, ref_name: &str, sha: &str) -> Option<DateTime<Utc>> {
        match (self.landed_at(ref_name, sha), self.first_seen(ref_name, sha)) {
            (Some(landed), Some(seen)) => Some(landed.min(seen)),
            (landed, seen) => landed.or(seen),
        }
    }

    /// Commits merged into `ref_name`, with their landing time
    pub fn landed_on(&self, ref_name: &str) -> Option<&HashMap<String, DateTime<Utc>>> {
        self.base_refs.get(ref_name)
    }

    pub fn refs(&self) -> impl Iterator<Item = &str> {
        let mut refs: Vec<&str> = self
            .base_refs
            .keys()
            .chain(self.head_refs.keys())
            .map(String::as_str)
            .collect();
        refs.sort_unstable();
        refs.dedup();
        refs.into_iter()
    }

    pub fn is_empty(&self) -> bool {
        self.base_refs.is_empty() && self.head_refs.is_empty()
    }
}

fn lookup(times: &RefTimes, ref_name: &str, sha: &str) -> Option<DateTime<Utc>> {
    times.get(ref_name).and_then(|commits| commits.get(sha)).copied()
}

fn record_earliest(times: &mut RefTimes, ref_name: &str, sha: &str, at: DateTime<Utc>) {
    times
        .entry(ref_name.to_string())
        .or_default()
        .entry(sha.to_string())
        .and_modify(|earliest| *earliest = (*earliest).min(at))
        .or_insert(at);
}

/// Build per-ref timelines from pull requests and their resolved commit origins
pub fn reconstruct_timeline(pull_requests: &[PullRequest], origins: &OriginMap) -> Timeline {
    let mut timeline = Timeline::default();

    for pull_request in pull_requests {
        for commit in &pull_request.commits {
            // Only the introducing pull request carries the commit's own timestamp.
            let head_time = if origins.is_origin(&commit.sha, pull_request.id()) {
                commit.created_at.unwrap_or_else(|| pull_request.created_at())
            } else {
                pull_request.created_at()
            };

            if let Some(merged_at) = pull_request.merged_at {
                record_earliest(
                    &mut timeline.base_refs,
                    &pull_request.base.ref_name,
                    &commit.sha,
                    merged_at,
                );
            }
            record_earliest(
                &mut timeline.head_refs,
                &pull_request.head.ref_name,
                &commit.sha,
                head_time,
            );
        }
    }

    debug!(
        "Reconstructed timelines for {} refs from {} pull requests",
        timeline.refs().count(),
        pull_requests.len()
    );

    timeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Commit, Head, WorkItem};
    use crate::lineage::resolve_origins;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn pr(
        id: &str,
        base: &str,
        head: &str,
        created: u32,
        merged: Option<u32>,
        commits: Vec<Commit>,
    ) -> PullRequest {
        PullRequest {
            work_item: WorkItem::new(id, at(created)),
            head: Head::new(head),
            base: Head::new(base),
            merged_at: merged.map(at),
            issues: vec![],
            commits,
        }
    }

    #[test]
    fn test_origin_gets_commit_timestamp() {
        let prs = vec![pr("1", "main", "feature", 5, Some(6), vec![Commit::new("a", at(2))])];
        let origins = resolve_origins(&prs);

        let timeline = reconstruct_timeline(&prs, &origins);

        assert_eq!(timeline.first_seen("feature", "a"), Some(at(2)));
        assert_eq!(timeline.landed_at("main", "a"), Some(at(6)));
        assert_eq!(timeline.reachable_at("main", "a"), Some(at(6)));
    }

    #[test]
    fn test_non_origin_occurrence_uses_pull_request_creation() {
        let prs = vec![
            pr("11", "main", "develop", 10, Some(12), vec![Commit::new("a", at(2))]),
            pr("10", "develop", "feature", 4, Some(5), vec![Commit::new("a", at(2))]),
        ];
        let origins = resolve_origins(&prs);
        assert!(origins.is_origin("a", "10"));

        let timeline = reconstruct_timeline(&prs, &origins);

        assert_eq!(timeline.first_seen("feature", "a"), Some(at(2)));
        assert_eq!(timeline.first_seen("develop", "a"), Some(at(10)));
        // develop is both a merge target (day 5) and a merge source (day 10)
        assert_eq!(timeline.reachable_at("develop", "a"), Some(at(5)));
        assert_eq!(timeline.landed_at("main", "a"), Some(at(12)));
    }

    #[test]
    fn test_unmerged_pull_request_does_not_land() {
        let prs = vec![pr("1", "main", "feature", 3, None, vec![Commit::new("a", at(1))])];
        let origins = resolve_origins(&prs);

        let timeline = reconstruct_timeline(&prs, &origins);

        assert_eq!(timeline.landed_at("main", "a"), None);
        assert!(timeline.landed_on("main").is_none());
        assert_eq!(timeline.first_seen("feature", "a"), Some(at(1)));
    }

    #[test]
    fn test_keeps_minimum_across_pull_requests() {
        let prs = vec![
            pr("1", "main", "f1", 8, Some(9), vec![Commit::sha_only("a")]),
            pr("2", "main", "f2", 3, Some(4), vec![Commit::sha_only("a")]),
        ];
        let origins = resolve_origins(&prs);

        let timeline = reconstruct_timeline(&prs, &origins);

        assert_eq!(timeline.landed_at("main", "a"), Some(at(4)));
        assert_eq!(timeline.refs().collect::<Vec<_>>(), vec!["f1", "f2", "main"]);
    }

    #[test]
    fn test_origin_without_commit_time_falls_back_to_pull_request() {
        let prs = vec![pr("1", "main", "feature", 3, None, vec![Commit::sha_only("a")])];
        let origins = resolve_origins(&prs);

        let timeline = reconstruct_timeline(&prs, &origins);

        assert_eq!(timeline.first_seen("feature", "a"), Some(at(3)));
    }

    #[test]
    fn test_empty_input_yields_empty_timeline() {
        let timeline = reconstruct_timeline(&[], &OriginMap::default());
        assert!(timeline.is_empty());
    }
}
