//! Time to restore service

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::BTreeMap;

use crate::domain::Issue;

/// Bug id -> time from report to resolution
pub type RestoreTimes = BTreeMap<String, TimeDelta>;

/// Elapsed time from creation to resolution (or `now`) for every bug
pub fn times_to_restore_service(issues: &[Issue], now: DateTime<Utc>) -> RestoreTimes {
    issues
        .iter()
        .filter(|issue| issue.is_bug())
        .map(|issue| (issue.id().to_string(), issue.work_item.elapsed(now)))
        .collect()
}
