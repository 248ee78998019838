//! Lead time for change

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::BTreeMap;
use tracing::warn;

use crate::domain::Issue;

/// Issue id -> lead time; `None` marks a closing time before creation
pub type LeadTimes = BTreeMap<String, Option<TimeDelta>>;

/// Elapsed time from creation to resolution (or `now`) for every feature issue.
///
/// Issues typed `Bug` are excluded; untyped issues count as feature work.
pub fn lead_time_for_change(issues: &[Issue], now: DateTime<Utc>) -> LeadTimes {
    issues
        .iter()
        .filter(|issue| issue.is_change_request())
        .map(|issue| {
            let elapsed = issue.work_item.elapsed(now);
            if elapsed < TimeDelta::zero() {
                warn!(
                    "Issue {} was closed before it was created, lead time left empty",
                    issue.id()
                );
                (issue.id().to_string(), None)
            } else {
                (issue.id().to_string(), Some(elapsed))
            }
        })
        .collect()
}
