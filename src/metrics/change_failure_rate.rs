//! Change failure rate

use crate::domain::Issue;

/// Share of classified issues that are bugs, in `[0, 1]`.
///
/// Unclassified issues are ignored; with no classified issues the rate is 0.
pub fn change_failure_rate(issues: &[Issue]) -> f64 {
    let (typed, bugs) = issues
        .iter()
        .filter(|issue| issue.issue_type.is_some())
        .fold((0usize, 0usize), |(typed, bugs), issue| {
            (typed + 1, bugs + usize::from(issue.is_bug()))
        });

    if typed == 0 {
        0.0
    } else {
        bugs as f64 / typed as f64
    }
}
