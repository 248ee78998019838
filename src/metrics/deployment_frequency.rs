//! Deployments per calendar day

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::domain::Deployment;

/// Deployment count per UTC day, ordered by date
pub type DeploymentFrequency = BTreeMap<NaiveDate, u32>;

/// Count deployments per day, with explicit zeros for every day between the
/// first and last deployment.
pub fn deployment_frequency(deployments: &[Deployment]) -> DeploymentFrequency {
    let mut counts = DeploymentFrequency::new();
    for deployment in deployments {
        *counts.entry(deployment.created_at.date_naive()).or_insert(0) += 1;
    }

    let (Some(&first), Some(&last)) = (counts.keys().next(), counts.keys().next_back()) else {
        return counts;
    };

    for day in first.iter_days().take_while(|day| *day <= last) {
        counts.entry(day).or_insert(0);
    }
    counts
}
