//! Software delivery performance metrics
//!
//! Four independent calculators over one repository's loaded entities:
//!
//! - deployment frequency, from deployments
//! - lead time for change, from feature issues
//! - change failure rate, from classified issues
//! - time to restore service, from bugs
//!
//! None of them perform I/O, and all take the current time as an argument so
//! reruns over the same input are reproducible.

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

pub mod change_failure_rate;
pub mod deployment_frequency;
pub mod lead_time;
pub mod restore_time;

pub use change_failure_rate::change_failure_rate;
pub use deployment_frequency::{deployment_frequency, DeploymentFrequency};
pub use lead_time::{lead_time_for_change, LeadTimes};
pub use restore_time::{times_to_restore_service, RestoreTimes};

use crate::domain::RepositorySnapshot;

/// All four metrics computed for one repository
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryMetrics {
    pub deployment_frequency: DeploymentFrequency,
    pub lead_times: LeadTimes,
    pub change_failure_rate: f64,
    pub restore_times: RestoreTimes,
}

impl DeliveryMetrics {
    /// Run every calculator over a loaded repository
    pub fn calculate(snapshot: &RepositorySnapshot, now: DateTime<Utc>) -> Self {
        Self {
            deployment_frequency: deployment_frequency(&snapshot.deployments),
            lead_times: lead_time_for_change(&snapshot.issues, now),
            change_failure_rate: change_failure_rate(&snapshot.issues),
            restore_times: times_to_restore_service(&snapshot.issues, now),
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary::from_metrics(self)
    }
}

/// Headline figures derived from [`DeliveryMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_deployments: u32,
    pub deployment_days: usize,
    pub first_deployment: Option<NaiveDate>,
    pub last_deployment: Option<NaiveDate>,
    pub deployments_per_day: f64,
    pub lead_time_samples: usize,
    /// Issues whose lead time could not be measured
    pub invalid_lead_times: usize,
    #[serde(with = "optional_millis")]
    pub median_lead_time: Option<TimeDelta>,
    #[serde(with = "optional_millis")]
    pub mean_lead_time: Option<TimeDelta>,
    pub change_failure_rate: f64,
    pub restore_samples: usize,
    #[serde(with = "optional_millis")]
    pub mean_time_to_restore: Option<TimeDelta>,
}

impl MetricsSummary {
    pub fn from_metrics(metrics: &DeliveryMetrics) -> Self {
        let total_deployments: u32 = metrics.deployment_frequency.values().sum();
        let deployment_days = metrics.deployment_frequency.len();

        let mut lead_times: Vec<TimeDelta> = metrics.lead_times.values().flatten().copied().collect();
        lead_times.sort_unstable();
        let restore_times: Vec<TimeDelta> = metrics.restore_times.values().copied().collect();

        Self {
            total_deployments,
            deployment_days,
            first_deployment: metrics.deployment_frequency.keys().next().copied(),
            last_deployment: metrics.deployment_frequency.keys().next_back().copied(),
            deployments_per_day: if deployment_days == 0 {
                0.0
            } else {
                f64::from(total_deployments) / deployment_days as f64
            },
            lead_time_samples: lead_times.len(),
            invalid_lead_times: metrics.lead_times.len() - lead_times.len(),
            median_lead_time: median(&lead_times),
            mean_lead_time: mean(&lead_times),
            change_failure_rate: metrics.change_failure_rate,
            restore_samples: restore_times.len(),
            mean_time_to_restore: mean(&restore_times),
        }
    }
}

/// Median of an ascending slice; the lower middle element for even lengths
fn median(sorted: &[TimeDelta]) -> Option<TimeDelta> {
    if sorted.is_empty() {
        return None;
    }
    Some(sorted[(sorted.len() - 1) / 2])
}

fn mean(values: &[TimeDelta]) -> Option<TimeDelta> {
    if values.is_empty() {
        return None;
    }
    let total_ms: i64 = values.iter().map(TimeDelta::num_milliseconds).sum();
    Some(TimeDelta::milliseconds(total_ms / values.len() as i64))
}

/// Durations stored as whole milliseconds
pub mod optional_millis {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<TimeDelta>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(delta) => serializer.serialize_some(&delta.num_milliseconds()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<TimeDelta>, D::Error> {
        Ok(Option::<i64>::deserialize(deserializer)?.map(TimeDelta::milliseconds))
    }
}
