//! Persisted record shapes shared by the storage backends

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::Repository;
use crate::metrics::{DeploymentFrequency, LeadTimes, RestoreTimes};

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub backend_type: String,
    pub message: Option<String>,
}

/// A raw entity as stored, with its correction flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    #[serde(flatten)]
    pub value: T,
    /// Set by operators who fixed the record by hand; ingestion skips it
    #[serde(default)]
    pub manually_corrected: bool,
}

impl<T> Record<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            manually_corrected: false,
        }
    }
}

/// Keyed raw entities of one kind for one repository
pub type RecordMap<T> = BTreeMap<String, Record<T>>;

/// Upsert `items` into `records`, skipping manually corrected entries.
///
/// Returns the number of records written.
pub fn upsert_records<T: Clone>(
    records: &mut RecordMap<T>,
    items: &[T],
    key: impl Fn(&T) -> &str,
) -> usize {
    let mut written = 0;
    for item in items {
        let id = key(item);
        match records.get_mut(id) {
            Some(existing) if existing.manually_corrected => {}
            Some(existing) => {
                existing.value = item.clone();
                written += 1;
            }
            None => {
                records.insert(id.to_string(), Record::new(item.clone()));
                written += 1;
            }
        }
    }
    written
}

/// Values of a record map in key order
pub fn record_values<T: Clone>(records: &RecordMap<T>) -> Vec<T> {
    records.values().map(|r| r.value.clone()).collect()
}

/// All metrics persisted for one repository of one adapter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredMetrics {
    pub repository_id: String,
    pub repository_name: String,
    #[serde(default)]
    pub grouping_key: Option<String>,
    /// Deployments per day
    #[serde(default)]
    pub deployment_frequency: BTreeMap<NaiveDate, u32>,
    /// Issue id -> lead time in milliseconds, null when unmeasurable
    #[serde(default)]
    pub lead_times_ms: BTreeMap<String, Option<i64>>,
    #[serde(default)]
    pub change_failure_rate: Option<f64>,
    /// Bug id -> time to restore in milliseconds
    #[serde(default)]
    pub restore_times_ms: BTreeMap<String, i64>,
}

impl StoredMetrics {
    pub fn for_repository(repository: &Repository) -> Self {
        Self {
            repository_id: repository.id.clone(),
            repository_name: repository.full_name.clone(),
            grouping_key: repository.grouping_key.clone(),
            ..Default::default()
        }
    }

    /// Refresh the repository labels carried alongside the values
    pub fn label(&mut self, repository: &Repository) {
        self.repository_id = repository.id.clone();
        self.repository_name = repository.full_name.clone();
        self.grouping_key = repository.grouping_key.clone();
    }

    pub fn apply_deployment_frequency(&mut self, frequency: &DeploymentFrequency) {
        for (date, count) in frequency {
            self.deployment_frequency.insert(*date, *count);
        }
    }

    pub fn apply_lead_times(&mut self, lead_times: &LeadTimes) {
        for (issue_id, lead_time) in lead_times {
            // Negative durations are never stored.
            let millis = lead_time
                .map(|delta| delta.num_milliseconds())
                .filter(|ms| *ms >= 0);
            self.lead_times_ms.insert(issue_id.clone(), millis);
        }
    }

    pub fn apply_change_failure_rate(&mut self, rate: f64) {
        self.change_failure_rate = Some(rate);
    }

    pub fn apply_restore_times(&mut self, restore_times: &RestoreTimes) {
        for (issue_id, restore_time) in restore_times {
            self.restore_times_ms
                .insert(issue_id.clone(), restore_time.num_milliseconds());
        }
    }
}
