//! Ingest-then-aggregate pass over the configured adapters

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::aggregation::{AggregationReport, Aggregator};
use crate::config::Config;
use crate::ingest::{IngestReport, Scraper};
use crate::storage::StorageHandles;

/// Everything one full run did
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub ingest: IngestReport,
    pub aggregations: Vec<AggregationReport>,
}

impl RunReport {
    pub fn failure_count(&self) -> usize {
        self.ingest.failed.len()
            + self
                .aggregations
                .iter()
                .map(|report| report.failures().count())
                .sum::<usize>()
    }
}

/// Fetch every configured repository; returns after all of them finished
pub async fn ingest(config: &Config, scraper: &Scraper) -> IngestReport {
    info!("Ingesting {} repositories", config.repositories.len());
    let report = scraper.ingest(&config.repositories).await;
    if !report.is_success() {
        warn!("{} repositories failed to ingest", report.failed.len());
    }
    report
}

/// Aggregate one adapter, or every configured adapter when none is named
///
/// An adapter whose repositories cannot be listed is reported as failed and the
/// remaining adapters still run.
pub async fn aggregate(
    config: &Config,
    storage: &StorageHandles,
    adapter: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Vec<AggregationReport>> {
    let adapters: Vec<&str> = match adapter {
        Some(name) => match config.find_adapter(name) {
            Some(found) => vec![found.name.as_str()],
            None => bail!("adapter '{name}' is not configured"),
        },
        None => config.adapter_names(),
    };

    let aggregator = Aggregator::new(storage.entities.clone(), storage.metrics.clone())
        .with_concurrency(config.aggregation.concurrency);

    let mut reports = Vec::with_capacity(adapters.len());
    for adapter in adapters {
        let report = match aggregator.aggregate_at(adapter, now).await {
            Ok(report) => report,
            Err(e) => {
                error!("Failed to list repositories for adapter {}: {}", adapter, e);
                AggregationReport::listing_failed(adapter, now, &e)
            }
        };
        reports.push(report);
    }
    Ok(reports)
}

/// Ingest, wait for every repository, then aggregate every adapter
pub async fn run(config: &Config, storage: &StorageHandles, scraper: &Scraper) -> Result<RunReport> {
    let ingest = ingest(config, scraper).await;
    let aggregations = aggregate(config, storage, None, Utc::now()).await?;
    Ok(RunReport {
        ingest,
        aggregations,
    })
}
