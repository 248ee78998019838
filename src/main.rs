use anyhow::{bail, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use delivery_metrics::aggregation::AggregationReport;
use delivery_metrics::config::{load_config, Config};
use delivery_metrics::ingest::{IngestReport, Scraper};
use delivery_metrics::pipeline;
use delivery_metrics::storage::{StorageFactory, StorageHandles, UnifiedStorage};
use std::path::PathBuf;
use tracing::{debug, error, trace, warn};

#[derive(Parser)]
#[command(name = "delivery-metrics")]
#[command(about = "Mine repository activity and derive software delivery metrics", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file [default: $DELIVERY_METRICS_CONFIG or config.yml]
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest every configured repository, then aggregate every adapter
    Run,
    /// Fetch repository activity into storage
    Ingest,
    /// Compute metrics from stored activity
    Aggregate {
        /// Only aggregate this adapter
        #[arg(short, long)]
        adapter: Option<String>,
    },
    /// Print stored metrics as JSON
    Report {
        /// Only report this adapter
        #[arg(short, long)]
        adapter: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        2 => "trace",
        _ => "trace,hyper=debug,reqwest=debug",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2)
        .with_thread_ids(cli.verbose >= 3)
        .with_line_number(cli.verbose >= 3)
        .init();

    debug!("delivery-metrics started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = execute(cli).await {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref()).await?;
    let storage = StorageFactory::from_config(&config.storage).await?;
    let health = storage.unified.health_check().await?;
    debug!(
        "Storage backend {} healthy: {}{}",
        health.backend_type,
        health.healthy,
        health.message.map(|m| format!(" ({m})")).unwrap_or_default()
    );
    if !health.healthy {
        warn!("Storage backend {} reports unhealthy", health.backend_type);
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let scraper = Scraper::from_config(&config, storage.entity_writer.clone())?;
            let report = pipeline::run(&config, &storage, &scraper).await?;
            print_ingest(&report.ingest);
            print_aggregations(&report.aggregations);
            fail_on(report.failure_count())
        }
        Commands::Ingest => {
            let scraper = Scraper::from_config(&config, storage.entity_writer.clone())?;
            let report = pipeline::ingest(&config, &scraper).await;
            print_ingest(&report);
            fail_on(report.failed.len())
        }
        Commands::Aggregate { adapter } => {
            let reports =
                pipeline::aggregate(&config, &storage, adapter.as_deref(), Utc::now()).await?;
            print_aggregations(&reports);
            fail_on(reports.iter().map(|r| r.failures().count()).sum())
        }
        Commands::Report { adapter } => report(&config, &storage, adapter.as_deref()).await,
    }
}

fn fail_on(failures: usize) -> Result<()> {
    if failures > 0 {
        bail!("{failures} step(s) failed, see the log for details");
    }
    Ok(())
}

fn print_ingest(report: &IngestReport) {
    println!(
        "Ingested {} repositories ({} failed)",
        report.succeeded.len(),
        report.failed.len()
    );
    for failure in &report.failed {
        println!(
            "  ❌ {}/{}: {}",
            failure.adapter, failure.repository_id, failure.error
        );
    }
}

fn print_aggregations(reports: &[AggregationReport]) {
    for report in reports {
        println!(
            "{}: {} repositories aggregated",
            report.adapter,
            report.repositories.len()
        );
        if let Some(failure) = &report.listing {
            println!("  ❌ {}: {}", failure.stage, failure.error);
        }
        for repo in &report.repositories {
            match &repo.summary {
                Some(summary) => println!(
                    "  {} - {} deployments over {} days, change failure rate {:.2}",
                    repo.repository_name,
                    summary.total_deployments,
                    summary.deployment_days,
                    summary.change_failure_rate
                ),
                None => println!("  {} - not loaded", repo.repository_name),
            }
            for failure in &repo.failures {
                println!("    ❌ {}: {}", failure.stage, failure.error);
            }
        }
    }
}

async fn report(config: &Config, storage: &StorageHandles, adapter: Option<&str>) -> Result<()> {
    let adapters: Vec<&str> = match adapter {
        Some(name) => match config.find_adapter(name) {
            Some(found) => vec![found.name.as_str()],
            None => bail!("adapter '{name}' is not configured"),
        },
        None => config.adapter_names(),
    };

    let mut stored = Vec::new();
    for adapter in adapters {
        for repository in storage.entities.list_repositories(adapter).await? {
            if let Some(metrics) = storage
                .metrics_reader
                .load_metrics(adapter, &repository.id)
                .await?
            {
                stored.push(serde_json::json!({ "adapter": adapter, "metrics": metrics }));
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&stored)?);
    Ok(())
}
