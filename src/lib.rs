//! # delivery-metrics
//!
//! Mines repository activity (issues, commits, pull requests, deployments,
//! environments) from code-hosting APIs and derives software delivery
//! performance metrics per repository.
//!
//! ## Usage
//!
//! ```bash
//! delivery-metrics [-c config.yml] [run | ingest | aggregate [--adapter NAME] | report]
//! ```
//!
//! ## Modules
//!
//! - `domain` - Repository activity entities
//! - `lineage` - Commit origin resolution and per-ref timelines
//! - `metrics` - Deployment frequency, lead time, change failure rate, time to restore
//! - `storage` - Persistence traits with file and in-memory backends
//! - `ingest` - Source API clients and the concurrent scraper
//! - `aggregation` - Per-adapter orchestration of the calculators
//! - `pipeline` - Ingest-then-aggregate runs
//! - `config` - YAML configuration with environment overrides
pub mod aggregation;
pub mod config;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod lineage;
pub mod metrics;
pub mod pipeline;
pub mod storage;


pub use error::{Error, Result};
