//! slurm-user-exporter - per-user Slurm job queue metrics for Prometheus.
//!
//! This library provides:
//! - `collector` - `squeue` snapshots and the per-user aggregation
//! - `publisher` - gauge descriptors and per-scrape metric emission
//! - `web` - the axum router serving the scrape endpoint

pub mod collector;
pub mod publisher;
pub mod web;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
