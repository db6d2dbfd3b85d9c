//! Per-user gauge publishing.
//!
//! Every scrape runs a full snapshot → aggregate → emit pass. Nothing is
//! cached between scrapes: each pass builds its own `Registry` from the
//! shared, immutable [`UserDescriptors`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use prometheus::proto::MetricFamily;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tracing::debug;

use crate::collector::{QueueSource, SnapshotError, UserJobMetrics, parse_snapshot};

/// Label carrying the job owner on every series.
pub const USER_LABEL: &str = "user";

/// The five per-user gauges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserGauge {
    JobsPending,
    JobsRunning,
    CpusRunning,
    JobsSuspended,
    GpusRunning,
}

impl UserGauge {
    pub const ALL: [UserGauge; 5] = [
        UserGauge::JobsPending,
        UserGauge::JobsRunning,
        UserGauge::CpusRunning,
        UserGauge::JobsSuspended,
        UserGauge::GpusRunning,
    ];

    pub fn name(self) -> &'static str {
        match self {
            UserGauge::JobsPending => "slurm_user_jobs_pending",
            UserGauge::JobsRunning => "slurm_user_jobs_running",
            UserGauge::CpusRunning => "slurm_user_cpus_running",
            UserGauge::JobsSuspended => "slurm_user_jobs_suspended",
            UserGauge::GpusRunning => "slurm_user_gpus_running",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            UserGauge::JobsPending => "Pending jobs for user",
            UserGauge::JobsRunning => "Running jobs for user",
            UserGauge::CpusRunning => "Running cpus for user",
            UserGauge::JobsSuspended => "Suspended jobs for user",
            UserGauge::GpusRunning => "Running gpus for user",
        }
    }

    /// Reads this gauge's counter from a user's aggregate.
    pub fn value(self, metrics: &UserJobMetrics) -> f64 {
        match self {
            UserGauge::JobsPending => metrics.pending,
            UserGauge::JobsRunning => metrics.running,
            UserGauge::CpusRunning => metrics.running_cpus,
            UserGauge::JobsSuspended => metrics.suspended,
            UserGauge::GpusRunning => metrics.running_gpus,
        }
    }
}

/// Metric descriptors, built once at startup and shared by every scrape.
#[derive(Debug, Clone)]
pub struct UserDescriptors {
    descriptors: Vec<(UserGauge, Opts)>,
}

impl UserDescriptors {
    pub fn new() -> Self {
        let descriptors = UserGauge::ALL
            .into_iter()
            .map(|gauge| (gauge, Opts::new(gauge.name(), gauge.help())))
            .collect();
        Self { descriptors }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(UserGauge, Opts)> {
        self.descriptors.iter()
    }
}

impl Default for UserDescriptors {
    fn default() -> Self {
        Self::new()
    }
}

/// Error that fails a whole scrape.
#[derive(Debug)]
pub enum ScrapeError {
    /// The queue snapshot could not be taken.
    Snapshot(SnapshotError),
    /// Building or encoding the metric families failed.
    Metrics(prometheus::Error),
}

impl std::fmt::Display for ScrapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScrapeError::Snapshot(e) => write!(f, "snapshot failed: {}", e),
            ScrapeError::Metrics(e) => write!(f, "metrics error: {}", e),
        }
    }
}

impl std::error::Error for ScrapeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScrapeError::Snapshot(e) => Some(e),
            ScrapeError::Metrics(e) => Some(e),
        }
    }
}

impl From<SnapshotError> for ScrapeError {
    fn from(e: SnapshotError) -> Self {
        ScrapeError::Snapshot(e)
    }
}

impl From<prometheus::Error> for ScrapeError {
    fn from(e: prometheus::Error) -> Self {
        ScrapeError::Metrics(e)
    }
}

/// Builds the metric families for one aggregation result.
///
/// Only strictly positive counters produce a sample. Gauges with no samples
/// are left out of the result entirely.
pub fn build_families(
    descriptors: &UserDescriptors,
    users: &HashMap<String, UserJobMetrics>,
) -> Result<Vec<MetricFamily>, prometheus::Error> {
    let registry = Registry::new();

    for (gauge, opts) in descriptors.iter() {
        let vec = GaugeVec::new(opts.clone(), &[USER_LABEL])?;
        for (user, metrics) in users {
            let value = gauge.value(metrics);
            if value > 0.0 {
                vec.with_label_values(&[user.as_str()]).set(value);
            }
        }
        registry.register(Box::new(vec))?;
    }

    Ok(registry.gather())
}

/// Runs scrape passes against a queue source.
pub struct UsersPublisher {
    source: Box<dyn QueueSource>,
    descriptors: Arc<UserDescriptors>,
}

impl UsersPublisher {
    pub fn new(source: Box<dyn QueueSource>, descriptors: Arc<UserDescriptors>) -> Self {
        Self {
            source,
            descriptors,
        }
    }

    /// Runs one full pass and returns the resulting metric families.
    ///
    /// Blocks while the queue command runs.
    pub fn gather(&self) -> Result<Vec<MetricFamily>, ScrapeError> {
        let t0 = Instant::now();
        let raw = self.source.snapshot()?;
        let users = parse_snapshot(&raw);
        let families = build_families(&self.descriptors, &users)?;

        debug!(
            users = users.len(),
            families = families.len(),
            duration_ms = t0.elapsed().as_millis() as u64,
            "scrape completed"
        );
        Ok(families)
    }

    /// Runs one full pass and encodes it in the Prometheus text format.
    pub fn render(&self) -> Result<Vec<u8>, ScrapeError> {
        let families = self.gather()?;
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(buffer)
    }
}
