//! slurm-user-exporter - Prometheus exporter for per-user Slurm queue statistics.
//!
//! Runs `squeue` on every scrape and publishes pending, running and suspended
//! job counts plus running CPU and GPU totals for each user.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

use slurm_user_exporter::collector::SqueueCommand;
use slurm_user_exporter::publisher::{UserDescriptors, UsersPublisher};
use slurm_user_exporter::web::{self, AppState, DEFAULT_METRICS_PATH, FailurePolicy};
use tokio::sync::mpsc;

// ============================================================
// CLI
// ============================================================

#[derive(Parser)]
#[command(
    name = "slurm-user-exporter",
    about = "Prometheus exporter for per-user Slurm job queue statistics",
    version = slurm_user_exporter::VERSION
)]
struct Args {
    /// Listen address.
    #[arg(long, default_value = "0.0.0.0:8080", env = "SLURM_USER_EXPORTER_LISTEN")]
    listen: SocketAddr,

    /// Path to the squeue binary.
    #[arg(long, default_value = "squeue", env = "SLURM_USER_EXPORTER_SQUEUE")]
    squeue: String,

    /// Kill squeue and fail the scrape if it runs longer than this many seconds.
    /// Unset means wait indefinitely.
    #[arg(long, value_name = "SECONDS", env = "SLURM_USER_EXPORTER_SQUEUE_TIMEOUT", value_parser = parse_timeout)]
    squeue_timeout: Option<Duration>,

    /// Path of the scrape endpoint.
    #[arg(
        long,
        default_value = DEFAULT_METRICS_PATH,
        env = "SLURM_USER_EXPORTER_METRICS_PATH",
        value_parser = web::parse_metrics_path
    )]
    metrics_path: String,

    /// Answer failed scrapes with HTTP 500 and keep running. By default the
    /// exporter logs the failure and exits with status 1.
    #[arg(long, env = "SLURM_USER_EXPORTER_KEEP_SERVING")]
    keep_serving_on_error: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Parses a positive number of seconds, fractions allowed ("2.5").
fn parse_timeout(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|e| format!("invalid timeout '{}': {}", s, e))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("timeout must be a positive number of seconds, got '{}'", s));
    }
    Ok(Duration::from_secs_f64(secs))
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env();
    let filter = match format!("slurm_user_exporter={}", level).parse::<Directive>() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

// ============================================================
// Main
// ============================================================

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            process::exit(1);
        }
    };
    runtime.block_on(async_main(args));
}

async fn async_main(args: Args) {
    info!(version = slurm_user_exporter::VERSION, "slurm-user-exporter starting");
    info!(
        squeue = %args.squeue,
        timeout = ?args.squeue_timeout,
        metrics_path = %args.metrics_path,
        keep_serving_on_error = args.keep_serving_on_error,
        "config"
    );

    let source = SqueueCommand::new(args.squeue).with_timeout(args.squeue_timeout);
    let descriptors = Arc::new(UserDescriptors::new());
    let publisher = Arc::new(UsersPublisher::new(Box::new(source), descriptors));

    let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
    let on_failure = if args.keep_serving_on_error {
        FailurePolicy::Continue
    } else {
        FailurePolicy::Abort(fatal_tx)
    };

    let app = web::router(AppState {
        publisher,
        metrics_path: Arc::from(args.metrics_path),
        on_failure,
    })
    .into_make_service_with_connect_info::<SocketAddr>();

    let listener = match tokio::net::TcpListener::bind(args.listen).await {
        Ok(l) => l,
        Err(e) => {
            error!(addr = %args.listen, error = %e, "failed to bind");
            process::exit(1);
        }
    };
    info!(addr = %args.listen, "listening");

    let failed = Arc::new(AtomicBool::new(false));
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown(fatal_rx, failed.clone()))
        .await
    {
        error!(error = %e, "server error");
        process::exit(1);
    }
    if failed.load(Ordering::SeqCst) {
        process::exit(1);
    }
    info!("shut down");
}

/// Resolves on a termination signal or on the first fatal scrape failure,
/// which is recorded in `failed`.
async fn shutdown(mut fatal_rx: mpsc::UnboundedReceiver<String>, failed: Arc<AtomicBool>) {
    tokio::select! {
        _ = shutdown_signal() => {},
        Some(reason) = fatal_rx.recv() => {
            error!(error = %reason, "queue collection failed, exiting");
            failed.store(true, Ordering::SeqCst);
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
