//! Access logging middleware.
//!
//! Prometheus scrapes the metrics path every few seconds, so successful
//! scrapes are logged at debug. Everything else is logged at info, and server
//! errors at warn.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{Level, debug, info, warn};

/// Picks the level of the access line for a finished request.
pub(crate) fn log_level(path: &str, metrics_path: &str, status: StatusCode) -> Level {
    if status.is_server_error() {
        Level::WARN
    } else if path == metrics_path && status.is_success() {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

pub(crate) async fn access_log(
    State(metrics_path): State<Arc<str>>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let client = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "-".to_owned());
    let t0 = Instant::now();

    let response = next.run(req).await;

    let latency_ms = t0.elapsed().as_millis() as u64;
    let status = response.status();
    let code = status.as_u16();
    match log_level(&path, &metrics_path, status) {
        Level::DEBUG => debug!(client, status = code, latency_ms, "{method} {path}"),
        Level::WARN => warn!(client, status = code, latency_ms, "{method} {path}"),
        _ => info!(client, status = code, latency_ms, "{method} {path}"),
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successful_scrape_is_debug() {
        assert_eq!(log_level("/metrics", "/metrics", StatusCode::OK), Level::DEBUG);
        assert_eq!(
            log_level("/slurm/users", "/slurm/users", StatusCode::OK),
            Level::DEBUG
        );
    }

    #[test]
    fn test_failed_scrape_is_warn() {
        assert_eq!(
            log_level("/metrics", "/metrics", StatusCode::INTERNAL_SERVER_ERROR),
            Level::WARN
        );
    }

    #[test]
    fn test_other_paths_are_info() {
        assert_eq!(log_level("/", "/metrics", StatusCode::OK), Level::INFO);
        assert_eq!(log_level("/health", "/metrics", StatusCode::OK), Level::INFO);
        assert_eq!(log_level("/nope", "/metrics", StatusCode::NOT_FOUND), Level::INFO);
        // Scrapes of a path that is not the configured one are not routine.
        assert_eq!(log_level("/metrics", "/users", StatusCode::NOT_FOUND), Level::INFO);
    }
}
