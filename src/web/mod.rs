//! HTTP scrape endpoint.

mod access_log;
mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::get;
use tokio::sync::mpsc::UnboundedSender;
use tower_http::compression::CompressionLayer;

use crate::publisher::UsersPublisher;

/// Default scrape path.
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

/// What a failed scrape does to the rest of the process.
#[derive(Clone, Debug)]
pub enum FailurePolicy {
    /// Answer 500, then hand the error to the receiver, which shuts the
    /// exporter down.
    Abort(UnboundedSender<String>),
    /// Answer 500 and keep serving.
    Continue,
}

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub publisher: Arc<UsersPublisher>,
    pub metrics_path: Arc<str>,
    pub on_failure: FailurePolicy,
}

/// Validates a user-supplied scrape path.
///
/// The path must be absolute and must not shadow the landing page or the
/// health check.
pub fn parse_metrics_path(s: &str) -> Result<String, String> {
    let path = s.trim();
    if !path.starts_with('/') {
        return Err(format!("metrics path '{}' must start with '/'", path));
    }
    if path == "/" || path == "/health" {
        return Err(format!("metrics path '{}' is reserved", path));
    }
    Ok(path.to_string())
}

/// Builds the exporter's router.
pub fn router(state: AppState) -> Router {
    let metrics_path = state.metrics_path.clone();
    Router::new()
        .route(&metrics_path, get(handlers::handle_metrics))
        .route("/health", get(handlers::handle_health))
        .route("/", get(handlers::handle_index))
        .with_state(state)
        .layer(middleware::from_fn_with_state(
            metrics_path,
            access_log::access_log,
        ))
        .layer(CompressionLayer::new())
}
