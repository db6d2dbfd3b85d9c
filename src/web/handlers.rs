//! HTTP request handlers: scrape endpoint, health check and landing page.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use tracing::error;

use crate::web::{AppState, FailurePolicy};

// ============================================================
// Metrics
// ============================================================

pub(crate) async fn handle_metrics(State(state): State<AppState>) -> Response {
    let publisher = state.publisher.clone();
    // squeue blocks until it exits, keep it off the async workers
    let result = tokio::task::spawn_blocking(move || publisher.render()).await;

    match result {
        Ok(Ok(body)) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "scrape failed");
            abort(&state.on_failure, e.to_string());
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("scrape failed: {}\n", e),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "scrape panicked in spawn_blocking");
            abort(&state.on_failure, e.to_string());
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn abort(policy: &FailurePolicy, reason: String) {
    if let FailurePolicy::Abort(tx) = policy {
        // Closed once shutdown is already under way.
        let _ = tx.send(reason);
    }
}

// ============================================================
// Health
// ============================================================

pub(crate) async fn handle_health() -> &'static str {
    "ok"
}

// ============================================================
// Landing page
// ============================================================

pub(crate) async fn handle_index(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>\n\
         <head><title>Slurm User Exporter</title></head>\n\
         <body>\n\
         <h1>Slurm User Exporter</h1>\n\
         <p><a href=\"{path}\">Metrics</a></p>\n\
         </body>\n\
         </html>\n",
        path = state.metrics_path
    ))
}
