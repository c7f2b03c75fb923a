//! Prometheus scrape endpoint.
//!
//! The engine records run lifecycle counters (`workflow_runs_*`,
//! `workflow_retries_scheduled_total`, ...) against the global
//! recorder; this renders whatever the installed handle has gathered.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

/// GET /metrics
pub async fn render(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        handle.render(),
    )
}
