//! Liveness endpoint for the orchestrator process.
//!
//! Reports only that the HTTP server is up. Run state has its own
//! status endpoints under `/runs`.

use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// GET /health
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
