//! HTTP API server with observability for the workflow orchestrator.
//!
//! Provides REST endpoints for starting, signalling and operating
//! workflow runs, with structured logging (tracing) and Prometheus
//! metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod scheduler;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use run_store::RunStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::runs::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: RunStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/runs", post(routes::runs::start::<S>))
        .route("/runs/{id}", get(routes::runs::get::<S>))
        .route("/runs/{id}/signal", post(routes::runs::signal::<S>))
        .route("/runs/{id}/retry", post(routes::runs::retry::<S>))
        .route("/runs/{id}/cancel", post(routes::runs::cancel::<S>))
        .route("/runs/{id}/pause", post(routes::runs::pause::<S>))
        .route("/runs/{id}/unpause", post(routes::runs::unpause::<S>))
        .route("/runs/{id}/compensate", post(routes::runs::compensate::<S>))
        .route(
            "/runs/by-subject/{id}",
            get(routes::runs::get_by_subject::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the default application state: the booking fulfillment
/// workflow wired to in-memory services over the given run store.
pub fn create_default_state<S: RunStore + 'static>(
    store: S,
) -> Result<Arc<AppState<S>>, engine::EngineError> {
    let services = booking::BookingServices::in_memory();
    let engine = engine::WorkflowEngine::new(
        store,
        vec![booking::definition()],
        booking::registry(services),
    )?;

    Ok(Arc::new(AppState {
        engine: Arc::new(engine),
    }))
}
