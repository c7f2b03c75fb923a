//! Integration tests for the API server.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use run_store::InMemoryRunStore;
use tower::ServiceExt;

use std::sync::OnceLock;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> axum::Router {
    let state = api::create_default_state(InMemoryRunStore::new()).unwrap();
    api::create_app(state, get_metrics_handle())
}

fn setup_with_state() -> (
    axum::Router,
    Arc<api::routes::runs::AppState<InMemoryRunStore>>,
) {
    let state = api::create_default_state(InMemoryRunStore::new()).unwrap();
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state)
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Starts a run and returns its ID. The booking workflow suspends at
/// payment authorization.
async fn start_run(app: &axum::Router) -> String {
    let response = app
        .clone()
        .oneshot(post("/runs", serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = json_body(response).await;
    assert_eq!(json["status"], "awaiting_signal");
    json["run_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_start_run() {
    let app = setup();

    let response = app
        .oneshot(post("/runs", serde_json::json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = json_body(response).await;
    assert!(json["run_id"].as_str().is_some());
    assert_eq!(json["definition_id"], "booking_fulfillment");
    assert_eq!(json["status"], "awaiting_signal");
    assert_eq!(json["awaiting_signal"], "payment_completed");
    assert_eq!(json["current_activity_index"], 1);
    assert!(json["context"]["hold_id"].as_str().is_some());
}

#[tokio::test]
async fn test_start_run_with_subject_id() {
    let app = setup();
    let subject_id = uuid::Uuid::new_v4().to_string();

    let response = app
        .clone()
        .oneshot(post("/runs", serde_json::json!({ "subject_id": subject_id })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let lookup = app
        .oneshot(
            Request::builder()
                .uri(format!("/runs/by-subject/{subject_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(lookup.status(), StatusCode::OK);
    let json = json_body(lookup).await;
    assert_eq!(json["subject_id"], subject_id);
}

#[tokio::test]
async fn test_start_run_with_invalid_subject_id() {
    let app = setup();

    let response = app
        .oneshot(post("/runs", serde_json::json!({ "subject_id": "not-a-uuid" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_start_run_with_unknown_definition() {
    let app = setup();

    let response = app
        .oneshot(post("/runs", serde_json::json!({ "definition_id": "nope" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_run_status_includes_step_trace() {
    let app = setup();
    let run_id = start_run(&app).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/runs/{run_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["run_id"], run_id.as_str());
    assert_eq!(json["status"], "awaiting_signal");

    let steps = json["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0]["step_name"], "reserve_slot");
    assert_eq!(steps[1]["step_name"], "authorize_payment");
    assert_eq!(steps[1]["step_type"], "async");
    assert!(json["dead_letter"].is_null());
}

#[tokio::test]
async fn test_get_nonexistent_run() {
    let app = setup();
    let fake_id = uuid::Uuid::new_v4();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/runs/{fake_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_run_id_format() {
    let app = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/runs/not-a-uuid")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_signal_completes_the_run() {
    let app = setup();
    let run_id = start_run(&app).await;

    let response = app
        .clone()
        .oneshot(post(
            &format!("/runs/{run_id}/signal"),
            serde_json::json!({ "payload": { "payment_status": "captured" } }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "completed");
    assert_eq!(json["current_activity_index"], 4);
    assert_eq!(json["context"]["payment_status"], "captured");
    assert!(json["finished_at"].as_str().is_some());

    // A second signal conflicts: the run is no longer suspended.
    let response = app
        .oneshot(post(
            &format!("/runs/{run_id}/signal"),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_cancel_run() {
    let app = setup();
    let run_id = start_run(&app).await;

    let response = app
        .clone()
        .oneshot(post(&format!("/runs/{run_id}/cancel"), serde_json::json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "cancelled");

    let response = app
        .oneshot(post(&format!("/runs/{run_id}/cancel"), serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_pause_conflicts_while_awaiting_signal() {
    let app = setup();
    let run_id = start_run(&app).await;

    let response = app
        .oneshot(post(&format!("/runs/{run_id}/pause"), serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_retry_conflicts_for_completed_run() {
    let (app, _state) = setup_with_state();
    let run_id = start_run(&app).await;

    let response = app
        .clone()
        .oneshot(post(
            &format!("/runs/{run_id}/signal"),
            serde_json::json!({ "payload": { "payment_status": "captured" } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(post(&format!("/runs/{run_id}/retry"), serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_compensate_cancelled_run() {
    let app = setup();
    let run_id = start_run(&app).await;

    let response = app
        .clone()
        .oneshot(post(&format!("/runs/{run_id}/cancel"), serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(post(
            &format!("/runs/{run_id}/compensate"),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "cancelled");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();
    let _ = start_run(&app).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("workflow_runs_started_total"));
}
