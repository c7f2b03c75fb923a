//! Workflow run lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{RunId, SubjectId};
use engine::{RunView, WorkflowEngine};
use run_store::{DeadLetterEntry, RunStore, StepLog, WorkflowRun};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: RunStore> {
    pub engine: Arc<WorkflowEngine<S>>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct StartRunRequest {
    /// Defaults to the booking fulfillment workflow.
    pub definition_id: Option<String>,
    /// Defaults to a fresh subject.
    pub subject_id: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct SignalRequest {
    /// Merged into the run context before execution continues.
    pub payload: Option<Value>,
}

// -- Response types --

#[derive(Serialize)]
pub struct RunResponse {
    pub run_id: String,
    pub definition_id: String,
    pub subject_id: String,
    pub status: String,
    pub current_activity_index: usize,
    pub retry_count: u32,
    pub compensations_needed: Vec<String>,
    pub awaiting_signal: Option<String>,
    pub next_retry_at: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub last_error: Option<String>,
    pub context: Value,
}

impl From<WorkflowRun> for RunResponse {
    fn from(run: WorkflowRun) -> Self {
        Self {
            run_id: run.id.to_string(),
            definition_id: run.definition_id,
            subject_id: run.subject_id.to_string(),
            status: run.status.as_str().to_string(),
            current_activity_index: run.current_activity_index,
            retry_count: run.retry_count,
            compensations_needed: run.compensations_needed,
            awaiting_signal: run.awaiting_signal,
            next_retry_at: run.next_retry_at.map(|t| t.to_rfc3339()),
            started_at: run.started_at.to_rfc3339(),
            finished_at: run.finished_at.map(|t| t.to_rfc3339()),
            last_error: run.last_error,
            context: run.context.payload,
        }
    }
}

#[derive(Serialize)]
pub struct StepLogResponse {
    pub step_name: String,
    pub step_type: String,
    pub status: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub output: Option<Value>,
    pub error_message: Option<String>,
}

impl From<StepLog> for StepLogResponse {
    fn from(log: StepLog) -> Self {
        Self {
            step_name: log.step_name,
            step_type: log.step_type.as_str().to_string(),
            status: log.status.as_str().to_string(),
            started_at: log.started_at.to_rfc3339(),
            finished_at: log.finished_at.map(|t| t.to_rfc3339()),
            output: log.output,
            error_message: log.error_message,
        }
    }
}

#[derive(Serialize)]
pub struct DeadLetterResponse {
    pub failure_reason: String,
    pub last_error: String,
    pub retry_count_at_failure: u32,
    pub can_retry: bool,
    pub created_at: String,
}

impl From<DeadLetterEntry> for DeadLetterResponse {
    fn from(entry: DeadLetterEntry) -> Self {
        Self {
            failure_reason: entry.failure_reason,
            last_error: entry.last_error,
            retry_count_at_failure: entry.retry_count_at_failure,
            can_retry: entry.can_retry,
            created_at: entry.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct RunStatusResponse {
    #[serde(flatten)]
    pub run: RunResponse,
    pub steps: Vec<StepLogResponse>,
    pub dead_letter: Option<DeadLetterResponse>,
}

impl From<RunView> for RunStatusResponse {
    fn from(view: RunView) -> Self {
        Self {
            run: view.run.into(),
            steps: view.step_logs.into_iter().map(Into::into).collect(),
            dead_letter: view.dead_letter.map(Into::into),
        }
    }
}

// -- Handlers --

/// POST /runs — start a workflow run for a subject.
#[tracing::instrument(skip(state, req))]
pub async fn start<S: RunStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<StartRunRequest>,
) -> Result<(axum::http::StatusCode, Json<RunResponse>), ApiError> {
    let subject_id = match &req.subject_id {
        Some(raw) => {
            let uuid = uuid::Uuid::parse_str(raw)
                .map_err(|e| ApiError::BadRequest(format!("Invalid subject_id: {e}")))?;
            SubjectId::from_uuid(uuid)
        }
        None => SubjectId::new(),
    };
    let definition_id = req
        .definition_id
        .as_deref()
        .unwrap_or(booking::DEFINITION_ID);

    let run = state.engine.start(definition_id, subject_id).await?;
    Ok((axum::http::StatusCode::CREATED, Json(run.into())))
}

/// GET /runs/:id — run status with step trace and dead-letter info.
#[tracing::instrument(skip(state))]
pub async fn get<S: RunStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<RunStatusResponse>, ApiError> {
    let run_id = parse_run_id(&id)?;
    let view = state.engine.get_status(run_id).await?;
    Ok(Json(view.into()))
}

/// GET /runs/by-subject/:id — latest run for a business subject.
#[tracing::instrument(skip(state))]
pub async fn get_by_subject<S: RunStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<RunStatusResponse>, ApiError> {
    let uuid = uuid::Uuid::parse_str(&id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid subject_id: {e}")))?;
    let view = state
        .engine
        .get_status_by_subject(SubjectId::from_uuid(uuid))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No run for subject {id}")))?;
    Ok(Json(view.into()))
}

/// POST /runs/:id/signal — deliver an external signal to a suspended
/// run.
#[tracing::instrument(skip(state, req))]
pub async fn signal<S: RunStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<SignalRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let run_id = parse_run_id(&id)?;
    let payload = req.payload.unwrap_or_else(|| Value::Object(Default::default()));
    let run = state.engine.resume(run_id, payload).await?;
    Ok(Json(run.into()))
}

/// POST /runs/:id/retry — force an immediate retry of a waiting or
/// dead-lettered run.
#[tracing::instrument(skip(state))]
pub async fn retry<S: RunStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<RunResponse>, ApiError> {
    let run_id = parse_run_id(&id)?;
    let run = state.engine.retry_now(run_id).await?;
    Ok(Json(run.into()))
}

/// POST /runs/:id/cancel — cancel a run and unwind its compensations.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: RunStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<RunResponse>, ApiError> {
    let run_id = parse_run_id(&id)?;
    let run = state.engine.cancel(run_id).await?;
    Ok(Json(run.into()))
}

/// POST /runs/:id/pause — place an operator hold on a run.
#[tracing::instrument(skip(state))]
pub async fn pause<S: RunStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<RunResponse>, ApiError> {
    let run_id = parse_run_id(&id)?;
    let run = state.engine.pause(run_id).await?;
    Ok(Json(run.into()))
}

/// POST /runs/:id/unpause — release an operator hold.
#[tracing::instrument(skip(state))]
pub async fn unpause<S: RunStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<RunResponse>, ApiError> {
    let run_id = parse_run_id(&id)?;
    let run = state.engine.unpause(run_id).await?;
    Ok(Json(run.into()))
}

/// POST /runs/:id/compensate — manually re-run the compensation stack.
#[tracing::instrument(skip(state))]
pub async fn compensate<S: RunStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<RunResponse>, ApiError> {
    let run_id = parse_run_id(&id)?;
    let run = state.engine.compensate(run_id).await?;
    Ok(Json(run.into()))
}

fn parse_run_id(id: &str) -> Result<RunId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid run ID format: {e}")))?;
    Ok(RunId::from(uuid))
}
