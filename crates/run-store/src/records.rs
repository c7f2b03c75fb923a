//! Persisted records for workflow runs and their traces.

use chrono::{DateTime, Utc};
use common::{ContextEnvelope, RunId, SubjectId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::status::RunStatus;

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Constant delay of `initial_delay_ms` between attempts.
    Fixed,
    /// `initial_delay_ms * 2^retry_count`.
    #[default]
    Exponential,
}

/// Retry policy persisted with each run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub backoff: Backoff,
    pub initial_delay_ms: u64,
    pub max_retries: u32,
}

impl RetryPolicy {
    /// Exponential backoff policy.
    pub fn exponential(initial_delay_ms: u64, max_retries: u32) -> Self {
        Self {
            backoff: Backoff::Exponential,
            initial_delay_ms,
            max_retries,
        }
    }

    /// Fixed-delay policy.
    pub fn fixed(delay_ms: u64, max_retries: u32) -> Self {
        Self {
            backoff: Backoff::Fixed,
            initial_delay_ms: delay_ms,
            max_retries,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(2000, 3)
    }
}

/// One durable, resumable execution of a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: RunId,
    pub definition_id: String,
    pub subject_id: SubjectId,
    pub status: RunStatus,
    /// Index of the next activity to execute. Monotonically
    /// non-decreasing while the run is `running`.
    pub current_activity_index: usize,
    pub retry_count: u32,
    pub retry_policy: RetryPolicy,
    /// Compensation names of completed activities, push order. Unwound
    /// in reverse (LIFO) on terminal failure or cancellation.
    pub compensations_needed: Vec<String>,
    /// Set if and only if `status == awaiting_signal`.
    pub awaiting_signal: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub context: ContextEnvelope,
}

impl WorkflowRun {
    /// Creates a new run in the initial `running` status.
    pub fn new(
        definition_id: impl Into<String>,
        subject_id: SubjectId,
        retry_policy: RetryPolicy,
        context: ContextEnvelope,
    ) -> Self {
        Self {
            id: RunId::new(),
            definition_id: definition_id.into(),
            subject_id,
            status: RunStatus::Running,
            current_activity_index: 0,
            retry_count: 0,
            retry_policy,
            compensations_needed: Vec::new(),
            awaiting_signal: None,
            next_retry_at: None,
            started_at: Utc::now(),
            finished_at: None,
            last_error: None,
            context,
        }
    }

    /// Maximum retry budget from the persisted policy.
    pub fn max_retries(&self) -> u32 {
        self.retry_policy.max_retries
    }
}

/// Whether a logged step was synchronous or a signal-awaiting step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Sync,
    Async,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Sync => "sync",
            StepType::Async => "async",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sync" => Some(StepType::Sync),
            "async" => Some(StepType::Async),
            _ => None,
        }
    }
}

/// Outcome of one step attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(StepStatus::Completed),
            "failed" => Some(StepStatus::Failed),
            _ => None,
        }
    }
}

/// Append-only trace entry, one per activity attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepLog {
    pub run_id: RunId,
    pub step_name: String,
    pub step_type: StepType,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub output: Option<Value>,
    pub status: StepStatus,
    pub error_message: Option<String>,
}

impl StepLog {
    /// A completed attempt with its output.
    pub fn completed(
        run_id: RunId,
        step_name: impl Into<String>,
        step_type: StepType,
        started_at: DateTime<Utc>,
        output: Value,
    ) -> Self {
        Self {
            run_id,
            step_name: step_name.into(),
            step_type,
            started_at,
            finished_at: Some(Utc::now()),
            output: Some(output),
            status: StepStatus::Completed,
            error_message: None,
        }
    }

    /// A failed attempt with its error message.
    pub fn failed(
        run_id: RunId,
        step_name: impl Into<String>,
        step_type: StepType,
        started_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            run_id,
            step_name: step_name.into(),
            step_type,
            started_at,
            finished_at: Some(Utc::now()),
            output: None,
            status: StepStatus::Failed,
            error_message: Some(error.into()),
        }
    }
}

/// An external signal delivered to a suspended run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub run_id: RunId,
    pub signal_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Signal {
    /// A signal recorded at the moment it is applied to a run.
    pub fn processed(run_id: RunId, signal_type: impl Into<String>, payload: Value) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            signal_type: signal_type.into(),
            payload,
            created_at: now,
            processed_at: Some(now),
        }
    }
}

/// Operator action that resolved a dead-letter entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    Retry,
    Cancel,
}

impl ResolutionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionAction::Retry => "retry",
            ResolutionAction::Cancel => "cancel",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "retry" => Some(ResolutionAction::Retry),
            "cancel" => Some(ResolutionAction::Cancel),
            _ => None,
        }
    }
}

/// Terminal failure record awaiting operator intervention.
///
/// A run has at most one unresolved entry at any time; the store
/// enforces this on insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub run_id: RunId,
    pub failure_reason: String,
    pub last_error: String,
    pub retry_count_at_failure: u32,
    pub can_retry: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_action: Option<ResolutionAction>,
}

impl DeadLetterEntry {
    pub fn new(
        run_id: RunId,
        failure_reason: impl Into<String>,
        last_error: impl Into<String>,
        retry_count_at_failure: u32,
        can_retry: bool,
    ) -> Self {
        Self {
            run_id,
            failure_reason: failure_reason.into(),
            last_error: last_error.into(),
            retry_count_at_failure,
            can_retry,
            created_at: Utc::now(),
            resolved_at: None,
            resolution_action: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

/// Outcome of one compensation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationStatus {
    Completed,
    Failed,
}

impl CompensationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompensationStatus::Completed => "completed",
            CompensationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(CompensationStatus::Completed),
            "failed" => Some(CompensationStatus::Failed),
            _ => None,
        }
    }
}

/// One best-effort compensation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationRecord {
    pub run_id: RunId,
    pub activity_name: String,
    pub status: CompensationStatus,
    pub executed_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl CompensationRecord {
    pub fn completed(run_id: RunId, activity_name: impl Into<String>) -> Self {
        Self {
            run_id,
            activity_name: activity_name.into(),
            status: CompensationStatus::Completed,
            executed_at: Utc::now(),
            error_message: None,
        }
    }

    pub fn failed(
        run_id: RunId,
        activity_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            run_id,
            activity_name: activity_name.into(),
            status: CompensationStatus::Failed,
            executed_at: Utc::now(),
            error_message: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_run_starts_running_at_index_zero() {
        let run = WorkflowRun::new(
            "booking_fulfillment",
            SubjectId::new(),
            RetryPolicy::default(),
            ContextEnvelope::empty(),
        );
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.current_activity_index, 0);
        assert_eq!(run.retry_count, 0);
        assert!(run.compensations_needed.is_empty());
        assert!(run.awaiting_signal.is_none());
        assert!(run.finished_at.is_none());
    }

    #[test]
    fn step_log_constructors() {
        let run_id = RunId::new();
        let started = Utc::now();

        let ok = StepLog::completed(run_id, "reserve_slot", StepType::Sync, started, json!({}));
        assert_eq!(ok.status, StepStatus::Completed);
        assert!(ok.finished_at.is_some());
        assert!(ok.error_message.is_none());

        let bad = StepLog::failed(run_id, "reserve_slot", StepType::Sync, started, "boom");
        assert_eq!(bad.status, StepStatus::Failed);
        assert!(bad.output.is_none());
        assert_eq!(bad.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn processed_signal_has_processed_at() {
        let signal = Signal::processed(RunId::new(), "payment_completed", json!({"paid": true}));
        assert!(signal.processed_at.is_some());
    }

    #[test]
    fn dead_letter_entry_starts_unresolved() {
        let entry = DeadLetterEntry::new(RunId::new(), "retries_exhausted", "timeout", 3, true);
        assert!(!entry.is_resolved());
        assert!(entry.can_retry);
    }

    #[test]
    fn run_serialization_roundtrip() {
        let mut run = WorkflowRun::new(
            "booking_fulfillment",
            SubjectId::new(),
            RetryPolicy::fixed(500, 2),
            ContextEnvelope::new(json!({"subject": "x"})),
        );
        run.compensations_needed.push("release_slot".to_string());
        run.status = RunStatus::AwaitingSignal;
        run.awaiting_signal = Some("payment_completed".to_string());

        let json = serde_json::to_string(&run).unwrap();
        let back: WorkflowRun = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, run.id);
        assert_eq!(back.status, RunStatus::AwaitingSignal);
        assert_eq!(back.compensations_needed, vec!["release_slot"]);
        assert_eq!(back.retry_policy, run.retry_policy);
    }
}
