use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{RunId, SubjectId};

use crate::Result;
use crate::records::{
    CompensationRecord, DeadLetterEntry, ResolutionAction, Signal, StepLog, WorkflowRun,
};
use crate::status::RunStatus;

/// Core trait for run store implementations.
///
/// The run record is the unit of mutual exclusion: all mutations go
/// through [`RunStore::update_run`] with an expected status, and the
/// store rejects the write with
/// [`StoreError::ConcurrencyConflict`](crate::StoreError::ConcurrencyConflict)
/// when the persisted status differs. Trace records (step logs, signals,
/// compensation records) are append-only.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persists a newly created run.
    ///
    /// Fails with `DuplicateRun` if a run with the same ID exists.
    async fn insert_run(&self, run: &WorkflowRun) -> Result<()>;

    /// Loads a run by ID.
    async fn get_run(&self, run_id: RunId) -> Result<Option<WorkflowRun>>;

    /// Loads the most recently started run for a subject.
    async fn get_run_by_subject(&self, subject_id: SubjectId) -> Result<Option<WorkflowRun>>;

    /// Overwrites a run record if its persisted status equals
    /// `expected_status`; fails with `ConcurrencyConflict` otherwise.
    async fn update_run(&self, run: &WorkflowRun, expected_status: RunStatus) -> Result<()>;

    /// Appends one step attempt to the run's trace.
    async fn append_step_log(&self, log: &StepLog) -> Result<()>;

    /// Returns the run's step trace in append order.
    async fn get_step_logs(&self, run_id: RunId) -> Result<Vec<StepLog>>;

    /// Records a delivered signal.
    async fn record_signal(&self, signal: &Signal) -> Result<()>;

    /// Returns the signals delivered to a run in arrival order.
    async fn get_signals(&self, run_id: RunId) -> Result<Vec<Signal>>;

    /// Creates a dead-letter entry for a run.
    ///
    /// Fails with `UnresolvedDeadLetter` if the run already has an
    /// unresolved entry.
    async fn insert_dead_letter(&self, entry: &DeadLetterEntry) -> Result<()>;

    /// Returns the run's unresolved dead-letter entry, if any.
    async fn get_unresolved_dead_letter(&self, run_id: RunId) -> Result<Option<DeadLetterEntry>>;

    /// Marks the run's unresolved dead-letter entry as resolved.
    async fn resolve_dead_letter(&self, run_id: RunId, action: ResolutionAction) -> Result<()>;

    /// Appends one compensation attempt.
    async fn append_compensation_record(&self, record: &CompensationRecord) -> Result<()>;

    /// Returns the run's compensation attempts in execution order.
    async fn get_compensation_records(&self, run_id: RunId) -> Result<Vec<CompensationRecord>>;

    /// Returns runs in `retrying` status whose `next_retry_at` has
    /// passed. Consumed by the external retry scheduler, never by the
    /// engine itself.
    async fn due_for_retry(&self, now: DateTime<Utc>) -> Result<Vec<WorkflowRun>>;
}
