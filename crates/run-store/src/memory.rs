use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{RunId, SubjectId};
use tokio::sync::RwLock;

use crate::records::{
    CompensationRecord, DeadLetterEntry, ResolutionAction, Signal, StepLog, WorkflowRun,
};
use crate::status::RunStatus;
use crate::store::RunStore;
use crate::{Result, StoreError};

#[derive(Default)]
struct Inner {
    runs: HashMap<RunId, WorkflowRun>,
    step_logs: Vec<StepLog>,
    signals: Vec<Signal>,
    dead_letters: Vec<DeadLetterEntry>,
    compensations: Vec<CompensationRecord>,
}

/// In-memory run store implementation for tests and local development.
///
/// Provides the same interface and concurrency semantics as the
/// PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryRunStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryRunStore {
    /// Creates a new empty in-memory run store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of runs stored.
    pub async fn run_count(&self) -> usize {
        self.inner.read().await.runs.len()
    }

    /// Clears all records.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.runs.clear();
        inner.step_logs.clear();
        inner.signals.clear();
        inner.dead_letters.clear();
        inner.compensations.clear();
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn insert_run(&self, run: &WorkflowRun) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.runs.contains_key(&run.id) {
            return Err(StoreError::DuplicateRun(run.id));
        }
        inner.runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn get_run(&self, run_id: RunId) -> Result<Option<WorkflowRun>> {
        Ok(self.inner.read().await.runs.get(&run_id).cloned())
    }

    async fn get_run_by_subject(&self, subject_id: SubjectId) -> Result<Option<WorkflowRun>> {
        let inner = self.inner.read().await;
        Ok(inner
            .runs
            .values()
            .filter(|r| r.subject_id == subject_id)
            .max_by_key(|r| r.started_at)
            .cloned())
    }

    async fn update_run(&self, run: &WorkflowRun, expected_status: RunStatus) -> Result<()> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .runs
            .get_mut(&run.id)
            .ok_or(StoreError::RunNotFound(run.id))?;

        if stored.status != expected_status {
            return Err(StoreError::ConcurrencyConflict {
                run_id: run.id,
                expected: expected_status,
                actual: stored.status,
            });
        }

        *stored = run.clone();
        Ok(())
    }

    async fn append_step_log(&self, log: &StepLog) -> Result<()> {
        self.inner.write().await.step_logs.push(log.clone());
        Ok(())
    }

    async fn get_step_logs(&self, run_id: RunId) -> Result<Vec<StepLog>> {
        let inner = self.inner.read().await;
        Ok(inner
            .step_logs
            .iter()
            .filter(|l| l.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn record_signal(&self, signal: &Signal) -> Result<()> {
        self.inner.write().await.signals.push(signal.clone());
        Ok(())
    }

    async fn get_signals(&self, run_id: RunId) -> Result<Vec<Signal>> {
        let inner = self.inner.read().await;
        Ok(inner
            .signals
            .iter()
            .filter(|s| s.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn insert_dead_letter(&self, entry: &DeadLetterEntry) -> Result<()> {
        let mut inner = self.inner.write().await;
        let has_unresolved = inner
            .dead_letters
            .iter()
            .any(|e| e.run_id == entry.run_id && !e.is_resolved());
        if has_unresolved {
            return Err(StoreError::UnresolvedDeadLetter(entry.run_id));
        }
        inner.dead_letters.push(entry.clone());
        Ok(())
    }

    async fn get_unresolved_dead_letter(&self, run_id: RunId) -> Result<Option<DeadLetterEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .dead_letters
            .iter()
            .find(|e| e.run_id == run_id && !e.is_resolved())
            .cloned())
    }

    async fn resolve_dead_letter(&self, run_id: RunId, action: ResolutionAction) -> Result<()> {
        let mut inner = self.inner.write().await;
        for entry in inner.dead_letters.iter_mut() {
            if entry.run_id == run_id && !entry.is_resolved() {
                entry.resolved_at = Some(Utc::now());
                entry.resolution_action = Some(action);
            }
        }
        Ok(())
    }

    async fn append_compensation_record(&self, record: &CompensationRecord) -> Result<()> {
        self.inner.write().await.compensations.push(record.clone());
        Ok(())
    }

    async fn get_compensation_records(&self, run_id: RunId) -> Result<Vec<CompensationRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .compensations
            .iter()
            .filter(|c| c.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn due_for_retry(&self, now: DateTime<Utc>) -> Result<Vec<WorkflowRun>> {
        let inner = self.inner.read().await;
        let mut due: Vec<_> = inner
            .runs
            .values()
            .filter(|r| {
                r.status == RunStatus::Retrying
                    && r.next_retry_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|r| r.next_retry_at);
        Ok(due)
    }
}
