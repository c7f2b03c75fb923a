use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ContextEnvelope, RunId, SubjectId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::records::{
    CompensationRecord, CompensationStatus, DeadLetterEntry, ResolutionAction, RetryPolicy,
    Signal, StepLog, StepStatus, StepType, WorkflowRun,
};
use crate::status::RunStatus;
use crate::store::RunStore;
use crate::{Result, StoreError};

/// PostgreSQL-backed run store implementation.
#[derive(Clone)]
pub struct PostgresRunStore {
    pool: PgPool,
}

impl PostgresRunStore {
    /// Creates a new PostgreSQL run store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_run(row: PgRow) -> Result<WorkflowRun> {
        let run_id = RunId::from_uuid(row.try_get::<Uuid, _>("id")?);
        let corrupt = |message: &str| StoreError::CorruptRecord {
            run_id,
            message: message.to_string(),
        };

        let status_str: String = row.try_get("status")?;
        let status =
            RunStatus::parse(&status_str).ok_or_else(|| corrupt("unknown run status"))?;

        let retry_policy: RetryPolicy =
            serde_json::from_value(row.try_get::<serde_json::Value, _>("retry_policy")?)?;
        let compensations_needed: Vec<String> =
            serde_json::from_value(row.try_get::<serde_json::Value, _>("compensations_needed")?)?;
        let context: ContextEnvelope =
            serde_json::from_value(row.try_get::<serde_json::Value, _>("context")?)?;

        let index: i64 = row.try_get("current_activity_index")?;
        let retry_count: i32 = row.try_get("retry_count")?;

        Ok(WorkflowRun {
            id: run_id,
            definition_id: row.try_get("definition_id")?,
            subject_id: SubjectId::from_uuid(row.try_get::<Uuid, _>("subject_id")?),
            status,
            current_activity_index: usize::try_from(index)
                .map_err(|_| corrupt("negative activity index"))?,
            retry_count: u32::try_from(retry_count)
                .map_err(|_| corrupt("negative retry count"))?,
            retry_policy,
            compensations_needed,
            awaiting_signal: row.try_get("awaiting_signal")?,
            next_retry_at: row.try_get("next_retry_at")?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            last_error: row.try_get("last_error")?,
            context,
        })
    }

    fn row_to_step_log(row: PgRow) -> Result<StepLog> {
        let run_id = RunId::from_uuid(row.try_get::<Uuid, _>("run_id")?);
        let corrupt = |message: &str| StoreError::CorruptRecord {
            run_id,
            message: message.to_string(),
        };

        let step_type_str: String = row.try_get("step_type")?;
        let status_str: String = row.try_get("status")?;

        Ok(StepLog {
            run_id,
            step_name: row.try_get("step_name")?,
            step_type: StepType::parse(&step_type_str)
                .ok_or_else(|| corrupt("unknown step type"))?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            output: row.try_get("output")?,
            status: StepStatus::parse(&status_str)
                .ok_or_else(|| corrupt("unknown step status"))?,
            error_message: row.try_get("error_message")?,
        })
    }

    fn row_to_dead_letter(row: PgRow) -> Result<DeadLetterEntry> {
        let run_id = RunId::from_uuid(row.try_get::<Uuid, _>("run_id")?);
        let retry_count: i32 = row.try_get("retry_count_at_failure")?;
        let action: Option<String> = row.try_get("resolution_action")?;

        Ok(DeadLetterEntry {
            run_id,
            failure_reason: row.try_get("failure_reason")?,
            last_error: row.try_get("last_error")?,
            retry_count_at_failure: u32::try_from(retry_count).unwrap_or(0),
            can_retry: row.try_get("can_retry")?,
            created_at: row.try_get("created_at")?,
            resolved_at: row.try_get("resolved_at")?,
            resolution_action: action.as_deref().and_then(ResolutionAction::parse),
        })
    }
}

#[async_trait]
impl RunStore for PostgresRunStore {
    async fn insert_run(&self, run: &WorkflowRun) -> Result<()> {
        let retry_policy = serde_json::to_value(run.retry_policy)?;
        let compensations = serde_json::to_value(&run.compensations_needed)?;
        let context = serde_json::to_value(&run.context)?;

        sqlx::query(
            r#"
            INSERT INTO workflow_runs
                (id, definition_id, subject_id, status, current_activity_index,
                 retry_count, retry_policy, compensations_needed, awaiting_signal,
                 next_retry_at, started_at, finished_at, last_error, context)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(run.id.as_uuid())
        .bind(&run.definition_id)
        .bind(run.subject_id.as_uuid())
        .bind(run.status.as_str())
        .bind(run.current_activity_index as i64)
        .bind(run.retry_count as i32)
        .bind(retry_policy)
        .bind(compensations)
        .bind(&run.awaiting_signal)
        .bind(run.next_retry_at)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(&run.last_error)
        .bind(context)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("workflow_runs_pkey")
            {
                return StoreError::DuplicateRun(run.id);
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn get_run(&self, run_id: RunId) -> Result<Option<WorkflowRun>> {
        let row = sqlx::query("SELECT * FROM workflow_runs WHERE id = $1")
            .bind(run_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_run).transpose()
    }

    async fn get_run_by_subject(&self, subject_id: SubjectId) -> Result<Option<WorkflowRun>> {
        let row = sqlx::query(
            "SELECT * FROM workflow_runs WHERE subject_id = $1 ORDER BY started_at DESC LIMIT 1",
        )
        .bind(subject_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_run).transpose()
    }

    async fn update_run(&self, run: &WorkflowRun, expected_status: RunStatus) -> Result<()> {
        let retry_policy = serde_json::to_value(run.retry_policy)?;
        let compensations = serde_json::to_value(&run.compensations_needed)?;
        let context = serde_json::to_value(&run.context)?;

        // The status predicate is the optimistic concurrency check: a
        // concurrent writer that already moved the run loses here.
        let result = sqlx::query(
            r#"
            UPDATE workflow_runs SET
                status = $2,
                current_activity_index = $3,
                retry_count = $4,
                retry_policy = $5,
                compensations_needed = $6,
                awaiting_signal = $7,
                next_retry_at = $8,
                finished_at = $9,
                last_error = $10,
                context = $11
            WHERE id = $1 AND status = $12
            "#,
        )
        .bind(run.id.as_uuid())
        .bind(run.status.as_str())
        .bind(run.current_activity_index as i64)
        .bind(run.retry_count as i32)
        .bind(retry_policy)
        .bind(compensations)
        .bind(&run.awaiting_signal)
        .bind(run.next_retry_at)
        .bind(run.finished_at)
        .bind(&run.last_error)
        .bind(context)
        .bind(expected_status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let actual: Option<String> =
                sqlx::query_scalar("SELECT status FROM workflow_runs WHERE id = $1")
                    .bind(run.id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await?;

            return match actual {
                Some(status_str) => Err(StoreError::ConcurrencyConflict {
                    run_id: run.id,
                    expected: expected_status,
                    actual: RunStatus::parse(&status_str).ok_or_else(|| {
                        StoreError::CorruptRecord {
                            run_id: run.id,
                            message: "unknown run status".to_string(),
                        }
                    })?,
                }),
                None => Err(StoreError::RunNotFound(run.id)),
            };
        }

        Ok(())
    }

    async fn append_step_log(&self, log: &StepLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO step_logs
                (run_id, step_name, step_type, started_at, finished_at, output, status, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(log.run_id.as_uuid())
        .bind(&log.step_name)
        .bind(log.step_type.as_str())
        .bind(log.started_at)
        .bind(log.finished_at)
        .bind(&log.output)
        .bind(log.status.as_str())
        .bind(&log.error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_step_logs(&self, run_id: RunId) -> Result<Vec<StepLog>> {
        let rows = sqlx::query("SELECT * FROM step_logs WHERE run_id = $1 ORDER BY id ASC")
            .bind(run_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_step_log).collect()
    }

    async fn record_signal(&self, signal: &Signal) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO signals (run_id, signal_type, payload, created_at, processed_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(signal.run_id.as_uuid())
        .bind(&signal.signal_type)
        .bind(&signal.payload)
        .bind(signal.created_at)
        .bind(signal.processed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_signals(&self, run_id: RunId) -> Result<Vec<Signal>> {
        let rows = sqlx::query("SELECT * FROM signals WHERE run_id = $1 ORDER BY id ASC")
            .bind(run_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                Ok(Signal {
                    run_id: RunId::from_uuid(row.try_get::<Uuid, _>("run_id")?),
                    signal_type: row.try_get("signal_type")?,
                    payload: row.try_get("payload")?,
                    created_at: row.try_get("created_at")?,
                    processed_at: row.try_get("processed_at")?,
                })
            })
            .collect()
    }

    async fn insert_dead_letter(&self, entry: &DeadLetterEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dead_letters
                (run_id, failure_reason, last_error, retry_count_at_failure,
                 can_retry, created_at, resolved_at, resolution_action)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.run_id.as_uuid())
        .bind(&entry.failure_reason)
        .bind(&entry.last_error)
        .bind(entry.retry_count_at_failure as i32)
        .bind(entry.can_retry)
        .bind(entry.created_at)
        .bind(entry.resolved_at)
        .bind(entry.resolution_action.map(|a| a.as_str()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("uq_dead_letters_unresolved")
            {
                return StoreError::UnresolvedDeadLetter(entry.run_id);
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn get_unresolved_dead_letter(&self, run_id: RunId) -> Result<Option<DeadLetterEntry>> {
        let row = sqlx::query(
            "SELECT * FROM dead_letters WHERE run_id = $1 AND resolved_at IS NULL",
        )
        .bind(run_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_dead_letter).transpose()
    }

    async fn resolve_dead_letter(&self, run_id: RunId, action: ResolutionAction) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE dead_letters SET resolved_at = $2, resolution_action = $3
            WHERE run_id = $1 AND resolved_at IS NULL
            "#,
        )
        .bind(run_id.as_uuid())
        .bind(Utc::now())
        .bind(action.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_compensation_record(&self, record: &CompensationRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO compensation_records (run_id, activity_name, status, executed_at, error_message)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.run_id.as_uuid())
        .bind(&record.activity_name)
        .bind(record.status.as_str())
        .bind(record.executed_at)
        .bind(&record.error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_compensation_records(&self, run_id: RunId) -> Result<Vec<CompensationRecord>> {
        let rows =
            sqlx::query("SELECT * FROM compensation_records WHERE run_id = $1 ORDER BY id ASC")
                .bind(run_id.as_uuid())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|row| {
                let run_id = RunId::from_uuid(row.try_get::<Uuid, _>("run_id")?);
                let status_str: String = row.try_get("status")?;
                Ok(CompensationRecord {
                    run_id,
                    activity_name: row.try_get("activity_name")?,
                    status: CompensationStatus::parse(&status_str).ok_or_else(|| {
                        StoreError::CorruptRecord {
                            run_id,
                            message: "unknown compensation status".to_string(),
                        }
                    })?,
                    executed_at: row.try_get("executed_at")?,
                    error_message: row.try_get("error_message")?,
                })
            })
            .collect()
    }

    async fn due_for_retry(&self, now: DateTime<Utc>) -> Result<Vec<WorkflowRun>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM workflow_runs
            WHERE status = 'retrying' AND next_retry_at <= $1
            ORDER BY next_retry_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_run).collect()
    }
}
