use common::{RunId, SubjectId};
use thiserror::Error;

use crate::status::RunStatus;

/// Errors that can occur when interacting with the run store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The persisted status did not match the expected status on a
    /// mutating call. The caller must refetch and retry the operation.
    #[error("Concurrency conflict for run {run_id}: expected status {expected}, found {actual}")]
    ConcurrencyConflict {
        run_id: RunId,
        expected: RunStatus,
        actual: RunStatus,
    },

    /// The run was not found in the store.
    #[error("Run not found: {0}")]
    RunNotFound(RunId),

    /// No run exists for the given subject.
    #[error("No run found for subject: {0}")]
    SubjectNotFound(SubjectId),

    /// A run with this ID already exists.
    #[error("Run already exists: {0}")]
    DuplicateRun(RunId),

    /// The run already has an unresolved dead-letter entry.
    #[error("Run {0} already has an unresolved dead-letter entry")]
    UnresolvedDeadLetter(RunId),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted value could not be decoded.
    #[error("Corrupt record for run {run_id}: {message}")]
    CorruptRecord { run_id: RunId, message: String },
}

/// Result type for run store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
