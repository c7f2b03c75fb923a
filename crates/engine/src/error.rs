//! Engine error types.

use common::RunId;
use run_store::{RunStatus, StoreError};
use thiserror::Error;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No workflow definition registered under this ID.
    #[error("Workflow definition not found: {0}")]
    DefinitionNotFound(String),

    /// A definition failed construction-time validation.
    #[error("Invalid workflow definition '{definition_id}': {message}")]
    InvalidDefinition {
        definition_id: String,
        message: String,
    },

    /// A step or compensation names a handler missing from the registry.
    #[error("Activity handler not registered: {0}")]
    ActivityNotRegistered(String),

    /// Run not found.
    #[error("Run not found: {0}")]
    RunNotFound(RunId),

    /// The run is in the wrong status for the requested operation.
    #[error("Invalid run state for {operation}: run {run_id} is {actual}")]
    InvalidState {
        run_id: RunId,
        operation: &'static str,
        actual: RunStatus,
    },

    /// The dead-letter entry was created from a validation failure and
    /// is not eligible for manual retry.
    #[error("Dead-letter entry for run {0} is not retryable")]
    DeadLetterNotRetryable(RunId),

    /// Run store error, including optimistic concurrency conflicts.
    #[error("Run store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// True when the operation failed an optimistic state check and the
    /// caller should refetch and retry the operation (never the
    /// workflow logic).
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidState { .. }
                | EngineError::Store(StoreError::ConcurrencyConflict { .. })
        )
    }
}

/// Convenience type alias for engine results.
pub type Result<T> = std::result::Result<T, EngineError>;
