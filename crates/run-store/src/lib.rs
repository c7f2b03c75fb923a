//! Durable run state store.
//!
//! One record per workflow execution plus its append-only step trace;
//! the single source of truth for resumability. Every engine mutation
//! goes through [`RunStore::update_run`], which performs an optimistic
//! check on the run's status so that concurrent resume/retry/cancel
//! calls cannot double-execute a run.
//!
//! Two backends are provided: [`InMemoryRunStore`] for tests and local
//! development, and [`PostgresRunStore`] for production.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod status;
pub mod store;

pub use common::{ContextEnvelope, RunId, SubjectId};
pub use error::{Result, StoreError};
pub use memory::InMemoryRunStore;
pub use postgres::PostgresRunStore;
pub use records::{
    Backoff, CompensationRecord, CompensationStatus, DeadLetterEntry, ResolutionAction,
    RetryPolicy, Signal, StepLog, StepStatus, StepType, WorkflowRun,
};
pub use status::RunStatus;
pub use store::RunStore;
