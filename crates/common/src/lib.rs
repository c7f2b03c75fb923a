//! Shared types for the workflow orchestrator.

pub mod context;
pub mod types;

pub use context::{CONTEXT_SCHEMA_VERSION, ContextEnvelope};
pub use types::{RunId, SubjectId};
