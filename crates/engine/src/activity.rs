//! Activity handlers and the immutable handler registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::ContextEnvelope;
use serde_json::Value;
use thiserror::Error;

/// Classified failure of an activity attempt.
///
/// The classification decides the run's fate: validation and fatal
/// failures go straight to compensation and the dead-letter sink,
/// retryable failures consume retry budget first.
#[derive(Debug, Clone, Error)]
pub enum ActivityError {
    /// Bad input; can never be fixed by waiting. Consumes no retry
    /// budget and fails the run immediately.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Transient failure; consumes retry budget and drives backoff.
    #[error("{0}")]
    Retryable(String),

    /// Non-retryable business rule violation; immediate compensation
    /// and dead-letter.
    #[error("{0}")]
    Fatal(String),
}

impl ActivityError {
    /// True if this failure may consume retry budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ActivityError::Retryable(_))
    }

    /// The dead-letter `failure_reason` this classification maps to.
    pub fn failure_reason(&self) -> &'static str {
        match self {
            ActivityError::Validation(_) => "validation_failed",
            ActivityError::Retryable(_) => "retries_exhausted",
            ActivityError::Fatal(_) => "fatal_error",
        }
    }
}

/// One registered unit of work.
///
/// Handlers mutate the run context and return an output recorded in the
/// step log. Contract obligations on authors: compensation handlers
/// must be idempotent, and every activity must be safely re-runnable
/// from its own index (manual dead-letter retry re-enters the sequence
/// at the failed step, not at the start).
#[async_trait]
pub trait Activity: Send + Sync {
    /// Executes the activity against the run context.
    async fn execute(&self, context: &mut ContextEnvelope) -> Result<Value, ActivityError>;
}

/// Immutable name → handler mapping, injected at engine construction.
#[derive(Clone, Default)]
pub struct ActivityRegistry {
    handlers: HashMap<String, Arc<dyn Activity>>,
}

impl ActivityRegistry {
    /// Starts building a registry.
    pub fn builder() -> ActivityRegistryBuilder {
        ActivityRegistryBuilder::default()
    }

    /// Looks up a handler by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Activity>> {
        self.handlers.get(name).cloned()
    }

    /// True if a handler is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True if no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Builder for [`ActivityRegistry`]; the built registry is frozen.
#[derive(Default)]
pub struct ActivityRegistryBuilder {
    handlers: HashMap<String, Arc<dyn Activity>>,
}

impl ActivityRegistryBuilder {
    /// Registers a handler under `name`, replacing any previous one.
    pub fn register(mut self, name: impl Into<String>, handler: Arc<dyn Activity>) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    /// Freezes the registry.
    pub fn build(self) -> ActivityRegistry {
        ActivityRegistry {
            handlers: self.handlers,
        }
    }
}
