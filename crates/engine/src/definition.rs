//! Immutable workflow definitions.

use std::collections::HashSet;

use run_store::RetryPolicy;

use crate::error::EngineError;

/// One named unit of work in a workflow definition.
#[derive(Debug, Clone)]
pub struct ActivityStep {
    /// Handler name, unique within the definition.
    pub name: String,
    /// Handler invoked with the same context during rollback.
    pub compensation: Option<String>,
    /// True if the step suspends the run pending an external event
    /// after its side-effect-initiating call succeeds.
    pub is_async: bool,
    /// Signal that resumes the run; required when `is_async`.
    pub signal_name: Option<String>,
}

impl ActivityStep {
    /// A synchronous step with no compensation.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            compensation: None,
            is_async: false,
            signal_name: None,
        }
    }

    /// Declares the rollback handler for this step.
    pub fn with_compensation(mut self, compensation: impl Into<String>) -> Self {
        self.compensation = Some(compensation.into());
        self
    }

    /// Marks the step asynchronous, suspending the run until the named
    /// signal arrives.
    pub fn awaiting_signal(mut self, signal_name: impl Into<String>) -> Self {
        self.is_async = true;
        self.signal_name = Some(signal_name.into());
        self
    }
}

/// An ordered, immutable activity sequence. Supplied at engine
/// construction; one fixed sequence per definition, no dynamic DAGs.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    id: String,
    steps: Vec<ActivityStep>,
    retry_policy: RetryPolicy,
}

impl WorkflowDefinition {
    /// Validates and creates a definition.
    ///
    /// Step names must be unique, async steps must declare a signal
    /// name, and only async steps may declare one.
    pub fn new(
        id: impl Into<String>,
        steps: Vec<ActivityStep>,
        retry_policy: RetryPolicy,
    ) -> Result<Self, EngineError> {
        let id = id.into();
        let invalid = |message: String| EngineError::InvalidDefinition {
            definition_id: id.clone(),
            message,
        };

        if steps.is_empty() {
            return Err(invalid("definition has no steps".to_string()));
        }

        let mut seen = HashSet::new();
        for step in &steps {
            if !seen.insert(step.name.as_str()) {
                return Err(invalid(format!("duplicate step name '{}'", step.name)));
            }
            if step.is_async && step.signal_name.is_none() {
                return Err(invalid(format!(
                    "async step '{}' declares no signal name",
                    step.name
                )));
            }
            if !step.is_async && step.signal_name.is_some() {
                return Err(invalid(format!(
                    "synchronous step '{}' declares a signal name",
                    step.name
                )));
            }
        }

        Ok(Self {
            id,
            steps,
            retry_policy,
        })
    }

    /// Definition identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The ordered activity sequence.
    pub fn steps(&self) -> &[ActivityStep] {
        &self.steps
    }

    /// The step at `index`, if within the sequence.
    pub fn step_at(&self, index: usize) -> Option<&ActivityStep> {
        self.steps.get(index)
    }

    /// Retry policy applied to runs of this definition.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }
}
