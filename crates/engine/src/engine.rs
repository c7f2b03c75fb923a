//! Workflow engine: executor, signal gateway, retry bookkeeping,
//! compensation runner and dead-letter manager.

use std::collections::HashMap;

use chrono::Utc;
use common::{ContextEnvelope, RunId, SubjectId};
use serde::Serialize;
use serde_json::{Value, json};

use run_store::{
    CompensationRecord, DeadLetterEntry, ResolutionAction, RunStatus, RunStore, Signal, StepLog,
    StepType, WorkflowRun,
};

use crate::activity::{ActivityError, ActivityRegistry};
use crate::definition::WorkflowDefinition;
use crate::error::{EngineError, Result};
use crate::retry::retry_delay;

/// A run together with its trace, as returned by `get_status`.
#[derive(Debug, Clone, Serialize)]
pub struct RunView {
    pub run: WorkflowRun,
    pub step_logs: Vec<StepLog>,
    pub dead_letter: Option<DeadLetterEntry>,
}

/// Orchestrates durable workflow runs against a [`RunStore`].
///
/// Definitions and the name → handler registry are immutable and
/// injected at construction. The engine executes synchronously within a
/// single invocation, persisting every run mutation before the next
/// step executes, so that a crash between any two steps leaves the run
/// in a state from which re-invocation produces a valid continuation.
pub struct WorkflowEngine<S: RunStore> {
    store: S,
    definitions: HashMap<String, WorkflowDefinition>,
    activities: ActivityRegistry,
}

impl<S: RunStore> std::fmt::Debug for WorkflowEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("definitions", &self.definitions.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<S: RunStore> WorkflowEngine<S> {
    /// Creates an engine, validating that every step and compensation
    /// named by the definitions resolves to a registered handler.
    pub fn new(
        store: S,
        definitions: Vec<WorkflowDefinition>,
        activities: ActivityRegistry,
    ) -> Result<Self> {
        for def in &definitions {
            for step in def.steps() {
                if !activities.contains(&step.name) {
                    return Err(EngineError::ActivityNotRegistered(step.name.clone()));
                }
                if let Some(comp) = &step.compensation
                    && !activities.contains(comp)
                {
                    return Err(EngineError::ActivityNotRegistered(comp.clone()));
                }
            }
        }

        let definitions = definitions
            .into_iter()
            .map(|d| (d.id().to_string(), d))
            .collect();

        Ok(Self {
            store,
            definitions,
            activities,
        })
    }

    /// Gets a reference to the underlying run store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates a run and executes it until suspension, completion, or
    /// failure.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self, definition_id: &str, subject_id: SubjectId) -> Result<WorkflowRun> {
        let definition = self.definition(definition_id)?;

        let mut context = ContextEnvelope::empty();
        context.set("subject_id", json!(subject_id.to_string()));

        let run = WorkflowRun::new(
            definition.id(),
            subject_id,
            definition.retry_policy(),
            context,
        );
        self.store.insert_run(&run).await?;

        metrics::counter!("workflow_runs_started_total").increment(1);
        tracing::info!(run_id = %run.id, definition_id, "run started");

        self.advance(run).await
    }

    /// Continues a run awaiting a signal; fails with a state conflict
    /// if the run is not suspended.
    ///
    /// The suspended step is considered complete at resume time and is
    /// not re-run; the payload is merged into the run context.
    #[tracing::instrument(skip(self, payload))]
    pub async fn resume(&self, run_id: RunId, payload: Value) -> Result<WorkflowRun> {
        let mut run = self.load_run(run_id).await?;

        if !run.status.can_receive_signal() {
            return Err(EngineError::InvalidState {
                run_id,
                operation: "resume",
                actual: run.status,
            });
        }

        let definition = self.definition(&run.definition_id)?;
        let step = definition
            .step_at(run.current_activity_index)
            .ok_or_else(|| EngineError::InvalidState {
                run_id,
                operation: "resume",
                actual: run.status,
            })?;
        let signal_type = run
            .awaiting_signal
            .clone()
            .unwrap_or_else(|| step.signal_name.clone().unwrap_or_default());

        run.context.merge(payload.clone());
        run.current_activity_index += 1;
        if let Some(comp) = &step.compensation {
            run.compensations_needed.push(comp.clone());
        }
        run.awaiting_signal = None;
        run.status = RunStatus::Running;

        // Optimistic check: of two simultaneous resume calls only one
        // may proceed; the loser fails with a conflict.
        self.store
            .update_run(&run, RunStatus::AwaitingSignal)
            .await?;
        self.store
            .record_signal(&Signal::processed(run.id, signal_type, payload))
            .await?;

        tracing::info!(run_id = %run.id, step = %step.name, "signal received, run resumed");

        self.advance(run).await
    }

    /// Forces immediate re-invocation of a `retrying` or `dead_lettered`
    /// run.
    #[tracing::instrument(skip(self))]
    pub async fn retry_now(&self, run_id: RunId) -> Result<WorkflowRun> {
        let mut run = self.load_run(run_id).await?;

        match run.status {
            RunStatus::Retrying => {
                run.status = RunStatus::Running;
                run.next_retry_at = None;
                self.store.update_run(&run, RunStatus::Retrying).await?;
                self.advance(run).await
            }
            RunStatus::DeadLettered => {
                if let Some(entry) = self.store.get_unresolved_dead_letter(run.id).await?
                    && !entry.can_retry
                {
                    return Err(EngineError::DeadLetterNotRetryable(run.id));
                }

                // Reopen the run at the current index, not from the
                // start: prior steps' effects were already compensated
                // or already committed and are not replayed.
                run.status = RunStatus::Running;
                run.retry_count = 0;
                run.last_error = None;
                run.next_retry_at = None;
                run.finished_at = None;
                self.store.update_run(&run, RunStatus::DeadLettered).await?;
                self.store
                    .resolve_dead_letter(run.id, ResolutionAction::Retry)
                    .await?;

                metrics::counter!("workflow_dead_letter_retries_total").increment(1);
                tracing::info!(
                    run_id = %run.id,
                    index = run.current_activity_index,
                    "dead-lettered run reopened by manual retry"
                );

                self.advance(run).await
            }
            actual => Err(EngineError::InvalidState {
                run_id,
                operation: "retry_now",
                actual,
            }),
        }
    }

    /// Cancels a run: claims the record, unwinds the compensation stack
    /// and marks the run `cancelled`.
    ///
    /// Cancellation does not abort an activity already in flight; a
    /// committed side effect is undone only by its declared
    /// compensation.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, run_id: RunId) -> Result<WorkflowRun> {
        let mut run = self.load_run(run_id).await?;

        if !run.status.can_cancel() {
            return Err(EngineError::InvalidState {
                run_id,
                operation: "cancel",
                actual: run.status,
            });
        }

        // Claim the run before compensating so a concurrent resume or
        // retry loses the optimistic check instead of double-executing.
        let claimed_from = run.status;
        run.status = RunStatus::Cancelled;
        run.awaiting_signal = None;
        run.finished_at = Some(Utc::now());
        self.store.update_run(&run, claimed_from).await?;

        self.run_compensations(&mut run).await?;
        self.store.update_run(&run, RunStatus::Cancelled).await?;

        metrics::counter!("workflow_runs_cancelled_total").increment(1);
        tracing::info!(run_id = %run.id, "run cancelled");

        Ok(run)
    }

    /// Operator hold: no compensation, the run just stops advancing.
    #[tracing::instrument(skip(self))]
    pub async fn pause(&self, run_id: RunId) -> Result<WorkflowRun> {
        let mut run = self.load_run(run_id).await?;

        if !run.status.can_pause() {
            return Err(EngineError::InvalidState {
                run_id,
                operation: "pause",
                actual: run.status,
            });
        }

        run.status = RunStatus::Paused;
        self.store.update_run(&run, RunStatus::Running).await?;
        tracing::info!(run_id = %run.id, "run paused");
        Ok(run)
    }

    /// Releases an operator hold and re-enters the executor.
    #[tracing::instrument(skip(self))]
    pub async fn unpause(&self, run_id: RunId) -> Result<WorkflowRun> {
        let mut run = self.load_run(run_id).await?;

        if !run.status.can_unpause() {
            return Err(EngineError::InvalidState {
                run_id,
                operation: "unpause",
                actual: run.status,
            });
        }

        run.status = RunStatus::Running;
        self.store.update_run(&run, RunStatus::Paused).await?;
        tracing::info!(run_id = %run.id, "run unpaused");
        self.advance(run).await
    }

    /// Explicit manual re-run of the compensation stack for recovery.
    ///
    /// Compensations are required to be idempotent by contract; the
    /// engine does not deduplicate attempts.
    #[tracing::instrument(skip(self))]
    pub async fn compensate(&self, run_id: RunId) -> Result<WorkflowRun> {
        let mut run = self.load_run(run_id).await?;

        if !run.status.can_compensate_manually() {
            return Err(EngineError::InvalidState {
                run_id,
                operation: "compensate",
                actual: run.status,
            });
        }

        let claimed = run.status;
        self.run_compensations(&mut run).await?;
        self.store.update_run(&run, claimed).await?;
        Ok(run)
    }

    /// Returns the run, its ordered step trace and any unresolved
    /// dead-letter entry.
    pub async fn get_status(&self, run_id: RunId) -> Result<RunView> {
        let run = self.load_run(run_id).await?;
        self.view_of(run).await
    }

    /// Like [`get_status`](Self::get_status), looked up by business
    /// subject.
    pub async fn get_status_by_subject(&self, subject_id: SubjectId) -> Result<Option<RunView>> {
        match self.store.get_run_by_subject(subject_id).await? {
            Some(run) => Ok(Some(self.view_of(run).await?)),
            None => Ok(None),
        }
    }

    /// Runs in `retrying` status whose deadline has passed. Consumed by
    /// the external scheduler that drives [`retry_now`](Self::retry_now).
    pub async fn due_for_retry(
        &self,
        now: chrono::DateTime<Utc>,
    ) -> Result<Vec<WorkflowRun>> {
        Ok(self.store.due_for_retry(now).await?)
    }

    async fn view_of(&self, run: WorkflowRun) -> Result<RunView> {
        let step_logs = self.store.get_step_logs(run.id).await?;
        let dead_letter = self.store.get_unresolved_dead_letter(run.id).await?;
        Ok(RunView {
            run,
            step_logs,
            dead_letter,
        })
    }

    fn definition(&self, definition_id: &str) -> Result<&WorkflowDefinition> {
        self.definitions
            .get(definition_id)
            .ok_or_else(|| EngineError::DefinitionNotFound(definition_id.to_string()))
    }

    async fn load_run(&self, run_id: RunId) -> Result<WorkflowRun> {
        self.store
            .get_run(run_id)
            .await?
            .ok_or(EngineError::RunNotFound(run_id))
    }

    /// Advances a `running` run through the activity list until it
    /// completes, suspends, enters retry-wait, or fails terminally.
    async fn advance(&self, mut run: WorkflowRun) -> Result<WorkflowRun> {
        let definition = self.definition(&run.definition_id)?;

        while run.status == RunStatus::Running {
            let Some(step) = definition.step_at(run.current_activity_index) else {
                run.status = RunStatus::Completed;
                run.finished_at = Some(Utc::now());
                self.store.update_run(&run, RunStatus::Running).await?;

                let duration = (Utc::now() - run.started_at).as_seconds_f64();
                metrics::counter!("workflow_runs_completed_total").increment(1);
                metrics::histogram!("workflow_run_duration_seconds").record(duration);
                tracing::info!(run_id = %run.id, duration, "run completed");
                break;
            };

            let handler = self
                .activities
                .get(&step.name)
                .ok_or_else(|| EngineError::ActivityNotRegistered(step.name.clone()))?;
            let step_type = if step.is_async {
                StepType::Async
            } else {
                StepType::Sync
            };
            let attempt_started = Utc::now();

            tracing::info!(run_id = %run.id, step = %step.name, "activity started");

            match handler.execute(&mut run.context).await {
                Ok(output) => {
                    self.store
                        .append_step_log(&StepLog::completed(
                            run.id,
                            &step.name,
                            step_type,
                            attempt_started,
                            output,
                        ))
                        .await?;

                    if step.is_async {
                        // The side-effect-initiating call succeeded;
                        // suspend without advancing past this step.
                        // Advancement happens on signal arrival only.
                        run.status = RunStatus::AwaitingSignal;
                        run.awaiting_signal = step.signal_name.clone();
                        self.store.update_run(&run, RunStatus::Running).await?;

                        tracing::info!(
                            run_id = %run.id,
                            step = %step.name,
                            signal = run.awaiting_signal.as_deref().unwrap_or(""),
                            "run suspended awaiting signal"
                        );
                        break;
                    }

                    run.current_activity_index += 1;
                    if let Some(comp) = &step.compensation {
                        run.compensations_needed.push(comp.clone());
                    }
                    self.store.update_run(&run, RunStatus::Running).await?;
                }
                Err(error) => {
                    self.store
                        .append_step_log(&StepLog::failed(
                            run.id,
                            &step.name,
                            step_type,
                            attempt_started,
                            error.to_string(),
                        ))
                        .await?;

                    tracing::warn!(
                        run_id = %run.id,
                        step = %step.name,
                        error = %error,
                        "activity failed"
                    );

                    if error.is_retryable() && run.retry_count < run.max_retries() {
                        let delay = retry_delay(&run.retry_policy, run.retry_count);
                        run.retry_count += 1;
                        run.next_retry_at = Some(
                            Utc::now()
                                + chrono::Duration::from_std(delay)
                                    .unwrap_or(chrono::Duration::MAX),
                        );
                        run.status = RunStatus::Retrying;
                        run.last_error = Some(error.to_string());
                        self.store.update_run(&run, RunStatus::Running).await?;

                        metrics::counter!("workflow_retries_scheduled_total").increment(1);
                        tracing::info!(
                            run_id = %run.id,
                            retry_count = run.retry_count,
                            delay_ms = delay.as_millis() as u64,
                            "retry scheduled"
                        );
                        break;
                    }

                    run = self.fail_run(run, &error).await?;
                    break;
                }
            }
        }

        Ok(run)
    }

    /// Terminal failure path: mark failed, unwind the compensation
    /// stack, park the run in the dead-letter sink.
    async fn fail_run(&self, mut run: WorkflowRun, error: &ActivityError) -> Result<WorkflowRun> {
        run.status = RunStatus::Failed;
        run.last_error = Some(error.to_string());
        self.store.update_run(&run, RunStatus::Running).await?;

        self.run_compensations(&mut run).await?;

        let can_retry = !matches!(error, ActivityError::Validation(_));
        self.store
            .insert_dead_letter(&DeadLetterEntry::new(
                run.id,
                error.failure_reason(),
                error.to_string(),
                run.retry_count,
                can_retry,
            ))
            .await?;

        run.status = RunStatus::DeadLettered;
        run.finished_at = Some(Utc::now());
        self.store.update_run(&run, RunStatus::Failed).await?;

        metrics::counter!("workflow_runs_dead_lettered_total").increment(1);
        tracing::warn!(
            run_id = %run.id,
            reason = error.failure_reason(),
            "run dead-lettered"
        );

        Ok(run)
    }

    /// Executes the compensation stack in reverse (LIFO) order as
    /// independent best-effort operations: a failed compensation is
    /// recorded but does not block the remaining ones, and is not
    /// retried by the engine.
    async fn run_compensations(&self, run: &mut WorkflowRun) -> Result<()> {
        let stack: Vec<String> = run.compensations_needed.to_vec();

        for name in stack.iter().rev() {
            let Some(handler) = self.activities.get(name) else {
                self.store
                    .append_compensation_record(&CompensationRecord::failed(
                        run.id,
                        name,
                        "handler not registered",
                    ))
                    .await?;
                continue;
            };

            match handler.execute(&mut run.context).await {
                Ok(_) => {
                    self.store
                        .append_compensation_record(&CompensationRecord::completed(run.id, name))
                        .await?;
                    tracing::info!(run_id = %run.id, compensation = %name, "compensation applied");
                }
                Err(error) => {
                    self.store
                        .append_compensation_record(&CompensationRecord::failed(
                            run.id,
                            name,
                            error.to_string(),
                        ))
                        .await?;
                    metrics::counter!("workflow_compensation_failures_total").increment(1);
                    tracing::warn!(
                        run_id = %run.id,
                        compensation = %name,
                        error = %error,
                        "compensation failed"
                    );
                }
            }
        }

        Ok(())
    }
}
