//! Retry scheduler: the external clock for runs in retry-wait.
//!
//! The engine records retry deadlines but never sleeps; this poller
//! scans for due runs and drives them through `retry_now`. Any number
//! of schedulers may run concurrently, the optimistic status check
//! lets exactly one win each run.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use engine::WorkflowEngine;
use run_store::RunStore;
use tokio::task::JoinHandle;

/// Polls for runs whose retry deadline has passed.
pub struct RetryScheduler<S: RunStore + 'static> {
    engine: Arc<WorkflowEngine<S>>,
    poll_interval: Duration,
}

impl<S: RunStore + 'static> RetryScheduler<S> {
    pub fn new(engine: Arc<WorkflowEngine<S>>, poll_interval: Duration) -> Self {
        Self {
            engine,
            poll_interval,
        }
    }

    /// Spawns the polling loop on the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                self.tick().await;
            }
        })
    }

    /// One scan: re-invoke every run whose deadline has passed.
    pub async fn tick(&self) {
        let due = match self.engine.due_for_retry(Utc::now()).await {
            Ok(runs) => runs,
            Err(err) => {
                tracing::error!(error = %err, "retry scan failed");
                return;
            }
        };

        for run in due {
            match self.engine.retry_now(run.id).await {
                Ok(_) => {}
                // Another scheduler or an operator got there first.
                Err(err) if err.is_conflict() => {
                    tracing::debug!(run_id = %run.id, "retry already claimed");
                }
                Err(err) => {
                    tracing::error!(run_id = %run.id, error = %err, "scheduled retry failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::{ContextEnvelope, SubjectId};
    use engine::{
        Activity, ActivityError, ActivityRegistry, ActivityStep, WorkflowDefinition,
    };
    use run_store::{InMemoryRunStore, RetryPolicy, RunStatus};
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FailOnce(AtomicU32);

    #[async_trait]
    impl Activity for FailOnce {
        async fn execute(&self, _context: &mut ContextEnvelope) -> Result<Value, ActivityError> {
            if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(ActivityError::Retryable("flaky".to_string()));
            }
            Ok(json!({}))
        }
    }

    #[tokio::test]
    async fn tick_drives_due_runs_to_completion() {
        let definition = WorkflowDefinition::new(
            "sched",
            vec![ActivityStep::new("work")],
            // Zero delay: the run is due as soon as it enters retrying.
            RetryPolicy::fixed(0, 3),
        )
        .unwrap();
        let registry = ActivityRegistry::builder()
            .register("work", Arc::new(FailOnce(AtomicU32::new(0))))
            .build();
        let engine = Arc::new(
            WorkflowEngine::new(InMemoryRunStore::new(), vec![definition], registry).unwrap(),
        );

        let run = engine.start("sched", SubjectId::new()).await.unwrap();
        assert_eq!(run.status, RunStatus::Retrying);

        let scheduler = RetryScheduler::new(engine.clone(), Duration::from_millis(10));
        scheduler.tick().await;

        let view = engine.get_status(run.id).await.unwrap();
        assert_eq!(view.run.status, RunStatus::Completed);
    }
}
