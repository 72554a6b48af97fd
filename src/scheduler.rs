//! Scheduled batch runs
//!
//! Background scheduler that starts the end-of-day batch saga on a
//! fixed interval. Manual triggers go through `run_once`.

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use uuid::Uuid;

use crate::domain::OperationContext;
use crate::engine::{SagaOutcome, SagaRequest, WorkflowEngine};
use crate::workflow::SagaError;

/// Runs the standard end-of-day batch on a fixed interval.
pub struct BatchScheduler {
    engine: WorkflowEngine,
    run_interval: Duration,
}

impl BatchScheduler {
    pub fn new(engine: WorkflowEngine, run_interval: Duration) -> Self {
        Self {
            engine,
            run_interval,
        }
    }

    /// Start the scheduler in the background.
    /// Returns a handle that can be used to abort the scheduler.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the scheduler loop
    async fn run(&self) {
        tracing::info!(
            interval_secs = self.run_interval.as_secs(),
            "Batch scheduler started"
        );

        let mut tick = interval(self.run_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup does not
        // trigger a batch run.
        tick.tick().await;

        loop {
            tick.tick().await;
            match self.run_once().await {
                Ok(outcome) => {
                    tracing::info!(saga_id = %outcome.saga_id, "Scheduled batch run completed");
                }
                Err(e) => {
                    tracing::error!(
                        saga_id = %e.saga_id,
                        error = %e,
                        compensated = ?e.compensation.compensated_steps(),
                        "Scheduled batch run failed"
                    );
                }
            }
        }
    }

    /// Run the standard batch once (manual trigger or testing)
    pub async fn run_once(&self) -> Result<SagaOutcome, SagaError> {
        let context = OperationContext::new()
            .with_actor("scheduler")
            .with_correlation_id(Uuid::new_v4());

        self.engine
            .start_saga(SagaRequest::BatchProcess { operations: None }, context, None)
            .await
    }
}
