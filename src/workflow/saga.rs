//! Saga orchestrator
//!
//! Runs an ordered list of steps; on a step failure, unwinds the
//! compensations of previously completed steps in reverse order, then
//! surfaces the original failure. Compensation failures are logged and
//! reported, never allowed to mask the root cause.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::context::WorkflowContext;
use super::error::WorkflowError;

/// Boxed future returned by saga step methods.
pub type StepFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, WorkflowError>> + Send + 'a>>;

/// One step of a saga: a unit of work plus its inverse.
///
/// The orchestrator registers the compensation only after `execute`
/// succeeds, so compensations always match what actually happened.
pub trait SagaStep: Send + Sync {
    fn name(&self) -> &str;

    /// Run the step. The output is recorded and stored in the context
    /// so later steps and compensations can read it.
    fn execute<'a>(&'a self, ctx: &'a mut WorkflowContext) -> StepFuture<'a, serde_json::Value>;

    /// Whether this step registers a compensation on success.
    fn has_compensation(&self) -> bool {
        true
    }

    /// Undo the step's effect. Only called after `execute` succeeded.
    fn compensate<'a>(&'a self, ctx: &'a WorkflowContext) -> StepFuture<'a, ()>;
}

/// Saga run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SagaStatus {
    Created,
    Running,
    Completed,
    Compensating,
    Compensated,
    CompensationFailed,
}

/// Outcome of one compensation invocation during unwind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationRecord {
    pub step: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What the unwind did, attached to the surfaced saga failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompensationReport {
    pub records: Vec<CompensationRecord>,
}

impl CompensationReport {
    pub fn all_succeeded(&self) -> bool {
        self.records.iter().all(|r| r.succeeded)
    }

    pub fn compensated_steps(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.step.as_str()).collect()
    }
}

/// A saga failure: the original error plus the compensation outcome.
#[derive(Debug, thiserror::Error)]
#[error("Saga '{saga}' ({saga_id}) failed: {root_cause}")]
pub struct SagaError {
    pub saga_id: Uuid,
    pub saga: String,
    pub root_cause: WorkflowError,
    pub compensation: CompensationReport,
}

/// Ordered steps executed with LIFO compensation on failure.
pub struct Saga {
    id: Uuid,
    name: String,
    status: SagaStatus,
    steps: Vec<Box<dyn SagaStep>>,
    executed: Vec<usize>,
}

impl Saga {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: SagaStatus::Created,
            steps: Vec::new(),
            executed: Vec::new(),
        }
    }

    pub fn step(mut self, step: Box<dyn SagaStep>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> SagaStatus {
        self.status
    }

    /// Execute all steps strictly in order.
    ///
    /// Returns the last step's output. On any step failure the
    /// completed steps are compensated in reverse order and the
    /// original error is surfaced inside a `SagaError`; partial
    /// success is never reported as success.
    pub async fn run(
        &mut self,
        ctx: &mut WorkflowContext,
    ) -> Result<serde_json::Value, SagaError> {
        self.status = SagaStatus::Running;
        let mut last_output = serde_json::Value::Null;

        for index in 0..self.steps.len() {
            let step_name = self.steps[index].name().to_string();
            tracing::debug!(saga_id = %self.id, saga = %self.name, step = %step_name, "executing step");

            match self.steps[index].execute(ctx).await {
                Ok(output) => {
                    last_output = output;
                    self.executed.push(index);
                }
                Err(root_cause) => {
                    tracing::warn!(
                        saga_id = %self.id,
                        saga = %self.name,
                        step = %step_name,
                        error = %root_cause,
                        "step failed, compensating"
                    );

                    let report = self.unwind(ctx).await;
                    self.status = if report.all_succeeded() {
                        SagaStatus::Compensated
                    } else {
                        SagaStatus::CompensationFailed
                    };

                    return Err(SagaError {
                        saga_id: self.id,
                        saga: self.name.clone(),
                        root_cause,
                        compensation: report,
                    });
                }
            }
        }

        self.status = SagaStatus::Completed;
        Ok(last_output)
    }

    /// Compensate completed steps in reverse registration order.
    ///
    /// An individual compensation failure is logged and recorded, and
    /// the unwind continues with the remaining stack.
    pub(crate) async fn unwind(&mut self, ctx: &WorkflowContext) -> CompensationReport {
        self.status = SagaStatus::Compensating;
        let mut report = CompensationReport::default();

        let executed = std::mem::take(&mut self.executed);
        for index in executed.into_iter().rev() {
            let step = &self.steps[index];
            if !step.has_compensation() {
                continue;
            }

            let step_name = step.name().to_string();
            match step.compensate(ctx).await {
                Ok(()) => {
                    tracing::debug!(saga_id = %self.id, step = %step_name, "compensation applied");
                    report.records.push(CompensationRecord {
                        step: step_name,
                        succeeded: true,
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::error!(
                        saga_id = %self.id,
                        step = %step_name,
                        error = %e,
                        "compensation failed, continuing unwind"
                    );
                    report.records.push(CompensationRecord {
                        step: step_name,
                        succeeded: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        report
    }
}

/// A nested saga participating as one step of a parent saga.
///
/// A failed child self-compensates inside `execute` before the error
/// reaches the parent; the parent registers the child's compensation
/// only after the whole child succeeded.
pub struct ChildSagaStep {
    name: String,
    inner: tokio::sync::Mutex<Saga>,
}

impl ChildSagaStep {
    pub fn new(saga: Saga) -> Self {
        Self {
            name: saga.name().to_string(),
            inner: tokio::sync::Mutex::new(saga),
        }
    }
}

impl SagaStep for ChildSagaStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute<'a>(&'a self, ctx: &'a mut WorkflowContext) -> StepFuture<'a, serde_json::Value> {
        Box::pin(async move {
            let mut saga = self.inner.lock().await;
            saga.run(ctx)
                .await
                .map_err(|e| WorkflowError::ChildSaga(Box::new(e)))
        })
    }

    fn compensate<'a>(&'a self, ctx: &'a WorkflowContext) -> StepFuture<'a, ()> {
        Box::pin(async move {
            let mut saga = self.inner.lock().await;
            let report = saga.unwind(ctx).await;
            if report.all_succeeded() {
                Ok(())
            } else {
                Err(WorkflowError::BatchOperation {
                    operation: saga.name().to_string(),
                    message: "child saga compensation incomplete".to_string(),
                })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Step that appends to a shared journal on execute and compensate.
    struct JournalStep {
        name: String,
        journal: Arc<Mutex<Vec<String>>>,
        fail: bool,
        compensable: bool,
        fail_compensation: bool,
    }

    impl JournalStep {
        fn ok(name: &str, journal: &Arc<Mutex<Vec<String>>>) -> Box<Self> {
            Box::new(Self {
                name: name.to_string(),
                journal: journal.clone(),
                fail: false,
                compensable: true,
                fail_compensation: false,
            })
        }

        fn failing(name: &str, journal: &Arc<Mutex<Vec<String>>>) -> Box<Self> {
            Box::new(Self {
                name: name.to_string(),
                journal: journal.clone(),
                fail: true,
                compensable: true,
                fail_compensation: false,
            })
        }
    }

    impl SagaStep for JournalStep {
        fn name(&self) -> &str {
            &self.name
        }

        fn execute<'a>(
            &'a self,
            _ctx: &'a mut WorkflowContext,
        ) -> StepFuture<'a, serde_json::Value> {
            Box::pin(async move {
                if self.fail {
                    return Err(WorkflowError::BatchOperation {
                        operation: self.name.clone(),
                        message: "boom".to_string(),
                    });
                }
                self.journal.lock().unwrap().push(format!("run:{}", self.name));
                Ok(serde_json::json!({"step": self.name}))
            })
        }

        fn has_compensation(&self) -> bool {
            self.compensable
        }

        fn compensate<'a>(&'a self, _ctx: &'a WorkflowContext) -> StepFuture<'a, ()> {
            Box::pin(async move {
                if self.fail_compensation {
                    return Err(WorkflowError::BatchOperation {
                        operation: self.name.clone(),
                        message: "compensation boom".to_string(),
                    });
                }
                self.journal
                    .lock()
                    .unwrap()
                    .push(format!("undo:{}", self.name));
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn test_all_steps_run_in_order() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut saga = Saga::new("test")
            .step(JournalStep::ok("a", &journal))
            .step(JournalStep::ok("b", &journal))
            .step(JournalStep::ok("c", &journal));

        let mut ctx = WorkflowContext::new();
        let output = saga.run(&mut ctx).await.unwrap();

        assert_eq!(saga.status(), SagaStatus::Completed);
        assert_eq!(output, serde_json::json!({"step": "c"}));
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["run:a", "run:b", "run:c"]
        );
    }

    #[tokio::test]
    async fn test_failure_compensates_lifo_and_surfaces_original_error() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut saga = Saga::new("test")
            .step(JournalStep::ok("a", &journal))
            .step(JournalStep::ok("b", &journal))
            .step(JournalStep::failing("c", &journal))
            .step(JournalStep::ok("d", &journal));

        let mut ctx = WorkflowContext::new();
        let err = saga.run(&mut ctx).await.unwrap_err();

        assert_eq!(saga.status(), SagaStatus::Compensated);
        assert!(matches!(
            err.root_cause,
            WorkflowError::BatchOperation { ref operation, .. } if operation == "c"
        ));
        assert!(err.compensation.all_succeeded());
        // b undone before a; d never ran
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["run:a", "run:b", "undo:b", "undo:a"]
        );
    }

    #[tokio::test]
    async fn test_compensation_failure_does_not_stop_unwind() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut saga = Saga::new("test")
            .step(JournalStep::ok("a", &journal))
            .step(Box::new(JournalStep {
                name: "b".to_string(),
                journal: journal.clone(),
                fail: false,
                compensable: true,
                fail_compensation: true,
            }))
            .step(JournalStep::failing("c", &journal));

        let mut ctx = WorkflowContext::new();
        let err = saga.run(&mut ctx).await.unwrap_err();

        assert_eq!(saga.status(), SagaStatus::CompensationFailed);
        // Original error survives; the compensation failure is reported
        assert!(matches!(
            err.root_cause,
            WorkflowError::BatchOperation { ref operation, .. } if operation == "c"
        ));
        assert!(!err.compensation.all_succeeded());
        // a was still unwound after b's compensation failed
        assert_eq!(*journal.lock().unwrap(), vec!["run:a", "run:b", "undo:a"]);
    }

    #[tokio::test]
    async fn test_steps_without_compensation_are_skipped_in_unwind() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut saga = Saga::new("test")
            .step(Box::new(JournalStep {
                name: "a".to_string(),
                journal: journal.clone(),
                fail: false,
                compensable: false,
                fail_compensation: false,
            }))
            .step(JournalStep::failing("b", &journal));

        let mut ctx = WorkflowContext::new();
        let err = saga.run(&mut ctx).await.unwrap_err();
        assert!(err.compensation.records.is_empty());
        assert_eq!(*journal.lock().unwrap(), vec!["run:a"]);
    }

    #[tokio::test]
    async fn test_child_saga_self_compensates_on_failure() {
        let journal = Arc::new(Mutex::new(Vec::new()));

        let child = Saga::new("child")
            .step(JournalStep::ok("c1", &journal))
            .step(JournalStep::failing("c2", &journal));

        let mut parent = Saga::new("parent")
            .step(JournalStep::ok("p1", &journal))
            .step(Box::new(ChildSagaStep::new(child)));

        let mut ctx = WorkflowContext::new();
        let err = parent.run(&mut ctx).await.unwrap_err();

        // Child unwound its own completed step, then parent unwound p1
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["run:p1", "run:c1", "undo:c1", "undo:p1"]
        );
        assert!(matches!(err.root_cause, WorkflowError::ChildSaga(_)));
    }

    #[tokio::test]
    async fn test_successful_child_compensated_when_later_step_fails() {
        let journal = Arc::new(Mutex::new(Vec::new()));

        let child = Saga::new("child")
            .step(JournalStep::ok("c1", &journal))
            .step(JournalStep::ok("c2", &journal));

        let mut parent = Saga::new("parent")
            .step(Box::new(ChildSagaStep::new(child)))
            .step(JournalStep::failing("p2", &journal));

        let mut ctx = WorkflowContext::new();
        parent.run(&mut ctx).await.unwrap_err();

        // Child's steps unwound LIFO when the parent failed after it
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["run:c1", "run:c2", "undo:c2", "undo:c1"]
        );
    }

    #[tokio::test]
    async fn test_step_output_feeds_context() {
        struct PutStep;
        impl SagaStep for PutStep {
            fn name(&self) -> &str {
                "put"
            }
            fn execute<'a>(
                &'a self,
                ctx: &'a mut WorkflowContext,
            ) -> StepFuture<'a, serde_json::Value> {
                Box::pin(async move {
                    ctx.put("value", &41_i64)?;
                    Ok(serde_json::Value::Null)
                })
            }
            fn has_compensation(&self) -> bool {
                false
            }
            fn compensate<'a>(&'a self, _ctx: &'a WorkflowContext) -> StepFuture<'a, ()> {
                Box::pin(async { Ok(()) })
            }
        }

        struct ReadStep {
            seen: Arc<AtomicUsize>,
        }
        impl SagaStep for ReadStep {
            fn name(&self) -> &str {
                "read"
            }
            fn execute<'a>(
                &'a self,
                ctx: &'a mut WorkflowContext,
            ) -> StepFuture<'a, serde_json::Value> {
                Box::pin(async move {
                    let value: i64 = ctx.get("value")?;
                    self.seen.store(value as usize + 1, Ordering::SeqCst);
                    Ok(serde_json::Value::Null)
                })
            }
            fn has_compensation(&self) -> bool {
                false
            }
            fn compensate<'a>(&'a self, _ctx: &'a WorkflowContext) -> StepFuture<'a, ()> {
                Box::pin(async { Ok(()) })
            }
        }

        let seen = Arc::new(AtomicUsize::new(0));
        let mut saga = Saga::new("test")
            .step(Box::new(PutStep))
            .step(Box::new(ReadStep { seen: seen.clone() }));

        let mut ctx = WorkflowContext::new();
        saga.run(&mut ctx).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }
}
