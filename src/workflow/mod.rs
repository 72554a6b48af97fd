//! Workflow module
//!
//! Saga orchestration over activities: ordered steps, LIFO
//! compensation on failure, nested child sagas, and the end-of-day
//! batch saga with per-operation reversals.

pub mod activities;
pub mod batch;
pub mod context;
pub mod error;
pub mod reversal;
pub mod saga;
pub mod transfer;

pub use activities::{
    CreateAccountActivity, DeleteAccountActivity, DepositActivity, FreezeAccountActivity,
    Services, UnfreezeAccountActivity, WithdrawActivity,
};
pub use batch::{
    run_batch, BatchConfig, BatchOperation, BatchOperationRecord, BatchOperationStatus,
    BatchRunner, BatchStores, BatchSummary,
};
pub use context::WorkflowContext;
pub use error::WorkflowError;
pub use saga::{
    ChildSagaStep, CompensationRecord, CompensationReport, Saga, SagaError, SagaStatus, SagaStep,
    StepFuture,
};
pub use transfer::{bulk_transfer_saga, reverse_transaction_saga, transfer_saga};
