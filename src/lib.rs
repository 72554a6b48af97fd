//! ledger-core Library
//!
//! Event-sourced ledger with a saga-orchestrated workflow engine.
//! Re-exports modules for integration testing and external use.

pub mod aggregate;
pub mod api;
pub mod audit;
pub mod domain;
pub mod engine;
pub mod event_store;
pub mod idempotency;
pub mod projection;
pub mod scheduler;
pub mod workflow;

// Modules used primarily by the main.rs binary
pub mod config;
pub mod db;
pub mod error;

pub use config::Config;
pub use engine::{SagaOutcome, SagaRequest, WorkflowEngine};
pub use error::{AppError, AppResult};
pub use domain::{DomainError, LedgerEvent, Money, OperationContext, TransactionEvent};
pub use workflow::{Saga, SagaError, SagaStep, WorkflowContext, WorkflowError};
