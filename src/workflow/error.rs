//! Workflow errors

use thiserror::Error;

use crate::domain::DomainError;
use crate::event_store::EventStoreError;
use crate::projection::ProjectionError;

/// Errors raised by saga steps and the orchestrator.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A step needed a context key no earlier step produced
    #[error("Missing workflow context key: {0}")]
    MissingContext(String),

    /// A nested saga failed; carries its full failure report
    #[error(transparent)]
    ChildSaga(Box<super::saga::SagaError>),

    /// Operation-specific failure inside a batch step
    #[error("Batch operation '{operation}' failed: {message}")]
    BatchOperation { operation: String, message: String },
}

impl WorkflowError {
    /// Whether the failure was a client-side validation or invariant
    /// violation, as opposed to infrastructure trouble.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Domain(e) => e.is_client_error(),
            Self::ChildSaga(e) => e.root_cause.is_client_error(),
            _ => false,
        }
    }
}
