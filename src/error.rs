//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::DomainError;
use crate::event_store::EventStoreError;
use crate::workflow::{CompensationReport, SagaError, WorkflowError};

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Missing required header: {0}")]
    MissingHeader(String),

    // Domain and workflow errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// A saga failed and was unwound; carries the compensation report
    #[error(transparent)]
    Saga(Box<SagaError>),

    // Server errors (5xx)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<SagaError> for AppError {
    fn from(e: SagaError) -> Self {
        Self::Saga(Box::new(e))
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Present when a saga was unwound before failing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compensation: Option<CompensationReport>,
}

/// Map a domain error to its HTTP status and error code
fn domain_error_parts(err: &DomainError) -> (StatusCode, &'static str, Option<String>) {
    match err {
        DomainError::InsufficientFunds { .. } => (
            StatusCode::BAD_REQUEST,
            "insufficient_funds",
            Some(err.to_string()),
        ),
        DomainError::AccountFrozen { .. } => (
            StatusCode::BAD_REQUEST,
            "account_frozen",
            Some(err.to_string()),
        ),
        DomainError::AccountNotFrozen => (StatusCode::BAD_REQUEST, "account_not_frozen", None),
        DomainError::AccountExists(id) => {
            (StatusCode::CONFLICT, "account_exists", Some(id.to_string()))
        }
        DomainError::AccountNotFound(id) => (
            StatusCode::NOT_FOUND,
            "account_not_found",
            Some(id.to_string()),
        ),
        DomainError::AccountDeleted(id) => (
            StatusCode::BAD_REQUEST,
            "account_deleted",
            Some(id.to_string()),
        ),
        DomainError::InvalidAmount(msg) => {
            (StatusCode::BAD_REQUEST, "invalid_amount", Some(msg.clone()))
        }
        DomainError::SameAccountTransfer => {
            (StatusCode::BAD_REQUEST, "same_account_transfer", None)
        }
        DomainError::Unauthorized(msg) => {
            (StatusCode::FORBIDDEN, "unauthorized", Some(msg.clone()))
        }
    }
}

/// Map a workflow error to its HTTP status and error code
fn workflow_error_parts(err: &WorkflowError) -> (StatusCode, &'static str, Option<String>) {
    match err {
        WorkflowError::Domain(e) => domain_error_parts(e),
        WorkflowError::Store(e) => store_error_parts(e),
        WorkflowError::Projection(e) => {
            tracing::error!("Projection error: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "projection_error", None)
        }
        WorkflowError::Serialization(e) => {
            tracing::error!("Serialization error: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "serialization_error",
                None,
            )
        }
        WorkflowError::MissingContext(key) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "missing_context",
            Some(key.clone()),
        ),
        WorkflowError::ChildSaga(e) => workflow_error_parts(&e.root_cause),
        WorkflowError::BatchOperation { .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "batch_operation_failed",
            Some(err.to_string()),
        ),
    }
}

fn store_error_parts(err: &EventStoreError) -> (StatusCode, &'static str, Option<String>) {
    match err {
        EventStoreError::ConcurrencyConflict { .. } => (
            StatusCode::CONFLICT,
            "version_conflict",
            Some(err.to_string()),
        ),
        EventStoreError::MaxRetriesExceeded => {
            (StatusCode::CONFLICT, "max_retries_exceeded", None)
        }
        EventStoreError::IntegrityViolation { .. } => {
            tracing::error!("Integrity violation: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "integrity_violation",
                Some(err.to_string()),
            )
        }
        EventStoreError::Database(e) => {
            tracing::error!("Database error: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
        }
        EventStoreError::Serialization(e) => {
            tracing::error!("Serialization error: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "serialization_error",
                None,
            )
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut compensation = None;

        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }
            AppError::MissingHeader(header) => (
                StatusCode::BAD_REQUEST,
                "missing_header",
                Some(header.clone()),
            ),

            AppError::Domain(e) => domain_error_parts(e),
            AppError::Workflow(e) => workflow_error_parts(e),

            AppError::Saga(e) => {
                if !e.compensation.records.is_empty() {
                    compensation = Some(e.compensation.clone());
                }
                workflow_error_parts(&e.root_cause)
            }

            // 500 Internal Server Error
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
            compensation,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Money;
    use uuid::Uuid;

    #[test]
    fn test_insufficient_funds_is_bad_request() {
        let err = DomainError::insufficient_funds(Money::new(100), Money::new(50));
        let (status, code, _) = domain_error_parts(&err);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, "insufficient_funds");
    }

    #[test]
    fn test_account_not_found_is_not_found() {
        let err = DomainError::AccountNotFound(Uuid::nil());
        let (status, code, _) = domain_error_parts(&err);
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(code, "account_not_found");
    }

    #[test]
    fn test_concurrency_conflict_is_conflict() {
        let err = EventStoreError::ConcurrencyConflict {
            aggregate_id: Uuid::nil(),
            expected: 1,
            actual: 2,
        };
        let (status, code, _) = store_error_parts(&err);
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(code, "version_conflict");
    }

    #[test]
    fn test_child_saga_surfaces_root_cause() {
        let err = WorkflowError::ChildSaga(Box::new(SagaError {
            saga_id: Uuid::new_v4(),
            saga: "transfer".to_string(),
            root_cause: WorkflowError::Domain(DomainError::SameAccountTransfer),
            compensation: Default::default(),
        }));
        let (status, code, _) = workflow_error_parts(&err);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, "same_account_transfer");
    }
}
