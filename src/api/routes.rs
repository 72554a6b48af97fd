//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Extension, Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{Money, OperationContext};
use crate::engine::{SagaOutcome, SagaRequest, WorkflowEngine};
use crate::error::AppError;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Serialize)]
pub struct SagaResponse {
    pub saga_id: Uuid,
    pub saga: String,
    pub output: serde_json::Value,
}

impl From<SagaOutcome> for SagaResponse {
    fn from(outcome: SagaOutcome) -> Self {
        Self {
            saga_id: outcome.saga_id,
            saga: outcome.saga,
            output: outcome.output,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub account_id: Uuid,
    pub balance: Money,
}

#[derive(Debug, Serialize)]
pub struct IntegrityResponse {
    pub account_id: Uuid,
    pub is_valid: bool,
    pub events_checked: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_invalid_version: Option<i64>,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<WorkflowEngine> {
    Router::new()
        .route("/sagas", post(start_saga))
        .route("/accounts/:account_id/balance", get(get_account_balance))
        .route(
            "/accounts/:account_id/integrity",
            get(get_account_integrity),
        )
}

// =========================================================================
// POST /sagas
// =========================================================================

/// Start a saga from a typed request.
///
/// An `Idempotency-Key` header makes the call safe to retry: a second
/// request with the same key returns the recorded outcome of the first.
async fn start_saga(
    State(engine): State<WorkflowEngine>,
    Extension(context): Extension<OperationContext>,
    headers: HeaderMap,
    Json(request): Json<SagaRequest>,
) -> Result<(StatusCode, Json<SagaResponse>), AppError> {
    let dedup_key = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let outcome = engine.start_saga(request, context, dedup_key).await?;

    Ok((StatusCode::CREATED, Json(outcome.into())))
}

// =========================================================================
// GET /accounts/:account_id/balance
// =========================================================================

/// Projected balance for an account
async fn get_account_balance(
    State(engine): State<WorkflowEngine>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<BalanceResponse>, AppError> {
    let balance = engine.balance(account_id).await?;

    Ok(Json(BalanceResponse {
        account_id,
        balance,
    }))
}

// =========================================================================
// GET /accounts/:account_id/integrity
// =========================================================================

/// Recompute and report the account's hash chain status
async fn get_account_integrity(
    State(engine): State<WorkflowEngine>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<IntegrityResponse>, AppError> {
    let verification = engine.verify_ledger(account_id).await?;

    Ok(Json(IntegrityResponse {
        account_id,
        is_valid: verification.is_valid,
        events_checked: verification.events_checked,
        first_invalid_version: verification.first_invalid_version,
    }))
}
