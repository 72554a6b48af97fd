//! API Middleware
//!
//! Request context extraction and request/response logging.

use axum::{
    body::Body,
    http::Request,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::domain::OperationContext;

// =========================================================================
// Operation context middleware
// =========================================================================

/// Build the operation context from request headers.
///
/// `X-Actor` identifies the caller for audit records; `X-Correlation-Id`
/// threads an existing trace id through, otherwise one is generated.
pub async fn context_middleware(mut request: Request<Body>, next: Next) -> Response {
    let actor = request
        .headers()
        .get("X-Actor")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let correlation_id = request
        .headers()
        .get("X-Correlation-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<Uuid>().ok())
        .unwrap_or_else(Uuid::new_v4);

    let mut context = OperationContext::new().with_correlation_id(correlation_id);
    if let Some(actor) = actor {
        context = context.with_actor(actor);
    }

    request.extensions_mut().insert(context);
    next.run(request).await
}

// =========================================================================
// Request logging middleware
// =========================================================================

/// Log each request and its response status with timing.
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let correlation_id = request
        .extensions()
        .get::<OperationContext>()
        .and_then(|ctx| ctx.correlation_id);

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        correlation_id = ?correlation_id,
        "Incoming request"
    );

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        correlation_id = ?correlation_id,
        "Request completed"
    );

    response
}
