//! ledger-core - Event-Sourced Ledger Backend
//!
//! HTTP facade over the workflow engine: hash-chained event store,
//! saga orchestration with compensation, and scheduled batch runs.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{middleware, Router};
use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ledger_core::api;
use ledger_core::audit::TracingAuditSink;
use ledger_core::domain::{AllowAll, SystemClock};
use ledger_core::event_store::PgEventStore;
use ledger_core::idempotency::MemoryDeduplicationStore;
use ledger_core::projection::PgProjections;
use ledger_core::scheduler::BatchScheduler;
use ledger_core::workflow::{BatchStores, Services};
use ledger_core::{db, Config, WorkflowEngine};

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledger_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build the application router
fn build_router(engine: WorkflowEngine) -> Router {
    let api_router = api::create_router();

    // Axum layers run in reverse order of addition: context first,
    // then logging, then the handler.
    let api_routes = api_router
        .layer(middleware::from_fn(api::middleware::logging_middleware))
        .layer(middleware::from_fn(api::middleware::context_middleware));

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("Starting ledger-core server");
    tracing::info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    db::verify_connection(&pool).await?;
    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");

    let services = Services::new(
        Arc::new(PgEventStore::new(pool.clone())),
        Arc::new(PgProjections::new(pool.clone())),
        Arc::new(TracingAuditSink),
        Arc::new(SystemClock),
        Arc::new(AllowAll),
    );
    let engine = WorkflowEngine::new(
        services,
        BatchStores::new(),
        config.batch_config(),
        Arc::new(MemoryDeduplicationStore::new()),
    );

    // End-of-day batch runs in the background
    let scheduler = BatchScheduler::new(engine.clone(), config.batch_interval());
    let scheduler_handle = scheduler.start();

    tracing::info!("Listening on http://{}", addr);

    let app = build_router(engine);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutting down...");
    scheduler_handle.abort();
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
