//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;

use uuid::Uuid;

use ledger_core::audit::MemoryAuditSink;
use ledger_core::domain::{AllowAll, Money, OperationContext, SystemClock};
use ledger_core::event_store::InMemoryEventStore;
use ledger_core::idempotency::MemoryDeduplicationStore;
use ledger_core::projection::InMemoryProjections;
use ledger_core::workflow::{BatchConfig, BatchStores, Services};
use ledger_core::{SagaRequest, WorkflowEngine};

/// Fully in-memory engine plus direct handles to its backing stores.
pub struct TestHarness {
    pub engine: WorkflowEngine,
    pub store: InMemoryEventStore,
    pub audit: MemoryAuditSink,
    pub batch_stores: BatchStores,
}

/// Build an engine over in-memory stores, keeping handles so tests can
/// inspect (and tamper with) state behind the engine's back.
pub fn harness() -> TestHarness {
    let store = InMemoryEventStore::new();
    let audit = MemoryAuditSink::new();
    let batch_stores = BatchStores::new();

    let services = Services::new(
        Arc::new(store.clone()),
        Arc::new(InMemoryProjections::new()),
        Arc::new(audit.clone()),
        Arc::new(SystemClock),
        Arc::new(AllowAll),
    );
    let engine = WorkflowEngine::new(
        services,
        batch_stores.clone(),
        BatchConfig::default(),
        Arc::new(MemoryDeduplicationStore::new()),
    );

    TestHarness {
        engine,
        store,
        audit,
        batch_stores,
    }
}

pub fn test_context() -> OperationContext {
    OperationContext::new()
        .with_actor("test")
        .with_correlation_id(Uuid::new_v4())
}

/// Create an account and deposit an opening balance into it.
pub async fn create_funded_account(engine: &WorkflowEngine, opening_balance: Money) -> Uuid {
    let account_id = Uuid::new_v4();
    let ctx = test_context();

    engine
        .start_saga(
            SagaRequest::CreateAccount {
                account_id,
                name: "checking".to_string(),
                owner: Some("test".to_string()),
            },
            ctx.clone(),
            None,
        )
        .await
        .expect("account creation failed");

    if opening_balance > Money::ZERO {
        engine
            .start_saga(
                SagaRequest::Deposit {
                    account_id,
                    amount: opening_balance,
                    description: Some("opening balance".to_string()),
                },
                ctx,
                None,
            )
            .await
            .expect("opening deposit failed");
    }

    account_id
}
