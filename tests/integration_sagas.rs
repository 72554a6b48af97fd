//! Saga integration tests: transfers, compensation, freezes, reversals

use ledger_core::domain::{DomainError, Money};
use ledger_core::engine::TransferLeg;
use ledger_core::event_store::EventStore;
use ledger_core::workflow::WorkflowError;
use ledger_core::SagaRequest;
use uuid::Uuid;

mod common;

use common::{create_funded_account, harness, test_context};

#[tokio::test]
async fn test_transfer_moves_and_conserves_funds() {
    let h = harness();
    let from = create_funded_account(&h.engine, Money::new(1_000)).await;
    let to = create_funded_account(&h.engine, Money::ZERO).await;

    h.engine
        .start_saga(
            SagaRequest::Transfer {
                from,
                to,
                amount: Money::new(300),
            },
            test_context(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(h.engine.balance(from).await.unwrap(), Money::new(700));
    assert_eq!(h.engine.balance(to).await.unwrap(), Money::new(300));
    assert!(h.audit.actions().contains(&"transfer.executed".to_string()));

    // Both hash chains stay intact
    assert!(h.engine.verify_ledger_integrity(from).await.unwrap());
    assert!(h.engine.verify_ledger_integrity(to).await.unwrap());
}

#[tokio::test]
async fn test_failed_deposit_compensates_withdrawal() {
    let h = harness();
    let from = create_funded_account(&h.engine, Money::new(1_000)).await;
    let missing = Uuid::new_v4();

    let err = h
        .engine
        .start_saga(
            SagaRequest::Transfer {
                from,
                to: missing,
                amount: Money::new(300),
            },
            test_context(),
            None,
        )
        .await
        .unwrap_err();

    // The deposit failed; only the withdrawal was unwound
    assert!(matches!(
        err.root_cause,
        WorkflowError::Domain(DomainError::AccountNotFound(id)) if id == missing
    ));
    assert_eq!(err.compensation.compensated_steps(), vec!["withdraw"]);
    assert!(err.compensation.all_succeeded());

    // Source funds restored, movement recorded as an explicit reversal
    assert_eq!(h.engine.balance(from).await.unwrap(), Money::new(1_000));
    let events = h.store.load_events(from).await.unwrap();
    // create + deposit + withdraw + compensating credit
    assert_eq!(events.len(), 4);
    assert!(h.engine.verify_ledger_integrity(from).await.unwrap());
}

#[tokio::test]
async fn test_transfer_to_frozen_account_restores_source() {
    let h = harness();
    let from = create_funded_account(&h.engine, Money::new(500)).await;
    let to = create_funded_account(&h.engine, Money::ZERO).await;

    h.engine
        .start_saga(
            SagaRequest::FreezeAccount {
                account_id: to,
                reason: "fraud review".to_string(),
            },
            test_context(),
            None,
        )
        .await
        .unwrap();

    let err = h
        .engine
        .start_saga(
            SagaRequest::Transfer {
                from,
                to,
                amount: Money::new(200),
            },
            test_context(),
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err.root_cause,
        WorkflowError::Domain(DomainError::AccountFrozen { .. })
    ));
    assert_eq!(h.engine.balance(from).await.unwrap(), Money::new(500));
    assert_eq!(h.engine.balance(to).await.unwrap(), Money::ZERO);
}

#[tokio::test]
async fn test_bulk_transfer_unwinds_completed_children() {
    let h = harness();
    let from = create_funded_account(&h.engine, Money::new(1_000)).await;
    let first = create_funded_account(&h.engine, Money::ZERO).await;
    let missing = Uuid::new_v4();

    let err = h
        .engine
        .start_saga(
            SagaRequest::BulkTransfer {
                from,
                transfers: vec![
                    TransferLeg {
                        to: first,
                        amount: Money::new(200),
                    },
                    TransferLeg {
                        to: missing,
                        amount: Money::new(300),
                    },
                ],
            },
            test_context(),
            None,
        )
        .await
        .unwrap_err();

    // The second child failed and self-compensated; the first child's
    // completed transfer was then unwound by the parent.
    assert!(matches!(
        err.root_cause,
        WorkflowError::ChildSaga(ref child)
            if matches!(child.root_cause, WorkflowError::Domain(DomainError::AccountNotFound(_)))
    ));
    assert_eq!(h.engine.balance(from).await.unwrap(), Money::new(1_000));
    assert_eq!(h.engine.balance(first).await.unwrap(), Money::ZERO);
}

#[tokio::test]
async fn test_freeze_blocks_withdrawal_until_unfrozen() {
    let h = harness();
    let account_id = create_funded_account(&h.engine, Money::new(400)).await;

    h.engine
        .start_saga(
            SagaRequest::FreezeAccount {
                account_id,
                reason: "suspicious activity".to_string(),
            },
            test_context(),
            None,
        )
        .await
        .unwrap();

    let withdraw = SagaRequest::Withdraw {
        account_id,
        amount: Money::new(100),
        description: None,
    };
    let err = h
        .engine
        .start_saga(withdraw.clone(), test_context(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err.root_cause,
        WorkflowError::Domain(DomainError::AccountFrozen { .. })
    ));

    h.engine
        .start_saga(
            SagaRequest::UnfreezeAccount {
                account_id,
                reason: "review cleared".to_string(),
            },
            test_context(),
            None,
        )
        .await
        .unwrap();

    h.engine
        .start_saga(withdraw, test_context(), None)
        .await
        .unwrap();
    assert_eq!(h.engine.balance(account_id).await.unwrap(), Money::new(300));
}

#[tokio::test]
async fn test_reverse_transaction_restores_both_balances() {
    let h = harness();
    let from = create_funded_account(&h.engine, Money::new(1_000)).await;
    let to = create_funded_account(&h.engine, Money::ZERO).await;
    let ctx = test_context();

    h.engine
        .start_saga(
            SagaRequest::Transfer {
                from,
                to,
                amount: Money::new(250),
            },
            ctx.clone(),
            None,
        )
        .await
        .unwrap();

    h.engine
        .start_saga(
            SagaRequest::ReverseTransaction {
                original_from: from,
                original_to: to,
                amount: Money::new(250),
            },
            ctx,
            None,
        )
        .await
        .unwrap();

    assert_eq!(h.engine.balance(from).await.unwrap(), Money::new(1_000));
    assert_eq!(h.engine.balance(to).await.unwrap(), Money::ZERO);
    assert!(h
        .audit
        .actions()
        .contains(&"transaction.reversed".to_string()));
}

#[tokio::test]
async fn test_tampered_event_fails_integrity_check() {
    let h = harness();
    let account_id = create_funded_account(&h.engine, Money::new(100)).await;
    assert!(h.engine.verify_ledger_integrity(account_id).await.unwrap());

    // Rewrite the deposit amount behind the store's back
    assert!(
        h.store
            .tamper_with_payload(
                account_id,
                2,
                serde_json::json!({"type": "MoneyAdded", "amount": 999_999}),
            )
            .await
    );

    let verification = h.engine.verify_ledger(account_id).await.unwrap();
    assert!(!verification.is_valid);
    assert_eq!(verification.first_invalid_version, Some(2));
}

#[tokio::test]
async fn test_idempotency_key_returns_recorded_outcome() {
    let h = harness();
    let account_id = create_funded_account(&h.engine, Money::ZERO).await;

    let deposit = SagaRequest::Deposit {
        account_id,
        amount: Money::new(700),
        description: None,
    };
    let first = h
        .engine
        .start_saga(deposit.clone(), test_context(), Some("txn-42".to_string()))
        .await
        .unwrap();
    let second = h
        .engine
        .start_saga(deposit, test_context(), Some("txn-42".to_string()))
        .await
        .unwrap();

    assert_eq!(first.saga_id, second.saga_id);
    assert_eq!(h.engine.balance(account_id).await.unwrap(), Money::new(700));
}
