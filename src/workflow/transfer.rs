//! Transfer sagas
//!
//! Withdraw-then-deposit with exact compensation: a failed deposit
//! re-credits the source, so funds end up exactly where they started.

use serde_json::json;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditRecord};
use crate::domain::{DomainError, Money, OperationContext};

use super::activities::{DepositActivity, Services, WithdrawActivity};
use super::saga::{ChildSagaStep, Saga, SagaStep, StepFuture};
use super::WorkflowContext;

/// Build the canonical two-step transfer saga.
///
/// Step 1 withdraws from `from` (compensation: deposit back); step 2
/// deposits into `to` (compensation: withdraw again). Transfers to the
/// same account are rejected before any step runs.
pub fn transfer_saga(
    services: &Services,
    context: &OperationContext,
    from: Uuid,
    to: Uuid,
    amount: Money,
) -> Result<Saga, DomainError> {
    if from == to {
        return Err(DomainError::SameAccountTransfer);
    }
    if amount.is_negative() {
        return Err(DomainError::InvalidAmount(format!(
            "cannot transfer negative amount {amount}"
        )));
    }

    Ok(Saga::new("transfer")
        .step(Box::new(WithdrawActivity::new(
            services.clone(),
            context.clone(),
            from,
            amount,
            Some(format!("transfer to {to}")),
        )))
        .step(Box::new(DepositActivity::new(
            services.clone(),
            context.clone(),
            to,
            amount,
            Some(format!("transfer from {from}")),
        )))
        .step(Box::new(TransferAuditStep {
            services: services.clone(),
            context: context.clone(),
            action: AuditAction::TransferExecuted,
            from,
            to,
            amount,
        })))
}

/// Build a bulk transfer: one child transfer saga per `(to, amount)`
/// pair. A failure at pair k compensates pairs 1..k-1 in reverse
/// before the failure propagates.
pub fn bulk_transfer_saga(
    services: &Services,
    context: &OperationContext,
    from: Uuid,
    pairs: &[(Uuid, Money)],
) -> Result<Saga, DomainError> {
    let mut saga = Saga::new("bulk_transfer");
    for (to, amount) in pairs {
        let child = transfer_saga(services, context, from, *to, *amount)?;
        saga = saga.step(Box::new(ChildSagaStep::new(child)));
    }
    Ok(saga)
}

/// Build the reversal of an earlier transfer: the opposite movement,
/// audited as a transaction reversal.
pub fn reverse_transaction_saga(
    services: &Services,
    context: &OperationContext,
    original_from: Uuid,
    original_to: Uuid,
    amount: Money,
) -> Result<Saga, DomainError> {
    if original_from == original_to {
        return Err(DomainError::SameAccountTransfer);
    }
    if amount.is_negative() {
        return Err(DomainError::InvalidAmount(format!(
            "cannot reverse negative amount {amount}"
        )));
    }

    Ok(Saga::new("reverse_transaction")
        .step(Box::new(WithdrawActivity::new(
            services.clone(),
            context.clone(),
            original_to,
            amount,
            Some(format!("reversal of transfer from {original_from}")),
        )))
        .step(Box::new(DepositActivity::new(
            services.clone(),
            context.clone(),
            original_from,
            amount,
            Some(format!("reversal of transfer to {original_to}")),
        )))
        .step(Box::new(TransferAuditStep {
            services: services.clone(),
            context: context.clone(),
            action: AuditAction::TransactionReversed,
            from: original_to,
            to: original_from,
            amount,
        })))
}

/// Final step recording the completed transfer in the audit trail.
struct TransferAuditStep {
    services: Services,
    context: OperationContext,
    action: AuditAction,
    from: Uuid,
    to: Uuid,
    amount: Money,
}

impl SagaStep for TransferAuditStep {
    fn name(&self) -> &str {
        "record_transfer"
    }

    fn execute<'a>(&'a self, _ctx: &'a mut WorkflowContext) -> StepFuture<'a, serde_json::Value> {
        Box::pin(async move {
            self.services.audit.record(
                AuditRecord::new(self.action, &self.context, self.services.clock.now())
                    .account(self.from)
                    .amount(self.amount)
                    .reason(format!("{} -> {}", self.from, self.to)),
            );
            Ok(json!({
                "from": self.from,
                "to": self.to,
                "amount": self.amount,
            }))
        })
    }

    fn has_compensation(&self) -> bool {
        false
    }

    fn compensate<'a>(&'a self, _ctx: &'a WorkflowContext) -> StepFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::domain::{AllowAll, FixedClock};
    use crate::event_store::InMemoryEventStore;
    use crate::projection::InMemoryProjections;
    use crate::workflow::activities::CreateAccountActivity;
    use std::sync::Arc;

    fn test_services(audit: &MemoryAuditSink) -> Services {
        Services::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryProjections::new()),
            Arc::new(audit.clone()),
            Arc::new(FixedClock::epoch()),
            Arc::new(AllowAll),
        )
    }

    async fn funded_account(services: &Services, amount: i64) -> Uuid {
        let id = Uuid::new_v4();
        let ctx = OperationContext::new().with_actor("test");
        let mut saga = Saga::new("setup")
            .step(Box::new(CreateAccountActivity::new(
                services.clone(),
                ctx.clone(),
                id,
                "acct",
                None,
            )))
            .step(Box::new(DepositActivity::new(
                services.clone(),
                ctx,
                id,
                Money::new(amount),
                None,
            )));
        saga.run(&mut WorkflowContext::new()).await.unwrap();
        id
    }

    async fn balance(services: &Services, id: Uuid) -> Money {
        services.projections.balance(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_transfer_moves_funds_and_conserves_total() {
        let audit = MemoryAuditSink::new();
        let services = test_services(&audit);
        let a = funded_account(&services, 10_000).await;
        let b = funded_account(&services, 500).await;

        let ctx = OperationContext::new().with_actor("alice");
        let mut saga = transfer_saga(&services, &ctx, a, b, Money::new(3_000)).unwrap();
        saga.run(&mut WorkflowContext::new()).await.unwrap();

        assert_eq!(balance(&services, a).await, Money::new(7_000));
        assert_eq!(balance(&services, b).await, Money::new(3_500));
        assert!(audit.actions().contains(&"transfer.executed".to_string()));
    }

    #[tokio::test]
    async fn test_transfer_insufficient_funds_changes_nothing() {
        let audit = MemoryAuditSink::new();
        let services = test_services(&audit);
        let a = funded_account(&services, 100).await;
        let b = funded_account(&services, 0).await;

        let ctx = OperationContext::new();
        let mut saga = transfer_saga(&services, &ctx, a, b, Money::new(200)).unwrap();
        let err = saga.run(&mut WorkflowContext::new()).await.unwrap_err();

        assert!(matches!(
            err.root_cause,
            super::super::WorkflowError::Domain(DomainError::InsufficientFunds { .. })
        ));
        assert_eq!(balance(&services, a).await, Money::new(100));
        assert_eq!(balance(&services, b).await, Money::ZERO);
    }

    #[tokio::test]
    async fn test_failed_deposit_restores_source_balance() {
        let audit = MemoryAuditSink::new();
        let services = test_services(&audit);
        let a = funded_account(&services, 5_000).await;
        // Destination never created: deposit fails on the lifecycle check
        let b = Uuid::new_v4();

        let ctx = OperationContext::new();
        let mut saga = transfer_saga(&services, &ctx, a, b, Money::new(5_000)).unwrap();
        let err = saga.run(&mut WorkflowContext::new()).await.unwrap_err();

        // Root cause identifies the deposit failure; withdrawal was undone
        assert!(matches!(
            err.root_cause,
            super::super::WorkflowError::Domain(DomainError::AccountNotFound(id)) if id == b
        ));
        assert!(err.compensation.all_succeeded());
        assert_eq!(err.compensation.compensated_steps(), vec!["withdraw"]);
        assert_eq!(balance(&services, a).await, Money::new(5_000));
    }

    #[tokio::test]
    async fn test_same_account_transfer_rejected() {
        let audit = MemoryAuditSink::new();
        let services = test_services(&audit);
        let a = Uuid::new_v4();
        let ctx = OperationContext::new();

        assert!(matches!(
            transfer_saga(&services, &ctx, a, a, Money::new(100)),
            Err(DomainError::SameAccountTransfer)
        ));
    }

    #[tokio::test]
    async fn test_bulk_transfer_all_succeed() {
        let audit = MemoryAuditSink::new();
        let services = test_services(&audit);
        let from = funded_account(&services, 10_000).await;
        let b = funded_account(&services, 0).await;
        let c = funded_account(&services, 0).await;

        let ctx = OperationContext::new();
        let pairs = vec![(b, Money::new(1_000)), (c, Money::new(2_000))];
        let mut saga = bulk_transfer_saga(&services, &ctx, from, &pairs).unwrap();
        saga.run(&mut WorkflowContext::new()).await.unwrap();

        assert_eq!(balance(&services, from).await, Money::new(7_000));
        assert_eq!(balance(&services, b).await, Money::new(1_000));
        assert_eq!(balance(&services, c).await, Money::new(2_000));
    }

    #[tokio::test]
    async fn test_bulk_transfer_failure_unwinds_earlier_transfers() {
        let audit = MemoryAuditSink::new();
        let services = test_services(&audit);
        let from = funded_account(&services, 3_000).await;
        let b = funded_account(&services, 0).await;
        let missing = Uuid::new_v4();
        let d = funded_account(&services, 0).await;

        let ctx = OperationContext::new();
        let pairs = vec![
            (b, Money::new(1_000)),
            (missing, Money::new(1_000)),
            (d, Money::new(1_000)),
        ];
        let mut saga = bulk_transfer_saga(&services, &ctx, from, &pairs).unwrap();
        let err = saga.run(&mut WorkflowContext::new()).await.unwrap_err();

        // First transfer reversed, third never attempted
        assert!(matches!(
            err.root_cause,
            super::super::WorkflowError::ChildSaga(_)
        ));
        assert_eq!(balance(&services, from).await, Money::new(3_000));
        assert_eq!(balance(&services, b).await, Money::ZERO);
        assert_eq!(balance(&services, d).await, Money::ZERO);
    }

    #[tokio::test]
    async fn test_reverse_transaction_moves_funds_back() {
        let audit = MemoryAuditSink::new();
        let services = test_services(&audit);
        let a = funded_account(&services, 1_000).await;
        let b = funded_account(&services, 0).await;

        let ctx = OperationContext::new();
        let mut saga = transfer_saga(&services, &ctx, a, b, Money::new(400)).unwrap();
        saga.run(&mut WorkflowContext::new()).await.unwrap();

        let mut reversal =
            reverse_transaction_saga(&services, &ctx, a, b, Money::new(400)).unwrap();
        reversal.run(&mut WorkflowContext::new()).await.unwrap();

        assert_eq!(balance(&services, a).await, Money::new(1_000));
        assert_eq!(balance(&services, b).await, Money::ZERO);
        assert!(audit
            .actions()
            .contains(&"transaction.reversed".to_string()));
    }
}
