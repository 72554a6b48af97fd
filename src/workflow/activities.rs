//! Workflow activities
//!
//! Single-purpose units of work: each loads one aggregate, applies one
//! mutation sequence, persists, updates projections, and emits one
//! audit record. Activities are the only components that touch storage.
//!
//! Optimistic concurrency retries live here, not in the store: a
//! conflicting append requires reloading the aggregate and re-checking
//! invariants before the command is re-applied.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use crate::aggregate::{Ledger, TransactionAccount};
use crate::audit::{AuditAction, AuditRecord, SharedAuditSink, TracingAuditSink};
use crate::domain::{
    AllowAll, DomainError, LedgerEvent, Money, OperationContext, SharedAuthorizer, SharedClock,
    SystemClock, TransactionEvent,
};
use crate::event_store::{EventStoreError, InMemoryEventStore, SharedEventStore};
use crate::projection::{InMemoryProjections, SharedProjections};

use super::error::WorkflowError;
use super::saga::{SagaStep, StepFuture};

const MAX_RETRIES: u32 = 3;

/// Shared dependencies handed to every activity.
#[derive(Clone)]
pub struct Services {
    pub store: SharedEventStore,
    pub projections: SharedProjections,
    pub audit: SharedAuditSink,
    pub clock: SharedClock,
    pub authorizer: SharedAuthorizer,
}

impl Services {
    pub fn new(
        store: SharedEventStore,
        projections: SharedProjections,
        audit: SharedAuditSink,
        clock: SharedClock,
        authorizer: SharedAuthorizer,
    ) -> Self {
        Self {
            store,
            projections,
            audit,
            clock,
            authorizer,
        }
    }

    /// Fully in-memory services: tests and embedded callers.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemoryEventStore::new()),
            projections: Arc::new(InMemoryProjections::new()),
            audit: Arc::new(TracingAuditSink),
            clock: Arc::new(SystemClock),
            authorizer: Arc::new(AllowAll),
        }
    }

    fn authorize(
        &self,
        operation: &str,
        account_id: Uuid,
        context: &OperationContext,
    ) -> Result<(), WorkflowError> {
        let actor = context.actor_or_unknown();
        if !self.authorizer.authorize(operation, account_id, actor) {
            return Err(DomainError::Unauthorized(format!(
                "{actor} may not perform {operation} on {account_id}"
            ))
            .into());
        }
        Ok(())
    }

    fn emit_audit(&self, record: AuditRecord) {
        self.audit.record(record);
    }

    /// Load, mutate, persist a Ledger aggregate with conflict retries.
    ///
    /// The command closure re-runs against freshly replayed state on
    /// each attempt, so invariants are re-checked after a lost race.
    pub(crate) async fn mutate_ledger<F>(
        &self,
        account_id: Uuid,
        mut command: F,
    ) -> Result<Vec<LedgerEvent>, WorkflowError>
    where
        F: FnMut(&mut Ledger) -> Result<(), DomainError>,
    {
        for attempt in 0..MAX_RETRIES {
            let mut ledger = Ledger::retrieve(self.store.as_ref(), account_id).await?;
            command(&mut ledger)?;
            let staged = ledger.staged_events().to_vec();

            match ledger.persist(self.store.as_ref()).await {
                Ok(_) => {
                    for event in &staged {
                        self.projections
                            .apply_ledger(account_id, event.clone())
                            .await?;
                    }
                    return Ok(staged);
                }
                Err(e) if e.is_retryable() && attempt < MAX_RETRIES - 1 => {
                    let delay = Duration::from_millis(50 * (attempt as u64 + 1));
                    tracing::warn!(
                        account_id = %account_id,
                        attempt = attempt + 1,
                        "concurrency conflict, retrying ledger mutation"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(EventStoreError::MaxRetriesExceeded.into())
    }

    /// Load, mutate, persist a Transaction aggregate with conflict
    /// retries. When `enforce_open` is set, the account's lifecycle
    /// state is replayed first and frozen/deleted/missing accounts are
    /// rejected before any movement is staged.
    pub(crate) async fn mutate_transaction<F>(
        &self,
        account_id: Uuid,
        enforce_open: bool,
        mut command: F,
    ) -> Result<Vec<TransactionEvent>, WorkflowError>
    where
        F: FnMut(&mut TransactionAccount) -> Result<(), DomainError>,
    {
        for attempt in 0..MAX_RETRIES {
            if enforce_open {
                let ledger = Ledger::retrieve(self.store.as_ref(), account_id).await?;
                ledger.ensure_open()?;
            }

            let mut account = TransactionAccount::retrieve(self.store.as_ref(), account_id).await?;
            command(&mut account)?;
            let staged = account.staged_events().to_vec();

            match account.persist(self.store.as_ref()).await {
                Ok(_) => {
                    for event in &staged {
                        self.projections
                            .apply_transaction(account_id, event.clone())
                            .await?;
                    }
                    return Ok(staged);
                }
                Err(e) if e.is_retryable() && attempt < MAX_RETRIES - 1 => {
                    let delay = Duration::from_millis(50 * (attempt as u64 + 1));
                    tracing::warn!(
                        account_id = %account_id,
                        attempt = attempt + 1,
                        "concurrency conflict, retrying transaction mutation"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(EventStoreError::MaxRetriesExceeded.into())
    }
}

// ==========================================================================
// Account lifecycle activities
// ==========================================================================

/// Creates an account. Compensation deletes it again.
pub struct CreateAccountActivity {
    services: Services,
    context: OperationContext,
    account_id: Uuid,
    name: String,
    owner: Option<String>,
}

impl CreateAccountActivity {
    pub fn new(
        services: Services,
        context: OperationContext,
        account_id: Uuid,
        name: impl Into<String>,
        owner: Option<String>,
    ) -> Self {
        Self {
            services,
            context,
            account_id,
            name: name.into(),
            owner,
        }
    }
}

impl SagaStep for CreateAccountActivity {
    fn name(&self) -> &str {
        "create_account"
    }

    fn execute<'a>(&'a self, _ctx: &'a mut super::WorkflowContext) -> StepFuture<'a, serde_json::Value> {
        Box::pin(async move {
            self.services
                .authorize("account.create", self.account_id, &self.context)?;

            let name = self.name.clone();
            let owner = self.owner.clone();
            self.services
                .mutate_ledger(self.account_id, move |ledger| {
                    ledger.create_account(name.clone(), owner.clone())
                })
                .await?;

            self.services.emit_audit(
                AuditRecord::new(
                    AuditAction::AccountCreated,
                    &self.context,
                    self.services.clock.now(),
                )
                .account(self.account_id),
            );

            Ok(json!({ "account_id": self.account_id }))
        })
    }

    fn compensate<'a>(&'a self, _ctx: &'a super::WorkflowContext) -> StepFuture<'a, ()> {
        Box::pin(async move {
            self.services
                .mutate_ledger(self.account_id, |ledger| ledger.delete_account())
                .await?;

            self.services.emit_audit(
                AuditRecord::new(
                    AuditAction::CompensationApplied,
                    &self.context,
                    self.services.clock.now(),
                )
                .account(self.account_id)
                .reason("account creation reversed"),
            );
            Ok(())
        })
    }
}

/// Freezes an account. Compensation unfreezes it.
pub struct FreezeAccountActivity {
    services: Services,
    context: OperationContext,
    account_id: Uuid,
    reason: String,
}

impl FreezeAccountActivity {
    pub fn new(
        services: Services,
        context: OperationContext,
        account_id: Uuid,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            services,
            context,
            account_id,
            reason: reason.into(),
        }
    }
}

impl SagaStep for FreezeAccountActivity {
    fn name(&self) -> &str {
        "freeze_account"
    }

    fn execute<'a>(&'a self, _ctx: &'a mut super::WorkflowContext) -> StepFuture<'a, serde_json::Value> {
        Box::pin(async move {
            self.services
                .authorize("account.freeze", self.account_id, &self.context)?;

            let reason = self.reason.clone();
            let authorized_by = self.context.actor.clone();
            self.services
                .mutate_ledger(self.account_id, move |ledger| {
                    ledger.freeze_account(reason.clone(), authorized_by.clone())
                })
                .await?;

            self.services.emit_audit(
                AuditRecord::new(
                    AuditAction::AccountFrozen,
                    &self.context,
                    self.services.clock.now(),
                )
                .account(self.account_id)
                .reason(self.reason.clone()),
            );

            Ok(json!({ "account_id": self.account_id, "reason": self.reason }))
        })
    }

    fn compensate<'a>(&'a self, _ctx: &'a super::WorkflowContext) -> StepFuture<'a, ()> {
        Box::pin(async move {
            let authorized_by = self.context.actor.clone();
            self.services
                .mutate_ledger(self.account_id, move |ledger| {
                    ledger.unfreeze_account("freeze reversed by compensation", authorized_by.clone())
                })
                .await?;

            self.services.emit_audit(
                AuditRecord::new(
                    AuditAction::CompensationApplied,
                    &self.context,
                    self.services.clock.now(),
                )
                .account(self.account_id)
                .reason("freeze reversed"),
            );
            Ok(())
        })
    }
}

/// Unfreezes an account. Compensation re-freezes it.
pub struct UnfreezeAccountActivity {
    services: Services,
    context: OperationContext,
    account_id: Uuid,
    reason: String,
}

impl UnfreezeAccountActivity {
    pub fn new(
        services: Services,
        context: OperationContext,
        account_id: Uuid,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            services,
            context,
            account_id,
            reason: reason.into(),
        }
    }
}

impl SagaStep for UnfreezeAccountActivity {
    fn name(&self) -> &str {
        "unfreeze_account"
    }

    fn execute<'a>(&'a self, _ctx: &'a mut super::WorkflowContext) -> StepFuture<'a, serde_json::Value> {
        Box::pin(async move {
            self.services
                .authorize("account.unfreeze", self.account_id, &self.context)?;

            let reason = self.reason.clone();
            let authorized_by = self.context.actor.clone();
            self.services
                .mutate_ledger(self.account_id, move |ledger| {
                    ledger.unfreeze_account(reason.clone(), authorized_by.clone())
                })
                .await?;

            self.services.emit_audit(
                AuditRecord::new(
                    AuditAction::AccountUnfrozen,
                    &self.context,
                    self.services.clock.now(),
                )
                .account(self.account_id)
                .reason(self.reason.clone()),
            );

            Ok(json!({ "account_id": self.account_id }))
        })
    }

    fn compensate<'a>(&'a self, _ctx: &'a super::WorkflowContext) -> StepFuture<'a, ()> {
        Box::pin(async move {
            let authorized_by = self.context.actor.clone();
            self.services
                .mutate_ledger(self.account_id, move |ledger| {
                    ledger.freeze_account("unfreeze reversed by compensation", authorized_by.clone())
                })
                .await?;

            self.services.emit_audit(
                AuditRecord::new(
                    AuditAction::CompensationApplied,
                    &self.context,
                    self.services.clock.now(),
                )
                .account(self.account_id)
                .reason("unfreeze reversed"),
            );
            Ok(())
        })
    }
}

/// Deletes an account. Deletion requires a zero balance and has no
/// compensation: a deleted account stays deleted.
pub struct DeleteAccountActivity {
    services: Services,
    context: OperationContext,
    account_id: Uuid,
}

impl DeleteAccountActivity {
    pub fn new(services: Services, context: OperationContext, account_id: Uuid) -> Self {
        Self {
            services,
            context,
            account_id,
        }
    }
}

impl SagaStep for DeleteAccountActivity {
    fn name(&self) -> &str {
        "delete_account"
    }

    fn execute<'a>(&'a self, _ctx: &'a mut super::WorkflowContext) -> StepFuture<'a, serde_json::Value> {
        Box::pin(async move {
            self.services
                .authorize("account.delete", self.account_id, &self.context)?;

            let balance =
                TransactionAccount::retrieve(self.services.store.as_ref(), self.account_id)
                    .await?
                    .balance();
            if balance != Money::ZERO {
                return Err(DomainError::InvalidAmount(format!(
                    "account {} holds {balance}, balance must be zero before deletion",
                    self.account_id
                ))
                .into());
            }

            self.services
                .mutate_ledger(self.account_id, |ledger| ledger.delete_account())
                .await?;

            self.services.emit_audit(
                AuditRecord::new(
                    AuditAction::AccountDeleted,
                    &self.context,
                    self.services.clock.now(),
                )
                .account(self.account_id),
            );

            Ok(json!({ "account_id": self.account_id }))
        })
    }

    fn has_compensation(&self) -> bool {
        false
    }

    fn compensate<'a>(&'a self, _ctx: &'a super::WorkflowContext) -> StepFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }
}

// ==========================================================================
// Money movement activities
// ==========================================================================

/// Credits an account. Compensation withdraws the same amount.
pub struct DepositActivity {
    services: Services,
    context: OperationContext,
    account_id: Uuid,
    amount: Money,
    description: Option<String>,
}

impl DepositActivity {
    pub fn new(
        services: Services,
        context: OperationContext,
        account_id: Uuid,
        amount: Money,
        description: Option<String>,
    ) -> Self {
        Self {
            services,
            context,
            account_id,
            amount,
            description,
        }
    }
}

impl SagaStep for DepositActivity {
    fn name(&self) -> &str {
        "deposit"
    }

    fn execute<'a>(&'a self, _ctx: &'a mut super::WorkflowContext) -> StepFuture<'a, serde_json::Value> {
        Box::pin(async move {
            self.services
                .authorize("money.deposit", self.account_id, &self.context)?;

            let amount = self.amount;
            let description = self.description.clone();
            self.services
                .mutate_transaction(self.account_id, true, move |account| {
                    account.credit(amount, description.clone())
                })
                .await?;

            self.services.emit_audit(
                AuditRecord::new(
                    AuditAction::MoneyDeposited,
                    &self.context,
                    self.services.clock.now(),
                )
                .account(self.account_id)
                .amount(self.amount),
            );

            Ok(json!({ "account_id": self.account_id, "amount": self.amount }))
        })
    }

    fn compensate<'a>(&'a self, _ctx: &'a super::WorkflowContext) -> StepFuture<'a, ()> {
        Box::pin(async move {
            // Funds restoration takes precedence over lifecycle state:
            // the account may have been frozen since the deposit ran.
            let amount = self.amount;
            self.services
                .mutate_transaction(self.account_id, false, move |account| {
                    account.debit(amount, Some("deposit reversed by compensation".to_string()))
                })
                .await?;

            self.services.emit_audit(
                AuditRecord::new(
                    AuditAction::CompensationApplied,
                    &self.context,
                    self.services.clock.now(),
                )
                .account(self.account_id)
                .amount(self.amount)
                .reason("deposit reversed"),
            );
            Ok(())
        })
    }
}

/// Debits an account. Compensation deposits the amount back.
pub struct WithdrawActivity {
    services: Services,
    context: OperationContext,
    account_id: Uuid,
    amount: Money,
    description: Option<String>,
}

impl WithdrawActivity {
    pub fn new(
        services: Services,
        context: OperationContext,
        account_id: Uuid,
        amount: Money,
        description: Option<String>,
    ) -> Self {
        Self {
            services,
            context,
            account_id,
            amount,
            description,
        }
    }
}

impl SagaStep for WithdrawActivity {
    fn name(&self) -> &str {
        "withdraw"
    }

    fn execute<'a>(&'a self, _ctx: &'a mut super::WorkflowContext) -> StepFuture<'a, serde_json::Value> {
        Box::pin(async move {
            self.services
                .authorize("money.withdraw", self.account_id, &self.context)?;

            let amount = self.amount;
            let description = self.description.clone();
            self.services
                .mutate_transaction(self.account_id, true, move |account| {
                    account.debit(amount, description.clone())
                })
                .await?;

            self.services.emit_audit(
                AuditRecord::new(
                    AuditAction::MoneyWithdrawn,
                    &self.context,
                    self.services.clock.now(),
                )
                .account(self.account_id)
                .amount(self.amount),
            );

            Ok(json!({ "account_id": self.account_id, "amount": self.amount }))
        })
    }

    fn compensate<'a>(&'a self, _ctx: &'a super::WorkflowContext) -> StepFuture<'a, ()> {
        Box::pin(async move {
            let amount = self.amount;
            self.services
                .mutate_transaction(self.account_id, false, move |account| {
                    account.credit(amount, Some("withdrawal reversed by compensation".to_string()))
                })
                .await?;

            self.services.emit_audit(
                AuditRecord::new(
                    AuditAction::CompensationApplied,
                    &self.context,
                    self.services.clock.now(),
                )
                .account(self.account_id)
                .amount(self.amount)
                .reason("withdrawal reversed"),
            );
            Ok(())
        })
    }
}
