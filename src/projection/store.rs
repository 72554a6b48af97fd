//! Projection store abstraction

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{LedgerEvent, Money, TransactionEvent};

/// Boxed future returned by projection methods.
pub type ProjFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, ProjectionError>> + Send + 'a>>;

/// Read-model view of one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountStatus {
    pub exists: bool,
    pub frozen: bool,
    pub deleted: bool,
    pub balance: Money,
}

impl Default for AccountStatus {
    fn default() -> Self {
        Self {
            exists: false,
            frozen: false,
            deleted: false,
            balance: Money::ZERO,
        }
    }
}

/// Projection errors
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),
}

/// Read models fed by persisted events.
///
/// `apply_*` are called after a successful append, in event order.
/// Both are idempotence-tolerant only in the sense that callers apply
/// each persisted event exactly once; replays go through a rebuild.
pub trait ProjectionStore: Send + Sync {
    /// Fold a lifecycle event into the account's read model.
    fn apply_ledger(&self, account_id: Uuid, event: LedgerEvent) -> ProjFuture<'_, ()>;

    /// Fold a balance movement into the account's read model.
    fn apply_transaction(&self, account_id: Uuid, event: TransactionEvent) -> ProjFuture<'_, ()>;

    /// Current balance, or `None` for an unknown account.
    fn balance(&self, account_id: Uuid) -> ProjFuture<'_, Option<Money>>;

    /// Full read-model status, or `None` for an unknown account.
    fn status(&self, account_id: Uuid) -> ProjFuture<'_, Option<AccountStatus>>;

    /// All account ids the projection has seen.
    fn account_ids(&self) -> ProjFuture<'_, Vec<Uuid>>;
}

/// Pure fold shared by the projection backends.
pub(crate) fn fold_ledger(status: &mut AccountStatus, event: &LedgerEvent) {
    match event {
        LedgerEvent::AccountCreated { .. } => status.exists = true,
        LedgerEvent::AccountFrozen { .. } => status.frozen = true,
        LedgerEvent::AccountUnfrozen { .. } => status.frozen = false,
        LedgerEvent::AccountDeleted => status.deleted = true,
    }
}

pub(crate) fn fold_transaction(status: &mut AccountStatus, event: &TransactionEvent) {
    match event {
        TransactionEvent::MoneyAdded { amount, .. } => {
            status.balance = status.balance.try_add(*amount).unwrap_or(status.balance);
        }
        TransactionEvent::MoneySubtracted { amount, .. } => {
            status.balance = status.balance.try_sub(*amount).unwrap_or(status.balance);
        }
    }
}
