//! In-memory projections

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{LedgerEvent, Money, TransactionEvent};

use super::store::{
    fold_ledger, fold_transaction, AccountStatus, ProjFuture, ProjectionStore,
};

/// Projection store backed by a process-local map.
#[derive(Clone, Default)]
pub struct InMemoryProjections {
    accounts: Arc<RwLock<HashMap<Uuid, AccountStatus>>>,
}

impl InMemoryProjections {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProjectionStore for InMemoryProjections {
    fn apply_ledger(&self, account_id: Uuid, event: LedgerEvent) -> ProjFuture<'_, ()> {
        Box::pin(async move {
            let mut accounts = self.accounts.write().await;
            let status = accounts.entry(account_id).or_default();
            fold_ledger(status, &event);
            Ok(())
        })
    }

    fn apply_transaction(&self, account_id: Uuid, event: TransactionEvent) -> ProjFuture<'_, ()> {
        Box::pin(async move {
            let mut accounts = self.accounts.write().await;
            let status = accounts.entry(account_id).or_default();
            fold_transaction(status, &event);
            Ok(())
        })
    }

    fn balance(&self, account_id: Uuid) -> ProjFuture<'_, Option<Money>> {
        Box::pin(async move {
            let accounts = self.accounts.read().await;
            Ok(accounts.get(&account_id).map(|s| s.balance))
        })
    }

    fn status(&self, account_id: Uuid) -> ProjFuture<'_, Option<AccountStatus>> {
        Box::pin(async move {
            let accounts = self.accounts.read().await;
            Ok(accounts.get(&account_id).copied())
        })
    }

    fn account_ids(&self) -> ProjFuture<'_, Vec<Uuid>> {
        Box::pin(async move {
            let accounts = self.accounts.read().await;
            Ok(accounts.keys().copied().collect())
        })
    }
}
