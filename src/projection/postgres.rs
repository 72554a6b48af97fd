//! Postgres projections
//!
//! One row per account in `account_balances`, updated in place after
//! each persisted event. Uses update-then-insert rather than upsert so
//! the common case is a single statement.

use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{LedgerEvent, Money, TransactionEvent};

use super::store::{AccountStatus, ProjFuture, ProjectionError, ProjectionStore};

/// Projection store backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgProjections {
    pool: PgPool,
}

impl PgProjections {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_row(&self, account_id: Uuid) -> Result<(), ProjectionError> {
        sqlx::query(
            r#"
            INSERT INTO account_balances (account_id, balance, frozen, deleted)
            VALUES ($1, 0, FALSE, FALSE)
            ON CONFLICT (account_id) DO NOTHING
            "#,
        )
        .bind(account_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn adjust_balance(&self, account_id: Uuid, delta: i64) -> Result<(), ProjectionError> {
        let rows = sqlx::query(
            r#"
            UPDATE account_balances
            SET balance = balance + $2, updated_at = NOW()
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .bind(delta)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            sqlx::query(
                r#"
                INSERT INTO account_balances (account_id, balance, frozen, deleted)
                VALUES ($1, $2, FALSE, FALSE)
                "#,
            )
            .bind(account_id)
            .bind(delta)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn set_frozen(&self, account_id: Uuid, frozen: bool) -> Result<(), ProjectionError> {
        sqlx::query(
            r#"
            UPDATE account_balances
            SET frozen = $2, updated_at = NOW()
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .bind(frozen)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_deleted(&self, account_id: Uuid) -> Result<(), ProjectionError> {
        sqlx::query(
            r#"
            UPDATE account_balances
            SET deleted = TRUE, updated_at = NOW()
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl ProjectionStore for PgProjections {
    fn apply_ledger(&self, account_id: Uuid, event: LedgerEvent) -> ProjFuture<'_, ()> {
        Box::pin(async move {
            match event {
                LedgerEvent::AccountCreated { .. } => self.ensure_row(account_id).await,
                LedgerEvent::AccountFrozen { .. } => self.set_frozen(account_id, true).await,
                LedgerEvent::AccountUnfrozen { .. } => self.set_frozen(account_id, false).await,
                LedgerEvent::AccountDeleted => self.set_deleted(account_id).await,
            }
        })
    }

    fn apply_transaction(&self, account_id: Uuid, event: TransactionEvent) -> ProjFuture<'_, ()> {
        Box::pin(async move {
            let delta = match event {
                TransactionEvent::MoneyAdded { amount, .. } => amount.minor_units(),
                TransactionEvent::MoneySubtracted { amount, .. } => -amount.minor_units(),
            };
            self.adjust_balance(account_id, delta).await
        })
    }

    fn balance(&self, account_id: Uuid) -> ProjFuture<'_, Option<Money>> {
        Box::pin(async move {
            let balance: Option<i64> = sqlx::query_scalar(
                r#"
                SELECT balance FROM account_balances WHERE account_id = $1
                "#,
            )
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;

            Ok(balance.map(Money::new))
        })
    }

    fn status(&self, account_id: Uuid) -> ProjFuture<'_, Option<AccountStatus>> {
        Box::pin(async move {
            let row: Option<(i64, bool, bool)> = sqlx::query_as(
                r#"
                SELECT balance, frozen, deleted
                FROM account_balances
                WHERE account_id = $1
                "#,
            )
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;

            Ok(row.map(|(balance, frozen, deleted)| AccountStatus {
                exists: true,
                frozen,
                deleted,
                balance: Money::new(balance),
            }))
        })
    }

    fn account_ids(&self) -> ProjFuture<'_, Vec<Uuid>> {
        Box::pin(async move {
            let ids: Vec<Uuid> = sqlx::query_scalar(
                r#"
                SELECT account_id FROM account_balances ORDER BY account_id
                "#,
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(ids)
        })
    }
}
