//! Workflow engine facade
//!
//! The narrow surface collaborators call: start a saga, read a
//! projected balance, verify an account's hash chain. Everything else
//! stays behind this boundary.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{DomainError, Money, OperationContext};
use crate::event_store::ChainVerification;
use crate::idempotency::SharedDeduplication;
use crate::workflow::{
    bulk_transfer_saga, reverse_transaction_saga, run_batch, transfer_saga, BatchConfig,
    BatchOperation, BatchRunner, BatchStores, CreateAccountActivity, DeleteAccountActivity,
    DepositActivity, FreezeAccountActivity, Saga, SagaError, Services, UnfreezeAccountActivity,
    WithdrawActivity, WorkflowContext, WorkflowError,
};

/// One leg of a bulk transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferLeg {
    pub to: Uuid,
    pub amount: Money,
}

/// Saga types callers can start.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SagaRequest {
    CreateAccount {
        account_id: Uuid,
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        owner: Option<String>,
    },
    FreezeAccount {
        account_id: Uuid,
        reason: String,
    },
    UnfreezeAccount {
        account_id: Uuid,
        reason: String,
    },
    DeleteAccount {
        account_id: Uuid,
    },
    Deposit {
        account_id: Uuid,
        amount: Money,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Withdraw {
        account_id: Uuid,
        amount: Money,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Transfer {
        from: Uuid,
        to: Uuid,
        amount: Money,
    },
    BulkTransfer {
        from: Uuid,
        transfers: Vec<TransferLeg>,
    },
    ReverseTransaction {
        original_from: Uuid,
        original_to: Uuid,
        amount: Money,
    },
    BatchProcess {
        #[serde(skip_serializing_if = "Option::is_none")]
        operations: Option<Vec<BatchOperation>>,
    },
}

/// Successful saga result returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaOutcome {
    pub saga_id: Uuid,
    pub saga: String,
    pub output: serde_json::Value,
}

/// The ledger core's caller-facing facade.
#[derive(Clone)]
pub struct WorkflowEngine {
    services: Services,
    batch: Arc<BatchRunner>,
    dedup: SharedDeduplication,
}

impl WorkflowEngine {
    pub fn new(
        services: Services,
        batch_stores: BatchStores,
        batch_config: BatchConfig,
        dedup: SharedDeduplication,
    ) -> Self {
        let batch = Arc::new(BatchRunner::new(
            services.clone(),
            batch_stores,
            batch_config,
        ));
        Self {
            services,
            batch,
            dedup,
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn batch_runner(&self) -> &Arc<BatchRunner> {
        &self.batch
    }

    /// Start a saga, optionally guarded by a deduplication key.
    ///
    /// A retried saga whose key already has a recorded outcome returns
    /// that outcome without re-running any step. Failed sagas are not
    /// recorded, so retries under the same key re-execute.
    pub async fn start_saga(
        &self,
        request: SagaRequest,
        context: OperationContext,
        dedup_key: Option<String>,
    ) -> Result<SagaOutcome, SagaError> {
        if let Some(key) = &dedup_key {
            if let Some(previous) = self.dedup.get(key).await {
                tracing::info!(key = %key, saga_id = %previous.saga_id, "duplicate saga suppressed");
                return Ok(previous);
            }
        }

        let outcome = match request {
            SagaRequest::BatchProcess { operations } => {
                let operations =
                    operations.unwrap_or_else(|| BatchOperation::standard_set().to_vec());
                let summary = run_batch(self.batch.clone(), &context, &operations).await?;
                SagaOutcome {
                    saga_id: summary.batch_id,
                    saga: "batch_processing".to_string(),
                    output: serde_json::to_value(&summary).unwrap_or_default(),
                }
            }
            other => {
                let name = request_name(&other);
                let mut saga = self
                    .build_saga(other, &context)
                    .map_err(|e| build_failure(name, e))?;
                let mut ctx = WorkflowContext::new();
                let output = saga.run(&mut ctx).await?;
                SagaOutcome {
                    saga_id: saga.id(),
                    saga: saga.name().to_string(),
                    output,
                }
            }
        };

        if let Some(key) = dedup_key {
            self.dedup.put(key, outcome.clone()).await;
        }
        Ok(outcome)
    }

    fn build_saga(
        &self,
        request: SagaRequest,
        context: &OperationContext,
    ) -> Result<Saga, DomainError> {
        let services = &self.services;
        let saga = match request {
            SagaRequest::CreateAccount {
                account_id,
                name,
                owner,
            } => Saga::new("create_account").step(Box::new(CreateAccountActivity::new(
                services.clone(),
                context.clone(),
                account_id,
                name,
                owner,
            ))),
            SagaRequest::FreezeAccount { account_id, reason } => Saga::new("freeze_account")
                .step(Box::new(FreezeAccountActivity::new(
                    services.clone(),
                    context.clone(),
                    account_id,
                    reason,
                ))),
            SagaRequest::UnfreezeAccount { account_id, reason } => Saga::new("unfreeze_account")
                .step(Box::new(UnfreezeAccountActivity::new(
                    services.clone(),
                    context.clone(),
                    account_id,
                    reason,
                ))),
            SagaRequest::DeleteAccount { account_id } => Saga::new("delete_account").step(
                Box::new(DeleteAccountActivity::new(
                    services.clone(),
                    context.clone(),
                    account_id,
                )),
            ),
            SagaRequest::Deposit {
                account_id,
                amount,
                description,
            } => Saga::new("deposit").step(Box::new(DepositActivity::new(
                services.clone(),
                context.clone(),
                account_id,
                amount,
                description,
            ))),
            SagaRequest::Withdraw {
                account_id,
                amount,
                description,
            } => Saga::new("withdraw").step(Box::new(WithdrawActivity::new(
                services.clone(),
                context.clone(),
                account_id,
                amount,
                description,
            ))),
            SagaRequest::Transfer { from, to, amount } => {
                transfer_saga(services, context, from, to, amount)?
            }
            SagaRequest::BulkTransfer { from, transfers } => {
                let pairs: Vec<(Uuid, Money)> =
                    transfers.into_iter().map(|leg| (leg.to, leg.amount)).collect();
                bulk_transfer_saga(services, context, from, &pairs)?
            }
            SagaRequest::ReverseTransaction {
                original_from,
                original_to,
                amount,
            } => reverse_transaction_saga(services, context, original_from, original_to, amount)?,
            SagaRequest::BatchProcess { .. } => {
                // Handled in start_saga
                unreachable!("batch requests do not reach build_saga")
            }
        };
        Ok(saga)
    }

    /// Projected balance for an account.
    pub async fn balance(&self, account_id: Uuid) -> Result<Money, WorkflowError> {
        self.services
            .projections
            .balance(account_id)
            .await?
            .ok_or_else(|| DomainError::AccountNotFound(account_id).into())
    }

    /// Recompute the account's hash chain and report the result.
    pub async fn verify_ledger(
        &self,
        account_id: Uuid,
    ) -> Result<ChainVerification, WorkflowError> {
        Ok(self.services.store.verify_chain(account_id).await?)
    }

    /// Whether the account's hash chain is intact.
    pub async fn verify_ledger_integrity(&self, account_id: Uuid) -> Result<bool, WorkflowError> {
        Ok(self.verify_ledger(account_id).await?.is_valid)
    }
}

fn request_name(request: &SagaRequest) -> &'static str {
    match request {
        SagaRequest::CreateAccount { .. } => "create_account",
        SagaRequest::FreezeAccount { .. } => "freeze_account",
        SagaRequest::UnfreezeAccount { .. } => "unfreeze_account",
        SagaRequest::DeleteAccount { .. } => "delete_account",
        SagaRequest::Deposit { .. } => "deposit",
        SagaRequest::Withdraw { .. } => "withdraw",
        SagaRequest::Transfer { .. } => "transfer",
        SagaRequest::BulkTransfer { .. } => "bulk_transfer",
        SagaRequest::ReverseTransaction { .. } => "reverse_transaction",
        SagaRequest::BatchProcess { .. } => "batch_processing",
    }
}

fn build_failure(saga: &str, error: DomainError) -> SagaError {
    SagaError {
        saga_id: Uuid::new_v4(),
        saga: saga.to_string(),
        root_cause: WorkflowError::Domain(error),
        compensation: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idempotency::MemoryDeduplicationStore;

    fn test_engine() -> WorkflowEngine {
        WorkflowEngine::new(
            Services::in_memory(),
            BatchStores::new(),
            BatchConfig::default(),
            Arc::new(MemoryDeduplicationStore::new()),
        )
    }

    #[tokio::test]
    async fn test_create_deposit_and_balance() {
        let engine = test_engine();
        let id = Uuid::new_v4();
        let ctx = OperationContext::new().with_actor("alice");

        engine
            .start_saga(
                SagaRequest::CreateAccount {
                    account_id: id,
                    name: "checking".to_string(),
                    owner: Some("alice".to_string()),
                },
                ctx.clone(),
                None,
            )
            .await
            .unwrap();

        engine
            .start_saga(
                SagaRequest::Deposit {
                    account_id: id,
                    amount: Money::new(2_500),
                    description: None,
                },
                ctx,
                None,
            )
            .await
            .unwrap();

        assert_eq!(engine.balance(id).await.unwrap(), Money::new(2_500));
        assert!(engine.verify_ledger_integrity(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_balance_of_unknown_account_fails() {
        let engine = test_engine();
        let err = engine.balance(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Domain(DomainError::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_dedup_key_suppresses_duplicate_saga() {
        let engine = test_engine();
        let id = Uuid::new_v4();
        let ctx = OperationContext::new();

        engine
            .start_saga(
                SagaRequest::CreateAccount {
                    account_id: id,
                    name: "a".to_string(),
                    owner: None,
                },
                ctx.clone(),
                None,
            )
            .await
            .unwrap();

        let deposit = SagaRequest::Deposit {
            account_id: id,
            amount: Money::new(100),
            description: None,
        };
        let first = engine
            .start_saga(deposit.clone(), ctx.clone(), Some("dep-1".to_string()))
            .await
            .unwrap();
        let second = engine
            .start_saga(deposit, ctx, Some("dep-1".to_string()))
            .await
            .unwrap();

        // Same outcome, and the deposit applied once
        assert_eq!(first.saga_id, second.saga_id);
        assert_eq!(engine.balance(id).await.unwrap(), Money::new(100));
    }

    #[tokio::test]
    async fn test_failed_saga_not_recorded_for_dedup() {
        let engine = test_engine();
        let id = Uuid::new_v4();
        let ctx = OperationContext::new();

        // Deposit to a missing account fails
        let deposit = SagaRequest::Deposit {
            account_id: id,
            amount: Money::new(100),
            description: None,
        };
        engine
            .start_saga(deposit.clone(), ctx.clone(), Some("k".to_string()))
            .await
            .unwrap_err();

        // After creating the account, the same key retries for real
        engine
            .start_saga(
                SagaRequest::CreateAccount {
                    account_id: id,
                    name: "a".to_string(),
                    owner: None,
                },
                ctx.clone(),
                None,
            )
            .await
            .unwrap();
        engine
            .start_saga(deposit, ctx, Some("k".to_string()))
            .await
            .unwrap();
        assert_eq!(engine.balance(id).await.unwrap(), Money::new(100));
    }

    #[tokio::test]
    async fn test_same_account_transfer_surfaces_validation_error() {
        let engine = test_engine();
        let id = Uuid::new_v4();
        let err = engine
            .start_saga(
                SagaRequest::Transfer {
                    from: id,
                    to: id,
                    amount: Money::new(1),
                },
                OperationContext::new(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err.root_cause,
            WorkflowError::Domain(DomainError::SameAccountTransfer)
        ));
        assert!(err.compensation.records.is_empty());
    }
}
