//! Batch reversal activities
//!
//! One reversal per operation kind, driven purely by the operation's
//! recorded result payload: reversals target exactly the rows, files,
//! and flags the original run created or replaced. State that cannot
//! be cleanly reversed is logged and skipped rather than corrupted
//! further.

use serde_json::Value;

use crate::domain::DomainError;

use super::batch::{
    ArchiveResult, BatchOperation, BatchRunner, ComplianceResult, InterestResult,
    RegulatoryResult, StatementResult, TurnoverResult,
};
use super::error::WorkflowError;

impl BatchRunner {
    /// Reverse a completed operation from its recorded result.
    pub async fn reverse(
        &self,
        operation: BatchOperation,
        result: &Value,
    ) -> Result<(), WorkflowError> {
        tracing::info!(operation = %operation, "reversing batch operation");
        match operation {
            BatchOperation::CalculateDailyTurnover => self.reverse_turnover(result).await,
            BatchOperation::GenerateAccountStatements => self.reverse_statements(result).await,
            BatchOperation::ProcessInterestCalculations => self.reverse_interest(result).await,
            BatchOperation::PerformComplianceChecks => self.reverse_compliance(result).await,
            BatchOperation::ArchiveOldTransactions => self.reverse_archive(result).await,
            BatchOperation::GenerateRegulatoryReports => self.reverse_regulatory(result).await,
        }
    }

    /// Delete created turnover rows; restore rows the upsert replaced.
    async fn reverse_turnover(&self, result: &Value) -> Result<(), WorkflowError> {
        let turnover: TurnoverResult = serde_json::from_value(result.clone())?;

        for entry in turnover.rows {
            match entry.prior {
                Some(prior) => {
                    self.stores.turnover.upsert(prior).await;
                }
                None => {
                    if self
                        .stores
                        .turnover
                        .remove(entry.account_id, turnover.date)
                        .await
                        .is_none()
                    {
                        tracing::warn!(
                            account_id = %entry.account_id,
                            date = %turnover.date,
                            "turnover row already gone, skipping"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Delete the generated statement documents.
    async fn reverse_statements(&self, result: &Value) -> Result<(), WorkflowError> {
        let statements: StatementResult = serde_json::from_value(result.clone())?;

        for key in statements.keys {
            if !self.stores.reports.remove(&key).await {
                tracing::warn!(key = %key, "statement already gone, skipping");
            }
        }
        Ok(())
    }

    /// Debit back the credited interest. An account that has since
    /// spent the interest cannot cleanly absorb the debit; that case
    /// is logged and skipped.
    async fn reverse_interest(&self, result: &Value) -> Result<(), WorkflowError> {
        let interest: InterestResult = serde_json::from_value(result.clone())?;

        for credit in interest.credits {
            let amount = credit.amount;
            let reversal = self
                .services
                .mutate_transaction(credit.account_id, false, move |account| {
                    account.debit(amount, Some("interest accrual reversed".to_string()))
                })
                .await;

            match reversal {
                Ok(_) => {}
                Err(WorkflowError::Domain(DomainError::InsufficientFunds { .. })) => {
                    tracing::warn!(
                        account_id = %credit.account_id,
                        amount = %credit.amount,
                        "interest already spent, cannot reverse cleanly"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Delete the compliance findings document.
    async fn reverse_compliance(&self, result: &Value) -> Result<(), WorkflowError> {
        let compliance: ComplianceResult = serde_json::from_value(result.clone())?;
        if !self.stores.reports.remove(&compliance.key).await {
            tracing::warn!(key = %compliance.key, "compliance report already gone, skipping");
        }
        Ok(())
    }

    /// Unarchive exactly the event ids the run archived.
    async fn reverse_archive(&self, result: &Value) -> Result<(), WorkflowError> {
        let archive: ArchiveResult = serde_json::from_value(result.clone())?;
        self.stores.archive.unarchive(&archive.archived).await;
        Ok(())
    }

    /// Delete the regulatory report document.
    async fn reverse_regulatory(&self, result: &Value) -> Result<(), WorkflowError> {
        let regulatory: RegulatoryResult = serde_json::from_value(result.clone())?;
        if !self.stores.reports.remove(&regulatory.key).await {
            tracing::warn!(key = %regulatory.key, "regulatory report already gone, skipping");
        }
        Ok(())
    }
}
