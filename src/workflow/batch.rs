//! End-of-day batch saga
//!
//! Runs the standard settlement operations in order. Each operation
//! records what it created so its reversal can target exactly those
//! records; a failure compensates the completed operations in reverse
//! and surfaces the original error. Operations after the failed one
//! never run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditRecord};
use crate::domain::{Money, OperationContext, TransactionEvent};

use super::activities::Services;
use super::error::WorkflowError;
use super::saga::{Saga, SagaError, SagaStep, StepFuture};
use super::WorkflowContext;

// ==========================================================================
// Operations
// ==========================================================================

/// The standard end-of-day operation set, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOperation {
    CalculateDailyTurnover,
    GenerateAccountStatements,
    ProcessInterestCalculations,
    PerformComplianceChecks,
    ArchiveOldTransactions,
    GenerateRegulatoryReports,
}

impl BatchOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CalculateDailyTurnover => "calculate_daily_turnover",
            Self::GenerateAccountStatements => "generate_account_statements",
            Self::ProcessInterestCalculations => "process_interest_calculations",
            Self::PerformComplianceChecks => "perform_compliance_checks",
            Self::ArchiveOldTransactions => "archive_old_transactions",
            Self::GenerateRegulatoryReports => "generate_regulatory_reports",
        }
    }

    /// The full standard set, in order.
    pub fn standard_set() -> [Self; 6] {
        [
            Self::CalculateDailyTurnover,
            Self::GenerateAccountStatements,
            Self::ProcessInterestCalculations,
            Self::PerformComplianceChecks,
            Self::ArchiveOldTransactions,
            Self::GenerateRegulatoryReports,
        ]
    }
}

impl std::fmt::Display for BatchOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOperationStatus {
    Success,
    Failed,
}

/// What one batch operation did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOperationRecord {
    pub operation: String,
    pub status: BatchOperationStatus,
    pub result: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// Consolidated result of a fully successful batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: Uuid,
    pub total_operations: usize,
    pub successful_operations: usize,
    pub failed_operations: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: i64,
    pub results: Vec<BatchOperationRecord>,
}

impl BatchSummary {
    /// Aggregate per-operation records. Duration spans the earliest
    /// start to the latest end, not a sum, since operations may run
    /// concurrently in a future extension.
    pub fn from_records(batch_id: Uuid, records: Vec<BatchOperationRecord>) -> Option<Self> {
        let start_time = records.iter().map(|r| r.started_at).min()?;
        let end_time = records.iter().map(|r| r.ended_at).max()?;
        let successful = records
            .iter()
            .filter(|r| r.status == BatchOperationStatus::Success)
            .count();

        Some(Self {
            batch_id,
            total_operations: records.len(),
            successful_operations: successful,
            failed_operations: records.len() - successful,
            start_time,
            end_time,
            duration_seconds: (end_time - start_time).num_seconds(),
            results: records,
        })
    }
}

// ==========================================================================
// Batch read-model stores
// ==========================================================================

/// One per-account, per-day turnover row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnoverRow {
    pub account_id: Uuid,
    pub date: NaiveDate,
    pub debit: Money,
    pub credit: Money,
}

/// Per-account daily turnover rows, keyed by `(account_id, date)`.
///
/// `upsert` returns the prior row so updates are fully reversible.
#[derive(Debug, Clone, Default)]
pub struct TurnoverStore {
    rows: Arc<RwLock<HashMap<(Uuid, NaiveDate), TurnoverRow>>>,
}

impl TurnoverStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a row; returns the row it replaced, if any.
    pub async fn upsert(&self, row: TurnoverRow) -> Option<TurnoverRow> {
        let mut rows = self.rows.write().await;
        rows.insert((row.account_id, row.date), row)
    }

    pub async fn get(&self, account_id: Uuid, date: NaiveDate) -> Option<TurnoverRow> {
        let rows = self.rows.read().await;
        rows.get(&(account_id, date)).cloned()
    }

    pub async fn remove(&self, account_id: Uuid, date: NaiveDate) -> Option<TurnoverRow> {
        let mut rows = self.rows.write().await;
        rows.remove(&(account_id, date))
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

/// Named JSON documents produced by batch operations (statements,
/// compliance findings, regulatory reports).
#[derive(Debug, Clone, Default)]
pub struct ReportStore {
    docs: Arc<RwLock<HashMap<String, serde_json::Value>>>,
}

impl ReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, key: impl Into<String>, doc: serde_json::Value) {
        let mut docs = self.docs.write().await;
        docs.insert(key.into(), doc);
    }

    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let docs = self.docs.read().await;
        docs.get(key).cloned()
    }

    pub async fn remove(&self, key: &str) -> bool {
        let mut docs = self.docs.write().await;
        docs.remove(key).is_some()
    }

    pub async fn contains(&self, key: &str) -> bool {
        let docs = self.docs.read().await;
        docs.contains_key(key)
    }

    pub async fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let docs = self.docs.read().await;
        docs.keys().filter(|k| k.starts_with(prefix)).cloned().collect()
    }
}

/// Archive flags per event id. Flipping the flag never alters event
/// content; the event log itself stays append-only.
#[derive(Debug, Clone, Default)]
pub struct ArchiveIndex {
    flags: Arc<RwLock<HashSet<Uuid>>>,
}

impl ArchiveIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag events as archived; returns the ids that were newly
    /// flagged (already-archived ids are not claimed again).
    pub async fn archive(&self, event_ids: &[Uuid]) -> Vec<Uuid> {
        let mut flags = self.flags.write().await;
        event_ids
            .iter()
            .filter(|id| flags.insert(**id))
            .copied()
            .collect()
    }

    pub async fn unarchive(&self, event_ids: &[Uuid]) {
        let mut flags = self.flags.write().await;
        for id in event_ids {
            flags.remove(id);
        }
    }

    pub async fn is_archived(&self, event_id: Uuid) -> bool {
        let flags = self.flags.read().await;
        flags.contains(&event_id)
    }

    pub async fn archived_count(&self) -> usize {
        self.flags.read().await.len()
    }
}

/// The batch read-model stores as one bundle.
#[derive(Debug, Clone, Default)]
pub struct BatchStores {
    pub turnover: TurnoverStore,
    pub reports: ReportStore,
    pub archive: ArchiveIndex,
}

impl BatchStores {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Tunables for the standard operations.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Daily interest in basis points applied to positive balances
    pub interest_rate_bps: i64,
    /// Single movements at or above this amount are flagged
    pub compliance_threshold: Money,
    /// Events older than this many days get the archive flag
    pub archive_after_days: i64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            interest_rate_bps: 5,
            compliance_threshold: Money::new(1_000_000),
            archive_after_days: 90,
        }
    }
}

// ==========================================================================
// Typed operation results (recorded, and consumed by reversals)
// ==========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnoverEntry {
    pub account_id: Uuid,
    pub debit: Money,
    pub credit: Money,
    /// Row this upsert replaced, captured so the update is reversible
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior: Option<TurnoverRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnoverResult {
    pub date: NaiveDate,
    pub rows: Vec<TurnoverEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementResult {
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterestCredit {
    pub account_id: Uuid,
    pub amount: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterestResult {
    pub credits: Vec<InterestCredit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceResult {
    pub key: String,
    pub flagged: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveResult {
    pub archived: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegulatoryResult {
    pub key: String,
}

// ==========================================================================
// Runner
// ==========================================================================

/// Executes and reverses the standard batch operations.
pub struct BatchRunner {
    pub(crate) services: Services,
    pub(crate) stores: BatchStores,
    pub(crate) config: BatchConfig,
}

impl BatchRunner {
    pub fn new(services: Services, stores: BatchStores, config: BatchConfig) -> Self {
        Self {
            services,
            stores,
            config,
        }
    }

    pub fn stores(&self) -> &BatchStores {
        &self.stores
    }

    async fn run_operation(
        &self,
        operation: BatchOperation,
        date: NaiveDate,
    ) -> Result<serde_json::Value, WorkflowError> {
        match operation {
            BatchOperation::CalculateDailyTurnover => self.calculate_daily_turnover(date).await,
            BatchOperation::GenerateAccountStatements => {
                self.generate_account_statements(date).await
            }
            BatchOperation::ProcessInterestCalculations => {
                self.process_interest_calculations(date).await
            }
            BatchOperation::PerformComplianceChecks => self.perform_compliance_checks(date).await,
            BatchOperation::ArchiveOldTransactions => self.archive_old_transactions(date).await,
            BatchOperation::GenerateRegulatoryReports => {
                self.generate_regulatory_reports(date).await
            }
        }
    }

    /// Sum the day's movements per account and upsert turnover rows.
    async fn calculate_daily_turnover(
        &self,
        date: NaiveDate,
    ) -> Result<serde_json::Value, WorkflowError> {
        let mut rows = Vec::new();

        for account_id in self.services.projections.account_ids().await? {
            let mut debit = Money::ZERO;
            let mut credit = Money::ZERO;

            for record in self.services.store.load_events(account_id).await? {
                if record.recorded_at.date_naive() != date {
                    continue;
                }
                if let Ok(event) =
                    serde_json::from_value::<TransactionEvent>(record.payload.clone())
                {
                    match event {
                        TransactionEvent::MoneyAdded { amount, .. } => {
                            credit = credit.try_add(amount).unwrap_or(credit);
                        }
                        TransactionEvent::MoneySubtracted { amount, .. } => {
                            debit = debit.try_add(amount).unwrap_or(debit);
                        }
                    }
                }
            }

            if debit == Money::ZERO && credit == Money::ZERO {
                continue;
            }

            let prior = self
                .stores
                .turnover
                .upsert(TurnoverRow {
                    account_id,
                    date,
                    debit,
                    credit,
                })
                .await;
            rows.push(TurnoverEntry {
                account_id,
                debit,
                credit,
                prior,
            });
        }

        tracing::info!(date = %date, rows = rows.len(), "daily turnover calculated");
        Ok(serde_json::to_value(TurnoverResult { date, rows })?)
    }

    /// Write one statement document per account with activity today.
    async fn generate_account_statements(
        &self,
        date: NaiveDate,
    ) -> Result<serde_json::Value, WorkflowError> {
        let mut keys = Vec::new();

        for account_id in self.services.projections.account_ids().await? {
            let mut lines = Vec::new();
            for record in self.services.store.load_events(account_id).await? {
                if record.recorded_at.date_naive() != date {
                    continue;
                }
                lines.push(json!({
                    "version": record.version,
                    "event_type": record.event_type,
                    "payload": record.payload,
                    "recorded_at": record.recorded_at,
                }));
            }
            if lines.is_empty() {
                continue;
            }

            let closing = self
                .services
                .projections
                .balance(account_id)
                .await?
                .unwrap_or(Money::ZERO);
            let key = format!("statement:{date}:{account_id}");
            self.stores
                .reports
                .insert(
                    key.clone(),
                    json!({
                        "account_id": account_id,
                        "date": date,
                        "closing_balance": closing,
                        "lines": lines,
                    }),
                )
                .await;
            keys.push(key);
        }

        tracing::info!(date = %date, statements = keys.len(), "account statements generated");
        Ok(serde_json::to_value(StatementResult { keys })?)
    }

    /// Credit daily interest on positive balances.
    async fn process_interest_calculations(
        &self,
        date: NaiveDate,
    ) -> Result<serde_json::Value, WorkflowError> {
        let mut credits = Vec::new();

        for account_id in self.services.projections.account_ids().await? {
            let Some(status) = self.services.projections.status(account_id).await? else {
                continue;
            };
            if status.frozen || status.deleted || status.balance <= Money::ZERO {
                continue;
            }

            let interest = Money::new(
                status.balance.minor_units() * self.config.interest_rate_bps / 10_000,
            );
            if interest == Money::ZERO {
                continue;
            }

            let description = Some(format!("interest accrual {date}"));
            self.services
                .mutate_transaction(account_id, true, move |account| {
                    account.credit(interest, description.clone())
                })
                .await?;
            credits.push(InterestCredit {
                account_id,
                amount: interest,
            });
        }

        tracing::info!(date = %date, credits = credits.len(), "interest credited");
        Ok(serde_json::to_value(InterestResult { credits })?)
    }

    /// Flag the day's movements at or above the compliance threshold.
    async fn perform_compliance_checks(
        &self,
        date: NaiveDate,
    ) -> Result<serde_json::Value, WorkflowError> {
        let mut flagged = Vec::new();

        for account_id in self.services.projections.account_ids().await? {
            for record in self.services.store.load_events(account_id).await? {
                if record.recorded_at.date_naive() != date {
                    continue;
                }
                if let Ok(event) =
                    serde_json::from_value::<TransactionEvent>(record.payload.clone())
                {
                    if event.amount() >= self.config.compliance_threshold {
                        flagged.push(json!({
                            "account_id": account_id,
                            "event_type": event.event_type(),
                            "amount": event.amount(),
                            "version": record.version,
                        }));
                    }
                }
            }
        }

        let key = format!("compliance:{date}");
        let count = flagged.len();
        self.stores
            .reports
            .insert(
                key.clone(),
                json!({ "date": date, "threshold": self.config.compliance_threshold, "flagged": flagged }),
            )
            .await;

        tracing::info!(date = %date, flagged = count, "compliance checks performed");
        Ok(serde_json::to_value(ComplianceResult { key, flagged: count })?)
    }

    /// Flag events older than the retention window as archived.
    async fn archive_old_transactions(
        &self,
        date: NaiveDate,
    ) -> Result<serde_json::Value, WorkflowError> {
        let cutoff = date - chrono::Duration::days(self.config.archive_after_days);
        let mut candidates = Vec::new();

        for account_id in self.services.projections.account_ids().await? {
            for record in self.services.store.load_events(account_id).await? {
                if record.recorded_at.date_naive() < cutoff {
                    candidates.push(record.id);
                }
            }
        }

        let archived = self.stores.archive.archive(&candidates).await;
        tracing::info!(date = %date, archived = archived.len(), "old transactions archived");
        Ok(serde_json::to_value(ArchiveResult { archived })?)
    }

    /// Write the day's regulatory totals document.
    async fn generate_regulatory_reports(
        &self,
        date: NaiveDate,
    ) -> Result<serde_json::Value, WorkflowError> {
        let mut total_balance = Money::ZERO;
        let mut frozen_accounts = 0_usize;
        let account_ids = self.services.projections.account_ids().await?;

        for account_id in &account_ids {
            if let Some(status) = self.services.projections.status(*account_id).await? {
                total_balance = total_balance.try_add(status.balance).unwrap_or(total_balance);
                if status.frozen {
                    frozen_accounts += 1;
                }
            }
        }

        let key = format!("regulatory:{date}");
        self.stores
            .reports
            .insert(
                key.clone(),
                json!({
                    "date": date,
                    "total_accounts": account_ids.len(),
                    "frozen_accounts": frozen_accounts,
                    "total_balance": total_balance,
                }),
            )
            .await;

        tracing::info!(date = %date, "regulatory report generated");
        Ok(serde_json::to_value(RegulatoryResult { key })?)
    }
}

// ==========================================================================
// Saga wiring
// ==========================================================================

fn result_key(operation: BatchOperation) -> String {
    format!("batch.result.{operation}")
}

/// One batch operation as a saga step. The recorded result payload is
/// stored in the workflow context; the reversal reads it back from
/// there, so compensation targets exactly what the operation created.
struct BatchOperationStep {
    runner: Arc<BatchRunner>,
    operation: BatchOperation,
    date: NaiveDate,
    records: Arc<std::sync::Mutex<Vec<BatchOperationRecord>>>,
}

impl BatchOperationStep {
    fn push_record(&self, record: BatchOperationRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}

impl SagaStep for BatchOperationStep {
    fn name(&self) -> &str {
        self.operation.as_str()
    }

    fn execute<'a>(&'a self, ctx: &'a mut WorkflowContext) -> StepFuture<'a, serde_json::Value> {
        Box::pin(async move {
            let started_at = self.runner.services.clock.now();
            match self.runner.run_operation(self.operation, self.date).await {
                Ok(result) => {
                    self.push_record(BatchOperationRecord {
                        operation: self.operation.as_str().to_string(),
                        status: BatchOperationStatus::Success,
                        result: result.clone(),
                        started_at,
                        ended_at: self.runner.services.clock.now(),
                    });
                    ctx.put(&result_key(self.operation), &result)?;
                    Ok(result)
                }
                Err(e) => {
                    self.push_record(BatchOperationRecord {
                        operation: self.operation.as_str().to_string(),
                        status: BatchOperationStatus::Failed,
                        result: json!({ "error": e.to_string() }),
                        started_at,
                        ended_at: self.runner.services.clock.now(),
                    });
                    Err(WorkflowError::BatchOperation {
                        operation: self.operation.as_str().to_string(),
                        message: e.to_string(),
                    })
                }
            }
        })
    }

    fn compensate<'a>(&'a self, ctx: &'a WorkflowContext) -> StepFuture<'a, ()> {
        Box::pin(async move {
            let result: serde_json::Value = ctx.get(&result_key(self.operation))?;
            self.runner.reverse(self.operation, &result).await
        })
    }
}

/// Run the given batch operations as a saga for the clock's current
/// date. Returns a consolidated summary on full success; on failure
/// the completed operations are reversed in reverse order and the
/// original error is surfaced.
pub async fn run_batch(
    runner: Arc<BatchRunner>,
    context: &OperationContext,
    operations: &[BatchOperation],
) -> Result<BatchSummary, SagaError> {
    let batch_id = Uuid::new_v4();
    let date = runner.services.clock.now().date_naive();
    let records = Arc::new(std::sync::Mutex::new(Vec::new()));

    runner.services.audit.record(
        AuditRecord::new(
            AuditAction::BatchStarted,
            context,
            runner.services.clock.now(),
        )
        .reason(format!("batch {batch_id} for {date}")),
    );

    let mut saga = Saga::new("batch_processing");
    for operation in operations {
        saga = saga.step(Box::new(BatchOperationStep {
            runner: runner.clone(),
            operation: *operation,
            date,
            records: records.clone(),
        }));
    }

    let mut ctx = WorkflowContext::new();
    match saga.run(&mut ctx).await {
        Ok(_) => {
            let records = records.lock().map(|r| r.clone()).unwrap_or_default();
            let summary = BatchSummary::from_records(batch_id, records).unwrap_or(BatchSummary {
                batch_id,
                total_operations: 0,
                successful_operations: 0,
                failed_operations: 0,
                start_time: runner.services.clock.now(),
                end_time: runner.services.clock.now(),
                duration_seconds: 0,
                results: Vec::new(),
            });

            runner.services.audit.record(
                AuditRecord::new(
                    AuditAction::BatchCompleted,
                    context,
                    runner.services.clock.now(),
                )
                .reason(format!(
                    "batch {batch_id}: {} operations in {}s",
                    summary.total_operations, summary.duration_seconds
                )),
            );
            Ok(summary)
        }
        Err(e) => {
            let attempted = records.lock().map(|r| r.clone()).unwrap_or_default();
            tracing::error!(
                batch_id = %batch_id,
                date = %date,
                attempted = attempted.len(),
                completed = attempted
                    .iter()
                    .filter(|r| r.status == BatchOperationStatus::Success)
                    .count(),
                error = %e.root_cause,
                "batch failed, completed operations reversed"
            );
            runner.services.audit.record(
                AuditRecord::new(
                    AuditAction::BatchReversed,
                    context,
                    runner.services.clock.now(),
                )
                .reason(format!("batch {batch_id} failed: {}", e.root_cause)),
            );
            Err(e)
        }
    }
}
