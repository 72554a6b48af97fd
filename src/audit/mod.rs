//! Audit trail
//!
//! Every workflow activity emits one audit record naming who did what
//! to which account. The sink is a seam: production logs structured
//! tracing events, tests capture records for assertions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Money, OperationContext};

/// Audit action types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    AccountCreated,
    AccountFrozen,
    AccountUnfrozen,
    AccountDeleted,
    MoneyDeposited,
    MoneyWithdrawn,
    TransferExecuted,
    TransactionReversed,
    CompensationApplied,
    BatchStarted,
    BatchCompleted,
    BatchReversed,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::AccountCreated => "account.created",
            AuditAction::AccountFrozen => "account.frozen",
            AuditAction::AccountUnfrozen => "account.unfrozen",
            AuditAction::AccountDeleted => "account.deleted",
            AuditAction::MoneyDeposited => "money.deposited",
            AuditAction::MoneyWithdrawn => "money.withdrawn",
            AuditAction::TransferExecuted => "transfer.executed",
            AuditAction::TransactionReversed => "transaction.reversed",
            AuditAction::CompensationApplied => "saga.compensation_applied",
            AuditAction::BatchStarted => "batch.started",
            AuditAction::BatchCompleted => "batch.completed",
            AuditAction::BatchReversed => "batch.reversed",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recorded audit fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub actor: String,
    pub action: String,
    pub account_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Build a record from an operation context.
    pub fn new(action: AuditAction, context: &OperationContext, recorded_at: DateTime<Utc>) -> Self {
        Self {
            actor: context.actor_or_unknown().to_string(),
            action: action.as_str().to_string(),
            account_id: None,
            amount: None,
            reason: None,
            correlation_id: context.correlation_id,
            recorded_at,
        }
    }

    pub fn account(mut self, account_id: Uuid) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Destination for audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Shared handle to an audit sink.
pub type SharedAuditSink = Arc<dyn AuditSink>;

/// Sink that emits structured tracing events.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        tracing::info!(
            target: "audit",
            actor = %record.actor,
            action = %record.action,
            account_id = ?record.account_id,
            amount = ?record.amount,
            reason = ?record.reason,
            correlation_id = ?record.correlation_id,
            "audit"
        );
    }
}

/// Sink that retains records in memory, for test assertions.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    records: Arc<std::sync::Mutex<Vec<AuditRecord>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records so far.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Actions recorded, in order.
    pub fn actions(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .map(|r| r.action)
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_action_as_str() {
        assert_eq!(AuditAction::AccountCreated.as_str(), "account.created");
        assert_eq!(AuditAction::TransferExecuted.as_str(), "transfer.executed");
        assert_eq!(
            AuditAction::CompensationApplied.as_str(),
            "saga.compensation_applied"
        );
    }

    #[test]
    fn test_memory_sink_captures_records() {
        let sink = MemoryAuditSink::new();
        let context = OperationContext::new().with_actor("alice");

        sink.record(
            AuditRecord::new(AuditAction::MoneyDeposited, &context, Utc::now())
                .account(Uuid::new_v4())
                .amount(Money::new(100)),
        );
        sink.record(AuditRecord::new(
            AuditAction::AccountFrozen,
            &context,
            Utc::now(),
        ));

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].actor, "alice");
        assert_eq!(records[0].amount, Some(Money::new(100)));
        assert_eq!(
            sink.actions(),
            vec!["money.deposited".to_string(), "account.frozen".to_string()]
        );
    }

    #[test]
    fn test_record_builder_defaults() {
        let context = OperationContext::new();
        let record = AuditRecord::new(AuditAction::BatchStarted, &context, Utc::now());
        assert_eq!(record.actor, "unknown");
        assert!(record.account_id.is_none());
        assert!(record.amount.is_none());
    }
}
