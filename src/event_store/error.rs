//! Event store errors

use thiserror::Error;
use uuid::Uuid;

/// Errors from event store operations
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// Optimistic concurrency conflict: another append won the race for
    /// this aggregate. Safe to reload and retry.
    #[error("Concurrency conflict on {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        aggregate_id: Uuid,
        expected: i64,
        actual: i64,
    },

    /// Hash chain mismatch. Fatal: implies tampering or corruption, and
    /// must halt further mutation of the aggregate.
    #[error("Hash chain violated for {aggregate_id} at version {version}")]
    IntegrityViolation { aggregate_id: Uuid, version: i64 },

    /// Retry budget for concurrency conflicts exhausted
    #[error("Maximum append retries exceeded")]
    MaxRetriesExceeded,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventStoreError {
    /// Whether the operation can be retried after reloading the aggregate
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// Whether this is a concurrency conflict
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_conflict_is_retryable() {
        let err = EventStoreError::ConcurrencyConflict {
            aggregate_id: Uuid::nil(),
            expected: 1,
            actual: 2,
        };
        assert!(err.is_retryable());
        assert!(err.is_concurrency_conflict());
    }

    #[test]
    fn test_integrity_violation_is_fatal() {
        let err = EventStoreError::IntegrityViolation {
            aggregate_id: Uuid::nil(),
            version: 3,
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("version 3"));
    }
}
