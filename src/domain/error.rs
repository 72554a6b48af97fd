//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.
//! These represent business rule violations and invariant failures;
//! they are raised before any event is persisted.

use thiserror::Error;
use uuid::Uuid;

use super::Money;

/// Domain-specific errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Insufficient funds for a debit operation
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Money, available: Money },

    /// Account is frozen and cannot process transactions
    #[error("Account is frozen: {reason}")]
    AccountFrozen { reason: String },

    /// Unfreeze requested for an account that is not frozen
    #[error("Account is not frozen")]
    AccountNotFrozen,

    /// Create requested for an account that already exists
    #[error("Account already exists: {0}")]
    AccountExists(Uuid),

    /// Account has no event history
    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    /// Account was deleted and cannot be mutated again
    #[error("Account is deleted: {0}")]
    AccountDeleted(Uuid),

    /// Invalid amount (negative operation amount)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Transfer to the same account
    #[error("Cannot transfer to the same account")]
    SameAccountTransfer,

    /// Operation rejected by the authorization seam
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl DomainError {
    /// Create an insufficient funds error
    pub fn insufficient_funds(required: Money, available: Money) -> Self {
        Self::InsufficientFunds {
            required,
            available,
        }
    }

    /// Create an account frozen error
    pub fn account_frozen(reason: impl Into<String>) -> Self {
        Self::AccountFrozen {
            reason: reason.into(),
        }
    }

    /// Check if this is a validation error (rejected before staging events)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InsufficientFunds { .. }
                | Self::AccountFrozen { .. }
                | Self::AccountNotFrozen
                | Self::AccountExists(_)
                | Self::AccountDeleted(_)
                | Self::InvalidAmount(_)
                | Self::SameAccountTransfer
                | Self::Unauthorized(_)
        )
    }
}
