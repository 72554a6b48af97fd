//! Domain Events
//!
//! Event definitions for the ledger core. Events are immutable facts;
//! each aggregate has a closed set of event kinds so replay is an
//! exhaustive fold checked by the compiler.

use serde::{Deserialize, Serialize};

use super::Money;

/// Account lifecycle events (Ledger aggregate)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LedgerEvent {
    /// Account was created
    AccountCreated {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        owner: Option<String>,
    },

    /// Account was frozen; no money movement until unfrozen
    AccountFrozen {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        authorized_by: Option<String>,
    },

    /// Account was unfrozen
    AccountUnfrozen {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        authorized_by: Option<String>,
    },

    /// Account was deleted; a deleted account cannot be mutated again
    AccountDeleted,
}

impl LedgerEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::AccountCreated { .. } => "AccountCreated",
            LedgerEvent::AccountFrozen { .. } => "AccountFrozen",
            LedgerEvent::AccountUnfrozen { .. } => "AccountUnfrozen",
            LedgerEvent::AccountDeleted => "AccountDeleted",
        }
    }
}

/// Balance movement events (Transaction aggregate)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TransactionEvent {
    /// Money was credited to the account (balance increased)
    MoneyAdded {
        amount: Money,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },

    /// Money was debited from the account (balance decreased)
    MoneySubtracted {
        amount: Money,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

impl TransactionEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            TransactionEvent::MoneyAdded { .. } => "MoneyAdded",
            TransactionEvent::MoneySubtracted { .. } => "MoneySubtracted",
        }
    }

    /// Amount moved by this event
    pub fn amount(&self) -> Money {
        match self {
            TransactionEvent::MoneyAdded { amount, .. } => *amount,
            TransactionEvent::MoneySubtracted { amount, .. } => *amount,
        }
    }
}
