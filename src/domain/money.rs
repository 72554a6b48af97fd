//! Money type
//!
//! Domain primitive for monetary amounts in minor currency units.
//! All arithmetic is integer arithmetic; floating point never enters
//! the ledger, so there is no rounding drift to account for.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Money represents a signed amount in minor currency units (e.g. cents).
///
/// # Invariants
/// - Always an integer; no fractional minor units exist
/// - Arithmetic is checked: overflow is an error, never a wrap
///
/// # Example
/// ```
/// use ledger_core::domain::Money;
///
/// let amount = Money::new(2500);
/// assert_eq!(amount.invert().minor_units(), -2500);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

/// Errors that can occur when working with Money
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("Amount must not be negative (got {0})")]
    Negative(i64),

    #[error("Amount arithmetic overflowed")]
    Overflow,

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl Money {
    /// Zero amount.
    pub const ZERO: Money = Money(0);

    /// Create a Money value from minor units.
    pub const fn new(minor_units: i64) -> Self {
        Self(minor_units)
    }

    /// Create a Money value, rejecting negative amounts.
    ///
    /// Used where an operation amount must be non-negative (credits,
    /// debits); balances may still be represented by any signed value.
    pub fn positive(minor_units: i64) -> Result<Self, MoneyError> {
        if minor_units < 0 {
            return Err(MoneyError::Negative(minor_units));
        }
        Ok(Self(minor_units))
    }

    /// Get the raw amount in minor units.
    pub const fn minor_units(&self) -> i64 {
        self.0
    }

    /// Return the additive inverse.
    pub const fn invert(&self) -> Self {
        Self(-self.0)
    }

    /// Checked addition.
    pub fn try_add(&self, other: Money) -> Result<Money, MoneyError> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or(MoneyError::Overflow)
    }

    /// Checked subtraction.
    pub fn try_sub(&self, other: Money) -> Result<Money, MoneyError> {
        self.0
            .checked_sub(other.0)
            .map(Money)
            .ok_or(MoneyError::Overflow)
    }

    /// Whether this amount is negative.
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Whether this balance can cover a withdrawal of `amount`.
    pub fn is_sufficient_for(&self, amount: Money) -> bool {
        self.0 >= amount.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let units: i64 = s
            .trim()
            .parse()
            .map_err(|_| MoneyError::ParseError(s.to_string()))?;
        Ok(Money(units))
    }
}

impl From<Money> for i64 {
    fn from(money: Money) -> Self {
        money.0
    }
}
