//! Aggregate module
//!
//! Aggregate Root pattern over the event store. State is derived by
//! folding events, never mutated directly. Both aggregates here fold
//! the same per-account stream: `Ledger` reads lifecycle events,
//! `TransactionAccount` reads balance movements, and each ignores the
//! other's event kinds while tracking the shared stream version for
//! optimistic concurrency.

pub mod ledger;
pub mod transaction;

pub use ledger::Ledger;
pub use transaction::TransactionAccount;

/// Aggregate trait that all aggregates implement
pub trait Aggregate: Sized {
    /// The type of events this aggregate folds
    type Event;

    /// Get the aggregate type name (for storage)
    fn aggregate_type() -> &'static str;

    /// Get the aggregate ID
    fn id(&self) -> uuid::Uuid;

    /// Last persisted stream version this aggregate was loaded at
    fn version(&self) -> i64;

    /// Apply an event to update the aggregate state
    fn apply(self, event: Self::Event) -> Self;
}
