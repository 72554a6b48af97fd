//! Event store abstraction
//!
//! The append-only, hash-chained event log is the single source of
//! truth for account state. The trait uses explicit `Pin<Box<dyn Future>>`
//! returns instead of `async fn` so it can be used as a trait object
//! (`Arc<dyn EventStore>`) shared by activities and sagas.

use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

use super::error::EventStoreError;
use super::record::{ChainVerification, EventRecord, NewEvent};

/// Boxed future returned by store methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EventStoreError>> + Send + 'a>>;

/// Append-only event log with optimistic concurrency and hash chaining.
///
/// Implementations must guarantee:
/// - `append` is all-or-nothing: a failed append leaves no partial batch
/// - versions per aggregate are dense and strictly increasing from 1
/// - each event's `hash` chains from the aggregate's previous head hash
/// - concurrent appends to one aggregate are serialized; the loser gets
///   a `ConcurrencyConflict` and must reload before retrying
pub trait EventStore: Send + Sync {
    /// Append a batch of events for one aggregate.
    ///
    /// `expected_version` is the version the caller observed when it
    /// loaded the aggregate (0 for a fresh aggregate). Returns the new
    /// head hash after the batch.
    fn append(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: Vec<NewEvent>,
    ) -> StoreFuture<'_, String>;

    /// Load all events for an aggregate, oldest first.
    ///
    /// An unknown aggregate yields an empty vector; new aggregates start
    /// with no history.
    fn load_events(&self, aggregate_id: Uuid) -> StoreFuture<'_, Vec<EventRecord>>;

    /// Recompute the hash chain forward from genesis and compare against
    /// stored hashes. Not on the hot path; used for audits and the
    /// integrity endpoint. A mismatch is fatal for the aggregate.
    fn verify_chain(&self, aggregate_id: Uuid) -> StoreFuture<'_, ChainVerification>;
}
