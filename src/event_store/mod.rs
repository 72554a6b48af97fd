//! Event store module
//!
//! Append-only, hash-chained event log with optimistic concurrency.
//! Two implementations share one trait: `InMemoryEventStore` for tests
//! and embedded use, `PgEventStore` for durable deployments.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use error::EventStoreError;
pub use memory::InMemoryEventStore;
pub use postgres::PgEventStore;
pub use record::{chain_hash, verify_records, ChainVerification, EventRecord, NewEvent, GENESIS_HASH};
pub use store::{EventStore, StoreFuture};

use std::sync::Arc;

/// Shared handle to an event store implementation.
pub type SharedEventStore = Arc<dyn EventStore>;
