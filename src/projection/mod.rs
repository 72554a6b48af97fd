//! Projection module
//!
//! Read models updated synchronously after events are persisted.
//! Projections serve queries only; write-path invariant checks always
//! replay from the event log, never from here.

pub mod memory;
pub mod postgres;
pub mod store;

pub use memory::InMemoryProjections;
pub use postgres::PgProjections;
pub use store::{AccountStatus, ProjectionError, ProjectionStore, ProjFuture};

use std::sync::Arc;

/// Shared handle to a projection store implementation.
pub type SharedProjections = Arc<dyn ProjectionStore>;
