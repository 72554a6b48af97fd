//! Saga deduplication
//!
//! Guards retried sagas behind a caller-supplied key: a retry of an
//! already-completed saga returns the recorded outcome instead of
//! re-running the steps.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::engine::SagaOutcome;

/// Boxed future returned by deduplication methods.
pub type DedupFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Keyed record of completed saga outcomes.
///
/// Only successful outcomes are recorded; a failed saga may be retried
/// under the same key.
pub trait DeduplicationStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> DedupFuture<'a, Option<SagaOutcome>>;
    fn put(&self, key: String, outcome: SagaOutcome) -> DedupFuture<'_, ()>;
}

/// Shared deduplication handle.
pub type SharedDeduplication = Arc<dyn DeduplicationStore>;

/// Process-local deduplication store.
#[derive(Debug, Clone, Default)]
pub struct MemoryDeduplicationStore {
    outcomes: Arc<RwLock<HashMap<String, SagaOutcome>>>,
}

impl MemoryDeduplicationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeduplicationStore for MemoryDeduplicationStore {
    fn get<'a>(&'a self, key: &'a str) -> DedupFuture<'a, Option<SagaOutcome>> {
        Box::pin(async move {
            let outcomes = self.outcomes.read().await;
            outcomes.get(key).cloned()
        })
    }

    fn put(&self, key: String, outcome: SagaOutcome) -> DedupFuture<'_, ()> {
        Box::pin(async move {
            let mut outcomes = self.outcomes.write().await;
            outcomes.insert(key, outcome);
        })
    }
}
