//! In-memory event store
//!
//! Backs tests and embedded deployments where the caller brings its own
//! durability. Same contract as the Postgres store: atomic batches,
//! optimistic concurrency, hash chaining.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{Clock, SystemClock};

use super::error::EventStoreError;
use super::record::{chain_hash, verify_records, EventRecord, NewEvent, GENESIS_HASH};
use super::store::{EventStore, StoreFuture};

/// Event store backed by a process-local map.
#[derive(Clone)]
pub struct InMemoryEventStore {
    streams: Arc<RwLock<HashMap<Uuid, Vec<EventRecord>>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryEventStore {
    /// Create an empty store using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store with an injected clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            streams: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Overwrite a stored payload in place, without recomputing hashes.
    ///
    /// Test hook for integrity checks; not reachable through the trait.
    pub async fn tamper_with_payload(
        &self,
        aggregate_id: Uuid,
        version: i64,
        payload: serde_json::Value,
    ) -> bool {
        let mut streams = self.streams.write().await;
        if let Some(records) = streams.get_mut(&aggregate_id) {
            if let Some(record) = records.iter_mut().find(|r| r.version == version) {
                record.payload = payload;
                return true;
            }
        }
        false
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: Vec<NewEvent>,
    ) -> StoreFuture<'_, String> {
        Box::pin(async move {
            let mut streams = self.streams.write().await;
            let records = streams.entry(aggregate_id).or_default();

            let current_version = records.last().map(|r| r.version).unwrap_or(0);
            if current_version != expected_version {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id,
                    expected: expected_version,
                    actual: current_version,
                });
            }

            let mut head_hash = records
                .last()
                .map(|r| r.hash.clone())
                .unwrap_or_else(|| GENESIS_HASH.to_string());

            // Build the whole batch before touching the stream so a
            // failure cannot leave a partial append behind.
            let mut batch = Vec::with_capacity(events.len());
            let mut version = current_version;
            for event in events {
                version += 1;
                let hash = chain_hash(&head_hash, &event.payload, version);
                batch.push(EventRecord {
                    id: Uuid::new_v4(),
                    aggregate_type: event.aggregate_type,
                    aggregate_id,
                    version,
                    event_type: event.event_type,
                    payload: event.payload,
                    prior_hash: head_hash.clone(),
                    hash: hash.clone(),
                    recorded_at: self.clock.now(),
                });
                head_hash = hash;
            }

            records.extend(batch);
            Ok(head_hash)
        })
    }

    fn load_events(&self, aggregate_id: Uuid) -> StoreFuture<'_, Vec<EventRecord>> {
        Box::pin(async move {
            let streams = self.streams.read().await;
            Ok(streams.get(&aggregate_id).cloned().unwrap_or_default())
        })
    }

    fn verify_chain(
        &self,
        aggregate_id: Uuid,
    ) -> StoreFuture<'_, super::record::ChainVerification> {
        Box::pin(async move {
            let streams = self.streams.read().await;
            let records = streams.get(&aggregate_id).cloned().unwrap_or_default();
            Ok(verify_records(&records))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn money_added(amount: i64) -> NewEvent {
        NewEvent {
            aggregate_type: "Transaction".to_string(),
            event_type: "MoneyAdded".to_string(),
            payload: json!({"type": "MoneyAdded", "amount": amount}),
        }
    }

    #[tokio::test]
    async fn test_append_assigns_versions_and_chains_hashes() {
        let store = InMemoryEventStore::new();
        let id = Uuid::new_v4();

        store
            .append(id, 0, vec![money_added(100), money_added(200)])
            .await
            .unwrap();

        let events = store.load_events(id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].version, 1);
        assert_eq!(events[1].version, 2);
        assert_eq!(events[0].prior_hash, GENESIS_HASH);
        assert_eq!(events[1].prior_hash, events[0].hash);
    }

    #[tokio::test]
    async fn test_append_returns_head_hash() {
        let store = InMemoryEventStore::new();
        let id = Uuid::new_v4();

        let head = store.append(id, 0, vec![money_added(100)]).await.unwrap();
        let events = store.load_events(id).await.unwrap();
        assert_eq!(head, events[0].hash);
    }

    #[tokio::test]
    async fn test_append_version_conflict() {
        let store = InMemoryEventStore::new();
        let id = Uuid::new_v4();

        store.append(id, 0, vec![money_added(100)]).await.unwrap();

        // Stale writer still thinks the stream is empty
        let err = store
            .append(id, 0, vec![money_added(50)])
            .await
            .unwrap_err();
        assert!(err.is_concurrency_conflict());

        // The losing append left nothing behind
        assert_eq!(store.load_events(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_load_events_unknown_aggregate_is_empty() {
        let store = InMemoryEventStore::new();
        let events = store.load_events(Uuid::new_v4()).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_verify_chain_detects_tampering() {
        let store = InMemoryEventStore::new();
        let id = Uuid::new_v4();

        store
            .append(id, 0, vec![money_added(100), money_added(200)])
            .await
            .unwrap();
        assert!(store.verify_chain(id).await.unwrap().is_valid);

        assert!(
            store
                .tamper_with_payload(id, 1, json!({"type": "MoneyAdded", "amount": 9999}))
                .await
        );

        let verification = store.verify_chain(id).await.unwrap();
        assert!(!verification.is_valid);
        assert_eq!(verification.first_invalid_version, Some(1));
    }

    #[tokio::test]
    async fn test_streams_are_independent() {
        let store = InMemoryEventStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        store.append(a, 0, vec![money_added(100)]).await.unwrap();
        store.append(b, 0, vec![money_added(200)]).await.unwrap();

        assert_eq!(store.load_events(a).await.unwrap().len(), 1);
        assert_eq!(store.load_events(b).await.unwrap().len(), 1);
    }
}
