//! Postgres event store
//!
//! Persists the hash-chained event log in a single `ledger_events`
//! table. Version checks run inside the same transaction as the
//! inserts so concurrent appends to one aggregate serialize on the
//! `(aggregate_id, version)` unique constraint.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::error::EventStoreError;
use super::record::{chain_hash, verify_records, ChainVerification, EventRecord, NewEvent, GENESIS_HASH};
use super::store::{EventStore, StoreFuture};

type EventRow = (
    Uuid,
    String,
    Uuid,
    i64,
    String,
    serde_json::Value,
    String,
    String,
    DateTime<Utc>,
);

fn row_to_record(row: EventRow) -> EventRecord {
    let (id, aggregate_type, aggregate_id, version, event_type, payload, prior_hash, hash, recorded_at) =
        row;
    EventRecord {
        id,
        aggregate_type,
        aggregate_id,
        version,
        event_type,
        payload,
        prior_hash,
        hash,
        recorded_at,
    }
}

/// Event store backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    /// Create a store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Current head version and hash of a stream, inside a transaction.
    async fn stream_head(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        aggregate_id: Uuid,
    ) -> Result<(i64, String), EventStoreError> {
        let head: Option<(i64, String)> = sqlx::query_as(
            r#"
            SELECT version, hash FROM ledger_events
            WHERE aggregate_id = $1
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(aggregate_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(head.unwrap_or((0, GENESIS_HASH.to_string())))
    }

    async fn try_append(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[NewEvent],
    ) -> Result<String, EventStoreError> {
        let mut tx = self.pool.begin().await?;

        let (current_version, mut head_hash) = self.stream_head(&mut tx, aggregate_id).await?;
        if current_version != expected_version {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual: current_version,
            });
        }

        let mut version = current_version;
        for event in events {
            version += 1;
            // Hash is computed in Rust, not SQL, so the memory store and
            // the verifier agree on the exact bytes hashed.
            let hash = chain_hash(&head_hash, &event.payload, version);

            sqlx::query(
                r#"
                INSERT INTO ledger_events (
                    id, aggregate_type, aggregate_id, version,
                    event_type, payload, prior_hash, hash
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&event.aggregate_type)
            .bind(aggregate_id)
            .bind(version)
            .bind(&event.event_type)
            .bind(&event.payload)
            .bind(&head_hash)
            .bind(&hash)
            .execute(&mut *tx)
            .await
            .map_err(|e| match &e {
                // Unique violation on (aggregate_id, version) means a
                // concurrent writer got there between our head read and
                // this insert.
                sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                    EventStoreError::ConcurrencyConflict {
                        aggregate_id,
                        expected: expected_version,
                        actual: version,
                    }
                }
                _ => EventStoreError::Database(e),
            })?;

            head_hash = hash;
        }

        tx.commit().await?;
        Ok(head_hash)
    }

    async fn fetch_events(&self, aggregate_id: Uuid) -> Result<Vec<EventRecord>, EventStoreError> {
        let rows: Vec<EventRow> = sqlx::query_as(
            r#"
            SELECT id, aggregate_type, aggregate_id, version,
                   event_type, payload, prior_hash, hash, recorded_at
            FROM ledger_events
            WHERE aggregate_id = $1
            ORDER BY version ASC
            "#,
        )
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_record).collect())
    }
}

impl EventStore for PgEventStore {
    fn append(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: Vec<NewEvent>,
    ) -> StoreFuture<'_, String> {
        Box::pin(async move { self.try_append(aggregate_id, expected_version, &events).await })
    }

    fn load_events(&self, aggregate_id: Uuid) -> StoreFuture<'_, Vec<EventRecord>> {
        Box::pin(async move { self.fetch_events(aggregate_id).await })
    }

    fn verify_chain(&self, aggregate_id: Uuid) -> StoreFuture<'_, ChainVerification> {
        Box::pin(async move {
            let records = self.fetch_events(aggregate_id).await?;
            Ok(verify_records(&records))
        })
    }
}
