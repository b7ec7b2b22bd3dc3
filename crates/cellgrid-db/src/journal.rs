//! `PostgreSQL` implementation of [`EventJournal`].
//!
//! Streams live in `entity_events`, one row per event, keyed by
//! `(kind, entity_id, sequence)`. An append checks the stream head inside
//! a transaction and inserts the whole batch with a single `UNNEST`
//! statement; the primary key catches a concurrent writer that slipped in
//! between the check and the insert.

use cellgrid_store::{EventJournal, StoreError, StoredEvent, StoredSnapshot};
use cellgrid_types::{EventId, Region};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DbError;
use crate::postgres::PostgresPool;

/// Journal backed by the `entity_events` and `entity_snapshots` tables.
#[derive(Debug, Clone)]
pub struct PgEventJournal {
    pool: PgPool,
}

/// A row of `entity_events`.
#[derive(Debug, Clone, sqlx::FromRow)]
struct EventRow {
    entity_id: String,
    sequence: i64,
    event_id: Uuid,
    origin: String,
    recorded_at: DateTime<Utc>,
    payload: serde_json::Value,
}

impl From<EventRow> for StoredEvent {
    fn from(row: EventRow) -> Self {
        Self {
            event_id: EventId::from(row.event_id),
            entity_id: row.entity_id,
            sequence: u64::try_from(row.sequence).unwrap_or(0),
            origin: Region::from_name(&row.origin),
            recorded_at: row.recorded_at,
            payload: row.payload,
        }
    }
}

/// A row of `entity_snapshots`.
#[derive(Debug, Clone, sqlx::FromRow)]
struct SnapshotRow {
    sequence: i64,
    taken_at: DateTime<Utc>,
    state: serde_json::Value,
}

fn to_db_sequence(sequence: u64) -> i64 {
    i64::try_from(sequence).unwrap_or(i64::MAX)
}

impl PgEventJournal {
    /// Create a journal over an open pool.
    pub fn new(pool: &PostgresPool) -> Self {
        Self {
            pool: pool.pool().clone(),
        }
    }

    async fn head(&self, kind: &str, entity_id: &str) -> Result<u64, DbError> {
        let head: i64 = sqlx::query_scalar(
            r"SELECT COALESCE(MAX(sequence), 0) FROM entity_events
              WHERE kind = $1 AND entity_id = $2",
        )
        .bind(kind)
        .bind(entity_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(u64::try_from(head).unwrap_or(0))
    }

    async fn insert_batch(
        &self,
        kind: &str,
        entity_id: &str,
        expected_sequence: u64,
        events: &[StoredEvent],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let actual: i64 = sqlx::query_scalar(
            r"SELECT COALESCE(MAX(sequence), 0) FROM entity_events
              WHERE kind = $1 AND entity_id = $2",
        )
        .bind(kind)
        .bind(entity_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(DbError::from)?;
        let actual = u64::try_from(actual).unwrap_or(0);
        if actual != expected_sequence {
            return Err(conflict(kind, entity_id, expected_sequence, actual));
        }

        let len = events.len();
        let mut sequences = Vec::with_capacity(len);
        let mut event_ids = Vec::with_capacity(len);
        let mut origins = Vec::with_capacity(len);
        let mut recorded = Vec::with_capacity(len);
        let mut payloads = Vec::with_capacity(len);
        for event in events {
            sequences.push(to_db_sequence(event.sequence));
            event_ids.push(event.event_id.into_inner());
            origins.push(event.origin.as_str().to_owned());
            recorded.push(event.recorded_at);
            payloads.push(event.payload.clone());
        }

        let inserted = sqlx::query(
            r"INSERT INTO entity_events (kind, entity_id, sequence, event_id, origin, recorded_at, payload)
              SELECT $1::TEXT, $2::TEXT, * FROM UNNEST($3::BIGINT[], $4::UUID[], $5::TEXT[], $6::TIMESTAMPTZ[], $7::JSONB[])",
        )
        .bind(kind)
        .bind(entity_id)
        .bind(&sequences)
        .bind(&event_ids)
        .bind(&origins)
        .bind(&recorded)
        .bind(&payloads)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                drop(tx);
                let actual = self.head(kind, entity_id).await?;
                return Err(conflict(kind, entity_id, expected_sequence, actual));
            }
            Err(e) => return Err(DbError::from(e).into()),
        }

        tx.commit().await.map_err(DbError::from)?;
        tracing::debug!(kind, entity = entity_id, count = len, "Appended events");
        Ok(())
    }
}

fn conflict(kind: &str, entity_id: &str, expected: u64, actual: u64) -> StoreError {
    StoreError::Conflict {
        kind: kind.to_owned(),
        id: entity_id.to_owned(),
        expected,
        actual,
    }
}

impl EventJournal for PgEventJournal {
    async fn append(
        &self,
        kind: &str,
        entity_id: &str,
        expected_sequence: u64,
        events: &[StoredEvent],
    ) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }
        self.insert_batch(kind, entity_id, expected_sequence, events)
            .await
    }

    async fn load(
        &self,
        kind: &str,
        entity_id: &str,
        after_sequence: u64,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r"SELECT entity_id, sequence, event_id, origin, recorded_at, payload
              FROM entity_events
              WHERE kind = $1 AND entity_id = $2 AND sequence > $3
              ORDER BY sequence",
        )
        .bind(kind)
        .bind(entity_id)
        .bind(to_db_sequence(after_sequence))
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(rows.into_iter().map(StoredEvent::from).collect())
    }

    async fn entity_ids(&self, kind: &str) -> Result<Vec<String>, StoreError> {
        let ids: Vec<String> = sqlx::query_scalar(
            r"SELECT DISTINCT entity_id FROM entity_events
              WHERE kind = $1
              ORDER BY entity_id",
        )
        .bind(kind)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(ids)
    }

    async fn contains(
        &self,
        kind: &str,
        entity_id: &str,
        event_id: EventId,
    ) -> Result<bool, StoreError> {
        let found: bool = sqlx::query_scalar(
            r"SELECT EXISTS (
                SELECT 1 FROM entity_events
                WHERE kind = $1 AND entity_id = $2 AND event_id = $3
              )",
        )
        .bind(kind)
        .bind(entity_id)
        .bind(event_id.into_inner())
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(found)
    }

    async fn save_snapshot(
        &self,
        kind: &str,
        entity_id: &str,
        snapshot: &StoredSnapshot,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r"INSERT INTO entity_snapshots (kind, entity_id, sequence, taken_at, state)
              VALUES ($1, $2, $3, $4, $5)
              ON CONFLICT (kind, entity_id) DO UPDATE
              SET sequence = EXCLUDED.sequence,
                  taken_at = EXCLUDED.taken_at,
                  state = EXCLUDED.state
              WHERE entity_snapshots.sequence < EXCLUDED.sequence",
        )
        .bind(kind)
        .bind(entity_id)
        .bind(to_db_sequence(snapshot.sequence))
        .bind(snapshot.taken_at)
        .bind(&snapshot.state)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(())
    }

    async fn load_snapshot(
        &self,
        kind: &str,
        entity_id: &str,
    ) -> Result<Option<StoredSnapshot>, StoreError> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r"SELECT sequence, taken_at, state FROM entity_snapshots
              WHERE kind = $1 AND entity_id = $2",
        )
        .bind(kind)
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(row.map(|row| StoredSnapshot {
            sequence: u64::try_from(row.sequence).unwrap_or(0),
            taken_at: row.taken_at,
            state: row.state,
        }))
    }
}
