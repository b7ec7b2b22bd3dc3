//! Append-only event journal abstraction and an in-memory implementation.
//!
//! A journal stores one ordered stream per `(kind, entity_id)` pair. The
//! runtime is the only writer; [`EventJournal::append`] still checks the
//! expected sequence so two processes sharing a journal cannot interleave
//! writes to the same stream.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use cellgrid_types::EventId;

use crate::envelope::{StoredEvent, StoredSnapshot};
use crate::error::StoreError;

/// Storage backend for entity event streams and snapshots.
pub trait EventJournal: Send + Sync + 'static {
    /// Atomically append `events` to the stream.
    ///
    /// Fails with [`StoreError::Conflict`] when the stream's last sequence
    /// is not `expected_sequence`. Either every event is stored or none is.
    fn append(
        &self,
        kind: &str,
        entity_id: &str,
        expected_sequence: u64,
        events: &[StoredEvent],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Load the events with a sequence greater than `after_sequence`, in
    /// commit order.
    fn load(
        &self,
        kind: &str,
        entity_id: &str,
        after_sequence: u64,
    ) -> impl Future<Output = Result<Vec<StoredEvent>, StoreError>> + Send;

    /// Ids of every `kind` stream holding at least one event, sorted.
    fn entity_ids(&self, kind: &str)
    -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Whether the stream already holds the event with this id.
    fn contains(
        &self,
        kind: &str,
        entity_id: &str,
        event_id: EventId,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Replace the entity's snapshot.
    fn save_snapshot(
        &self,
        kind: &str,
        entity_id: &str,
        snapshot: &StoredSnapshot,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Load the entity's latest snapshot, if one was saved.
    fn load_snapshot(
        &self,
        kind: &str,
        entity_id: &str,
    ) -> impl Future<Output = Result<Option<StoredSnapshot>, StoreError>> + Send;
}

// ---------------------------------------------------------------------------
// In-memory journal
// ---------------------------------------------------------------------------

type StreamKey = (String, String);

/// Process-local journal. Used by tests and single-node development runs.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    streams: Mutex<HashMap<StreamKey, Vec<StoredEvent>>>,
    snapshots: Mutex<HashMap<StreamKey, StoredSnapshot>>,
}

impl MemoryJournal {
    /// Create an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event stored for one entity.
    pub fn events(&self, kind: &str, entity_id: &str) -> Vec<StoredEvent> {
        let streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        streams
            .get(&key(kind, entity_id))
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of events across all streams.
    pub fn len(&self) -> usize {
        let streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        streams.values().map(Vec::len).sum()
    }

    /// Whether no event has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn key(kind: &str, entity_id: &str) -> StreamKey {
    (kind.to_owned(), entity_id.to_owned())
}

impl EventJournal for MemoryJournal {
    async fn append(
        &self,
        kind: &str,
        entity_id: &str,
        expected_sequence: u64,
        events: &[StoredEvent],
    ) -> Result<(), StoreError> {
        let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        let stream = streams.entry(key(kind, entity_id)).or_default();
        let actual = stream.last().map_or(0, |e| e.sequence);
        if actual != expected_sequence {
            return Err(StoreError::Conflict {
                kind: kind.to_owned(),
                id: entity_id.to_owned(),
                expected: expected_sequence,
                actual,
            });
        }
        stream.extend_from_slice(events);
        Ok(())
    }

    async fn load(
        &self,
        kind: &str,
        entity_id: &str,
        after_sequence: u64,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(streams
            .get(&key(kind, entity_id))
            .map(|stream| {
                stream
                    .iter()
                    .filter(|e| e.sequence > after_sequence)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn entity_ids(&self, kind: &str) -> Result<Vec<String>, StoreError> {
        let streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = streams
            .iter()
            .filter(|((stream_kind, _), events)| stream_kind == kind && !events.is_empty())
            .map(|((_, id), _)| id.clone())
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn contains(
        &self,
        kind: &str,
        entity_id: &str,
        event_id: EventId,
    ) -> Result<bool, StoreError> {
        let streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(streams
            .get(&key(kind, entity_id))
            .is_some_and(|stream| stream.iter().any(|e| e.event_id == event_id)))
    }

    async fn save_snapshot(
        &self,
        kind: &str,
        entity_id: &str,
        snapshot: &StoredSnapshot,
    ) -> Result<(), StoreError> {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots.insert(key(kind, entity_id), snapshot.clone());
        Ok(())
    }

    async fn load_snapshot(
        &self,
        kind: &str,
        entity_id: &str,
    ) -> Result<Option<StoredSnapshot>, StoreError> {
        let snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(snapshots.get(&key(kind, entity_id)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use cellgrid_types::Region;
    use chrono::Utc;

    use super::*;

    fn stored(sequence: u64) -> StoredEvent {
        StoredEvent {
            event_id: EventId::new(),
            entity_id: "0x0".to_owned(),
            sequence,
            origin: Region::Local,
            recorded_at: Utc::now(),
            payload: serde_json::json!({ "n": sequence }),
        }
    }

    #[tokio::test]
    async fn append_checks_expected_sequence() {
        let journal = MemoryJournal::new();
        let first = journal.append("k", "0x0", 0, &[stored(1), stored(2)]).await;
        assert!(first.is_ok());

        let stale = journal.append("k", "0x0", 1, &[stored(2)]).await;
        assert!(matches!(
            stale,
            Err(StoreError::Conflict {
                expected: 1,
                actual: 2,
                ..
            })
        ));
        assert_eq!(journal.len(), 2);
    }

    #[tokio::test]
    async fn load_returns_tail_after_sequence() {
        let journal = MemoryJournal::new();
        let _ = journal
            .append("k", "0x0", 0, &[stored(1), stored(2), stored(3)])
            .await;
        let tail = journal.load("k", "0x0", 1).await.unwrap_or_default();
        let sequences: Vec<u64> = tail.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![2, 3]);
    }

    #[tokio::test]
    async fn entity_ids_lists_written_streams_of_one_kind() {
        let journal = MemoryJournal::new();
        let _ = journal.append("k", "2x0", 0, &[stored(1)]).await;
        let _ = journal.append("k", "0x0", 0, &[stored(1)]).await;
        let _ = journal.append("other", "1x1", 0, &[stored(1)]).await;
        // A rejected append leaves no stream behind.
        let _ = journal.append("k", "5x5", 3, &[stored(4)]).await;

        let ids = journal.entity_ids("k").await.unwrap_or_default();
        assert_eq!(ids, vec!["0x0".to_owned(), "2x0".to_owned()]);
        assert!(journal.entity_ids("none").await.is_ok_and(|ids| ids.is_empty()));
    }

    #[tokio::test]
    async fn streams_are_partitioned_by_kind() {
        let journal = MemoryJournal::new();
        let event = stored(1);
        let id = event.event_id;
        let _ = journal.append("a", "0x0", 0, &[event]).await;
        assert!(journal.contains("a", "0x0", id).await.unwrap_or(false));
        assert!(!journal.contains("b", "0x0", id).await.unwrap_or(true));
        assert!(journal.events("b", "0x0").is_empty());
    }
}
