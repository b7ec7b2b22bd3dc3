//! Event envelopes.
//!
//! [`EventEnvelope`] is the typed form handed to subscribers and shipped
//! between regions; [`StoredEvent`] is the same record with its payload
//! erased to JSON, which is what a journal persists.

use cellgrid_types::{EventId, Region};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// One persisted event with its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    /// Globally unique id, preserved across replication.
    pub event_id: EventId,
    /// Display form of the owning entity's id.
    pub entity_id: String,
    /// Position in the owning entity's stream, starting at 1.
    pub sequence: u64,
    /// Region whose command produced the event.
    pub origin: Region,
    /// When the originating store persisted the event.
    pub recorded_at: DateTime<Utc>,
    /// The domain event.
    pub event: E,
}

impl<E: Serialize> EventEnvelope<E> {
    /// Erase the payload for storage.
    pub fn to_stored(&self) -> Result<StoredEvent, StoreError> {
        Ok(StoredEvent {
            event_id: self.event_id,
            entity_id: self.entity_id.clone(),
            sequence: self.sequence,
            origin: self.origin.clone(),
            recorded_at: self.recorded_at,
            payload: serde_json::to_value(&self.event)?,
        })
    }
}

impl<E: DeserializeOwned> EventEnvelope<E> {
    /// Rebuild the typed envelope from a stored record.
    pub fn from_stored(stored: StoredEvent) -> Result<Self, StoreError> {
        Ok(Self {
            event: serde_json::from_value(stored.payload)?,
            event_id: stored.event_id,
            entity_id: stored.entity_id,
            sequence: stored.sequence,
            origin: stored.origin,
            recorded_at: stored.recorded_at,
        })
    }
}

/// An [`EventEnvelope`] with a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Globally unique id.
    pub event_id: EventId,
    /// Display form of the owning entity's id.
    pub entity_id: String,
    /// Position in the owning entity's stream.
    pub sequence: u64,
    /// Region whose command produced the event.
    pub origin: Region,
    /// When the originating store persisted the event.
    pub recorded_at: DateTime<Utc>,
    /// Serialized domain event.
    pub payload: serde_json::Value,
}

/// A folded state captured at a sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSnapshot {
    /// Sequence of the last event folded into `state`.
    pub sequence: u64,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
    /// Serialized aggregate state.
    pub state: serde_json::Value,
}
