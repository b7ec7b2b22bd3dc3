//! The entity runtime.
//!
//! [`EntityStore`] gives every entity id its own serialized command
//! pipeline. Each id owns a slot guarded by an async mutex; an invocation
//! holds the slot for the whole load, decide, persist, fold and publish
//! sequence, so commands for one id never overlap while commands for
//! different ids run in parallel.
//!
//! Slots cache the folded state and the last sequence number. A slot is
//! loaded lazily from the journal (latest snapshot plus tail) the first
//! time its id is touched and is marked stale whenever an append fails,
//! which forces the next invocation to reload.
//!
//! The cache only keeps entities that exist. A slot that is still empty
//! or stale when its last user lets go is dropped, and once the cache
//! holds `slot_capacity` slots every idle slot is evicted before a new
//! one is added. Eviction only costs a reload from the journal.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use cellgrid_types::{EventId, Region};
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::aggregate::{Aggregate, CommandContext};
use crate::envelope::{EventEnvelope, StoredEvent, StoredSnapshot};
use crate::error::StoreError;
use crate::journal::EventJournal;

/// Default number of events between snapshots.
pub const DEFAULT_SNAPSHOT_EVERY: u64 = 100;

/// Default number of cached entity slots before idle ones are evicted.
pub const DEFAULT_SLOT_CAPACITY: usize = 10_000;

/// Result of a successful [`EntityStore::invoke`].
#[derive(Debug, Clone)]
pub struct Invocation<A: Aggregate> {
    /// Events persisted by this invocation, in commit order.
    pub events: Vec<EventEnvelope<A::Event>>,
    /// State after folding `events`.
    pub state: A,
}

impl<A: Aggregate> Invocation<A> {
    /// Whether the command was accepted without producing events.
    pub fn is_noop(&self) -> bool {
        self.events.is_empty()
    }
}

#[derive(Debug, Default)]
struct Slot<A> {
    state: A,
    sequence: u64,
    since_snapshot: u64,
    loaded: bool,
}

type SlotHandle<A> = Arc<tokio::sync::Mutex<Slot<A>>>;

/// Event-sourced runtime for one aggregate type over one journal.
#[derive(Debug)]
pub struct EntityStore<A: Aggregate, J> {
    journal: Arc<J>,
    region: Region,
    snapshot_every: u64,
    slot_capacity: usize,
    slots: Mutex<HashMap<String, SlotHandle<A>>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<EventEnvelope<A::Event>>>>,
}

impl<A: Aggregate, J: EventJournal> EntityStore<A, J> {
    /// Create a store writing to `journal` on behalf of `region`.
    pub fn new(journal: Arc<J>, region: Region) -> Self {
        Self {
            journal,
            region,
            snapshot_every: DEFAULT_SNAPSHOT_EVERY,
            slot_capacity: DEFAULT_SLOT_CAPACITY,
            slots: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Set the snapshot interval. `0` disables snapshots.
    #[must_use]
    pub const fn with_snapshot_every(mut self, every: u64) -> Self {
        self.snapshot_every = every;
        self
    }

    /// Set how many slots may be cached before idle ones are evicted.
    #[must_use]
    pub const fn with_slot_capacity(mut self, capacity: usize) -> Self {
        self.slot_capacity = capacity;
        self
    }

    /// Number of entity slots currently cached.
    pub fn cached_slots(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Region this store stamps on the events it produces.
    pub const fn region(&self) -> &Region {
        &self.region
    }

    /// The underlying journal.
    pub const fn journal(&self) -> &Arc<J> {
        &self.journal
    }

    /// Receive every event this store persists or replicates from now on.
    ///
    /// Events for one entity arrive in commit order. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<EventEnvelope<A::Event>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Run `command` against entity `id`.
    ///
    /// A command the domain rejects returns an [`Invocation`] with no
    /// events. Errors are journal or serialization failures; on error no
    /// event was persisted and the cached state is discarded.
    pub async fn invoke(
        &self,
        id: &A::Id,
        command: A::Command,
    ) -> Result<Invocation<A>, StoreError> {
        let key = id.to_string();
        let slot = self.slot(&key);
        let result = {
            let mut guard = slot.lock().await;
            self.invoke_locked(id, &key, command, &mut guard).await
        };
        self.release(&key, &slot);
        result
    }

    async fn invoke_locked(
        &self,
        id: &A::Id,
        key: &str,
        command: A::Command,
        slot: &mut Slot<A>,
    ) -> Result<Invocation<A>, StoreError> {
        self.ensure_loaded(key, slot).await?;

        let context = CommandContext {
            now: Utc::now(),
            region: self.region.clone(),
        };
        let decided = slot.state.decide(id, &command, &context);
        if decided.is_empty() {
            debug!(kind = A::KIND, entity = %key, ?command, "Command was a no-op");
            return Ok(Invocation {
                events: Vec::new(),
                state: slot.state.clone(),
            });
        }

        let mut sequence = slot.sequence;
        let envelopes: Vec<EventEnvelope<A::Event>> = decided
            .into_iter()
            .map(|event| {
                sequence = sequence.saturating_add(1);
                EventEnvelope {
                    event_id: EventId::new(),
                    entity_id: key.to_owned(),
                    sequence,
                    origin: self.region.clone(),
                    recorded_at: context.now,
                    event,
                }
            })
            .collect();

        self.commit(key, slot, &envelopes).await?;
        debug!(
            kind = A::KIND,
            entity = %key,
            events = envelopes.len(),
            sequence = slot.sequence,
            "Command persisted"
        );
        Ok(Invocation {
            state: slot.state.clone(),
            events: envelopes,
        })
    }

    /// Read the current state of entity `id`.
    pub async fn get(&self, id: &A::Id) -> Result<A, StoreError> {
        let key = id.to_string();
        let slot = self.slot(&key);
        let result = {
            let mut guard = slot.lock().await;
            self.ensure_loaded(&key, &mut guard)
                .await
                .map(|()| guard.state.clone())
        };
        self.release(&key, &slot);
        match result {
            Ok(state) if state.is_empty() => Err(StoreError::NotFound {
                kind: A::KIND,
                id: key,
            }),
            other => other,
        }
    }

    /// Store an event that was produced by another region's store.
    ///
    /// The event keeps its id, origin and timestamp but is re-sequenced
    /// onto the local stream. Returns `false` when the event is already
    /// known, which makes repeated delivery harmless.
    pub async fn replicate(&self, envelope: EventEnvelope<A::Event>) -> Result<bool, StoreError> {
        if envelope.entity_id.parse::<A::Id>().is_err() {
            return Err(StoreError::InvalidId {
                kind: A::KIND,
                id: envelope.entity_id,
            });
        }

        let key = envelope.entity_id.clone();
        let slot = self.slot(&key);
        let result = {
            let mut guard = slot.lock().await;
            self.replicate_locked(&key, envelope, &mut guard).await
        };
        self.release(&key, &slot);
        result
    }

    async fn replicate_locked(
        &self,
        key: &str,
        envelope: EventEnvelope<A::Event>,
        slot: &mut Slot<A>,
    ) -> Result<bool, StoreError> {
        self.ensure_loaded(key, slot).await?;

        if self
            .journal
            .contains(A::KIND, key, envelope.event_id)
            .await?
        {
            debug!(kind = A::KIND, entity = %key, event_id = %envelope.event_id, "Duplicate replicated event");
            return Ok(false);
        }

        let local = EventEnvelope {
            sequence: slot.sequence.saturating_add(1),
            ..envelope
        };
        self.commit(key, slot, core::slice::from_ref(&local))
            .await?;
        debug!(kind = A::KIND, entity = %key, origin = %local.origin, "Replicated event stored");
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn slot(&self, key: &str) -> SlotHandle<A> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get(key) {
            return Arc::clone(slot);
        }
        if slots.len() >= self.slot_capacity {
            let before = slots.len();
            // Only the map holds an idle slot.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            debug!(
                kind = A::KIND,
                evicted = before.saturating_sub(slots.len()),
                remaining = slots.len(),
                "Evicted idle slots"
            );
        }
        Arc::clone(slots.entry(key.to_owned()).or_default())
    }

    /// Drop the slot for `key` when it caches nothing worth keeping and the
    /// caller holds the last outside reference.
    fn release(&self, key: &str, slot: &SlotHandle<A>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let ours = slots.get(key).is_some_and(|cached| Arc::ptr_eq(cached, slot));
        if !ours || Arc::strong_count(slot) > 2 {
            return;
        }
        let vacant = slot
            .try_lock()
            .is_ok_and(|cached| !cached.loaded || cached.state.is_empty());
        if vacant {
            slots.remove(key);
        }
    }

    async fn ensure_loaded(&self, key: &str, slot: &mut Slot<A>) -> Result<(), StoreError> {
        if slot.loaded {
            return Ok(());
        }

        let (mut state, mut sequence) = match self.journal.load_snapshot(A::KIND, key).await? {
            Some(snapshot) => (
                serde_json::from_value::<A>(snapshot.state)?,
                snapshot.sequence,
            ),
            None => (A::default(), 0),
        };
        let snapshot_sequence = sequence;

        for stored in self.journal.load(A::KIND, key, sequence).await? {
            let envelope = EventEnvelope::<A::Event>::from_stored(stored)?;
            state = state.apply(&envelope.event);
            sequence = envelope.sequence;
        }

        slot.since_snapshot = sequence.saturating_sub(snapshot_sequence);
        slot.state = state;
        slot.sequence = sequence;
        slot.loaded = true;
        Ok(())
    }

    /// Persist, fold and publish `envelopes`, whose sequences must follow
    /// `slot.sequence`.
    async fn commit(
        &self,
        key: &str,
        slot: &mut Slot<A>,
        envelopes: &[EventEnvelope<A::Event>],
    ) -> Result<(), StoreError> {
        let stored = envelopes
            .iter()
            .map(EventEnvelope::to_stored)
            .collect::<Result<Vec<StoredEvent>, StoreError>>()?;

        if let Err(e) = self
            .journal
            .append(A::KIND, key, slot.sequence, &stored)
            .await
        {
            slot.loaded = false;
            return Err(e);
        }

        let mut state = core::mem::take(&mut slot.state);
        for envelope in envelopes {
            state = state.apply(&envelope.event);
            slot.sequence = envelope.sequence;
        }
        slot.state = state;
        slot.since_snapshot = slot
            .since_snapshot
            .saturating_add(u64::try_from(envelopes.len()).unwrap_or(u64::MAX));

        self.maybe_snapshot(key, slot).await;
        self.publish(envelopes);
        Ok(())
    }

    async fn maybe_snapshot(&self, key: &str, slot: &mut Slot<A>) {
        if self.snapshot_every == 0 || slot.since_snapshot < self.snapshot_every {
            return;
        }
        let state = match serde_json::to_value(&slot.state) {
            Ok(state) => state,
            Err(e) => {
                warn!(kind = A::KIND, entity = %key, error = %e, "Failed to serialize snapshot");
                return;
            }
        };
        let snapshot = StoredSnapshot {
            sequence: slot.sequence,
            taken_at: Utc::now(),
            state,
        };
        match self.journal.save_snapshot(A::KIND, key, &snapshot).await {
            Ok(()) => {
                slot.since_snapshot = 0;
                debug!(kind = A::KIND, entity = %key, sequence = slot.sequence, "Snapshot saved");
            }
            Err(e) => {
                warn!(kind = A::KIND, entity = %key, error = %e, "Failed to save snapshot");
            }
        }
    }

    fn publish(&self, envelopes: &[EventEnvelope<A::Event>]) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| {
            envelopes
                .iter()
                .all(|envelope| tx.send(envelope.clone()).is_ok())
        });
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::journal::MemoryJournal;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Tally {
        total: u32,
    }

    impl Aggregate for Tally {
        const KIND: &'static str = "tally";
        type Id = u32;
        type Command = u32;
        type Event = u32;

        fn is_empty(&self) -> bool {
            self.total == 0
        }

        fn decide(&self, _id: &u32, command: &u32, _context: &CommandContext) -> Vec<u32> {
            if *command == 0 { Vec::new() } else { vec![*command] }
        }

        fn apply(self, event: &u32) -> Self {
            Self {
                total: self.total.saturating_add(*event),
            }
        }
    }

    fn store() -> EntityStore<Tally, MemoryJournal> {
        EntityStore::new(Arc::new(MemoryJournal::new()), Region::Local)
    }

    #[tokio::test]
    async fn noop_persists_nothing() {
        let store = store();
        let result = store.invoke(&1, 0).await;
        assert!(result.is_ok_and(|inv| inv.is_noop()));
        assert!(store.journal().is_empty());
    }

    #[tokio::test]
    async fn sequences_start_at_one() {
        let store = store();
        let _ = store.invoke(&1, 5).await;
        let second = store.invoke(&1, 2).await;
        let sequences: Vec<u64> = second
            .map(|inv| inv.events.iter().map(|e| e.sequence).collect())
            .unwrap_or_default();
        assert_eq!(sequences, vec![2]);
    }

    #[tokio::test]
    async fn get_on_empty_entity_is_not_found() {
        let store = store();
        assert!(matches!(
            store.get(&9).await,
            Err(StoreError::NotFound { kind: "tally", .. })
        ));
    }

    #[tokio::test]
    async fn missing_entities_are_not_cached() {
        let store = store();
        for id in 1..=1_000 {
            assert!(store.get(&id).await.is_err());
        }
        assert_eq!(store.cached_slots(), 0);

        let noop = store.invoke(&7, 0).await;
        assert!(noop.is_ok_and(|inv| inv.is_noop()));
        assert_eq!(store.cached_slots(), 0);

        let _ = store.invoke(&7, 3).await;
        assert_eq!(store.cached_slots(), 1);
        assert_eq!(store.journal().len(), 1);
    }

    #[tokio::test]
    async fn idle_slots_are_evicted_at_capacity() {
        let store = store().with_slot_capacity(4);
        for id in 1..=10 {
            let _ = store.invoke(&id, id).await;
        }
        assert!(store.cached_slots() <= 4);

        // Evicted entities reload from the journal.
        assert_eq!(store.get(&1).await.map(|t| t.total).ok(), Some(1));
        let next = store.invoke(&1, 2).await;
        let sequences: Vec<u64> = next
            .map(|inv| inv.events.iter().map(|e| e.sequence).collect())
            .unwrap_or_default();
        assert_eq!(sequences, vec![2]);
        assert_eq!(store.get(&1).await.map(|t| t.total).ok(), Some(3));
    }

    #[tokio::test]
    async fn replicate_rejects_unparseable_ids() {
        let store = store();
        let envelope = EventEnvelope {
            event_id: EventId::new(),
            entity_id: "not-a-number".to_owned(),
            sequence: 1,
            origin: Region::from_name("remote"),
            recorded_at: Utc::now(),
            event: 3,
        };
        assert!(matches!(
            store.replicate(envelope).await,
            Err(StoreError::InvalidId { .. })
        ));
    }
}
