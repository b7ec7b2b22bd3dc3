//! Integration tests for the entity runtime.
//!
//! A small counter aggregate exercises replay, snapshots, per-key
//! serialization, replication and subscriber delivery against the
//! in-memory journal.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use std::sync::Arc;

use cellgrid_store::{
    Aggregate, CommandContext, EntityStore, EventEnvelope, EventJournal, MemoryJournal, StoreError,
};
use cellgrid_types::{EventId, Region};
use chrono::Utc;
use serde::{Deserialize, Serialize};

// =============================================================================
// Test aggregate
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Counter {
    id: Option<String>,
    total: i64,
    touched_by: Vec<String>,
}

#[derive(Debug)]
enum CounterCommand {
    Add(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum CounterEvent {
    Added { id: String, amount: i64, region: String },
}

impl Aggregate for Counter {
    const KIND: &'static str = "counter";
    type Id = String;
    type Command = CounterCommand;
    type Event = CounterEvent;

    fn is_empty(&self) -> bool {
        self.id.is_none()
    }

    fn decide(&self, id: &String, command: &CounterCommand, ctx: &CommandContext) -> Vec<CounterEvent> {
        match command {
            CounterCommand::Add(0) => Vec::new(),
            CounterCommand::Add(amount) => vec![CounterEvent::Added {
                id: id.clone(),
                amount: *amount,
                region: ctx.region.to_string(),
            }],
        }
    }

    fn apply(mut self, event: &CounterEvent) -> Self {
        match event {
            CounterEvent::Added { id, amount, region } => {
                self.id = Some(id.clone());
                self.total += amount;
                self.touched_by.push(region.clone());
            }
        }
        self
    }
}

fn id(s: &str) -> String {
    s.to_owned()
}

fn new_store(journal: &Arc<MemoryJournal>) -> EntityStore<Counter, MemoryJournal> {
    EntityStore::new(Arc::clone(journal), Region::Local)
}

fn foreign_envelope(entity: &str, amount: i64) -> EventEnvelope<CounterEvent> {
    EventEnvelope {
        event_id: EventId::new(),
        entity_id: entity.to_owned(),
        sequence: 42,
        origin: Region::from_name("far-away"),
        recorded_at: Utc::now(),
        event: CounterEvent::Added {
            id: entity.to_owned(),
            amount,
            region: "far-away".to_owned(),
        },
    }
}

// =============================================================================
// Invoke / get
// =============================================================================

#[tokio::test]
async fn invoke_returns_events_and_new_state() {
    let journal = Arc::new(MemoryJournal::new());
    let store = new_store(&journal);

    let inv = store.invoke(&id("a"), CounterCommand::Add(3)).await.unwrap();
    assert_eq!(inv.events.len(), 1);
    assert_eq!(inv.events[0].sequence, 1);
    assert_eq!(inv.events[0].origin, Region::Local);
    assert_eq!(inv.state.total, 3);

    let state = store.get(&id("a")).await.unwrap();
    assert_eq!(state, inv.state);
}

#[tokio::test]
async fn noop_is_success_not_error() {
    let journal = Arc::new(MemoryJournal::new());
    let store = new_store(&journal);

    let inv = store.invoke(&id("a"), CounterCommand::Add(0)).await.unwrap();
    assert!(inv.is_noop());
    assert!(inv.state.is_empty());
    assert!(matches!(
        store.get(&id("a")).await,
        Err(StoreError::NotFound { .. })
    ));
}

#[tokio::test]
async fn state_is_rebuilt_from_journal_by_a_fresh_store() {
    let journal = Arc::new(MemoryJournal::new());
    {
        let store = new_store(&journal);
        for n in 1..=5 {
            store.invoke(&id("a"), CounterCommand::Add(n)).await.unwrap();
        }
    }

    let fresh = new_store(&journal);
    let state = fresh.get(&id("a")).await.unwrap();
    assert_eq!(state.total, 15);

    let next = fresh.invoke(&id("a"), CounterCommand::Add(1)).await.unwrap();
    assert_eq!(next.events[0].sequence, 6);
}

#[tokio::test]
async fn replay_uses_snapshot_plus_tail() {
    let journal = Arc::new(MemoryJournal::new());
    {
        let store = new_store(&journal).with_snapshot_every(4);
        for _ in 0..10 {
            store.invoke(&id("a"), CounterCommand::Add(1)).await.unwrap();
        }
    }

    let snapshot = journal
        .load_snapshot(Counter::KIND, "a")
        .await
        .unwrap()
        .expect("snapshot should exist");
    assert_eq!(snapshot.sequence, 8);

    let fresh = new_store(&journal).with_snapshot_every(4);
    assert_eq!(fresh.get(&id("a")).await.unwrap().total, 10);
}

#[tokio::test]
async fn concurrent_commands_on_one_id_are_serialized() {
    let journal = Arc::new(MemoryJournal::new());
    let store = Arc::new(new_store(&journal));

    let mut handles = Vec::new();
    for _ in 0..50 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.invoke(&id("hot"), CounterCommand::Add(2)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(store.get(&id("hot")).await.unwrap().total, 100);
    let sequences: Vec<u64> = journal
        .events(Counter::KIND, "hot")
        .iter()
        .map(|e| e.sequence)
        .collect();
    assert_eq!(sequences, (1..=50).collect::<Vec<u64>>());
}

#[tokio::test]
async fn different_ids_have_independent_streams() {
    let journal = Arc::new(MemoryJournal::new());
    let store = new_store(&journal);

    let a = store.invoke(&id("a"), CounterCommand::Add(1)).await.unwrap();
    let b = store.invoke(&id("b"), CounterCommand::Add(1)).await.unwrap();
    assert_eq!(a.events[0].sequence, 1);
    assert_eq!(b.events[0].sequence, 1);
}

#[tokio::test]
async fn stale_writer_gets_conflict_then_recovers() {
    let journal = Arc::new(MemoryJournal::new());
    let first = new_store(&journal);
    let second = new_store(&journal);

    first.invoke(&id("a"), CounterCommand::Add(1)).await.unwrap();
    second.invoke(&id("a"), CounterCommand::Add(1)).await.unwrap();

    // `first` still caches sequence 1.
    let err = first.invoke(&id("a"), CounterCommand::Add(1)).await.unwrap_err();
    assert!(err.is_transient());
    assert!(matches!(err, StoreError::Conflict { expected: 1, actual: 2, .. }));

    let retried = first.invoke(&id("a"), CounterCommand::Add(1)).await.unwrap();
    assert_eq!(retried.state.total, 3);
    assert_eq!(retried.events[0].sequence, 3);
}

// =============================================================================
// Replication and subscribers
// =============================================================================

#[tokio::test]
async fn replicated_events_keep_origin_and_are_deduplicated() {
    let journal = Arc::new(MemoryJournal::new());
    let store = new_store(&journal);
    store.invoke(&id("a"), CounterCommand::Add(1)).await.unwrap();

    let envelope = foreign_envelope("a", 5);
    assert!(store.replicate(envelope.clone()).await.unwrap());
    assert!(!store.replicate(envelope.clone()).await.unwrap());

    let stored = journal.events(Counter::KIND, "a");
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].sequence, 2);
    assert_eq!(stored[1].event_id, envelope.event_id);
    assert_eq!(stored[1].origin, Region::from_name("far-away"));

    let state = store.get(&id("a")).await.unwrap();
    assert_eq!(state.total, 6);
    assert_eq!(state.touched_by, vec![id("local-development"), id("far-away")]);
}

#[tokio::test]
async fn subscribers_see_events_in_commit_order() {
    let journal = Arc::new(MemoryJournal::new());
    let store = new_store(&journal);
    let mut rx = store.subscribe();

    store.invoke(&id("a"), CounterCommand::Add(1)).await.unwrap();
    store.invoke(&id("a"), CounterCommand::Add(0)).await.unwrap();
    store.invoke(&id("a"), CounterCommand::Add(2)).await.unwrap();
    store.replicate(foreign_envelope("a", 3)).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        seen.push((envelope.sequence, envelope.origin));
    }
    assert_eq!(
        seen,
        vec![
            (1, Region::Local),
            (2, Region::Local),
            (3, Region::from_name("far-away")),
        ]
    );
}

#[tokio::test]
async fn dropped_subscribers_are_pruned() {
    let journal = Arc::new(MemoryJournal::new());
    let store = new_store(&journal);
    let rx = store.subscribe();
    drop(rx);

    // Publishing to a closed channel must not fail the command.
    let inv = store.invoke(&id("a"), CounterCommand::Add(1)).await.unwrap();
    assert_eq!(inv.events.len(), 1);
}
