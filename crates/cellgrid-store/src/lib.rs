//! Generic event-sourced entity runtime for Cellgrid.
//!
//! Every entity is addressed by a key and owns an append-only event
//! stream. The runtime reconstructs state by replaying that stream,
//! serializes commands per key, and hands persisted events to
//! subscribers. Domains plug in through the [`Aggregate`] trait; storage
//! plugs in through [`EventJournal`].
//!
//! # Modules
//!
//! - [`aggregate`] -- the [`Aggregate`] trait and [`CommandContext`]
//! - [`envelope`] -- [`EventEnvelope`], [`StoredEvent`] and [`StoredSnapshot`]
//! - [`journal`] -- the [`EventJournal`] trait and [`MemoryJournal`]
//! - [`store`] -- [`EntityStore`], the per-key command pipeline
//! - [`error`] -- [`StoreError`]

pub mod aggregate;
pub mod envelope;
pub mod error;
pub mod journal;
pub mod store;

pub use aggregate::{Aggregate, CommandContext};
pub use envelope::{EventEnvelope, StoredEvent, StoredSnapshot};
pub use error::StoreError;
pub use journal::{EventJournal, MemoryJournal};
pub use store::{DEFAULT_SLOT_CAPACITY, DEFAULT_SNAPSHOT_EVERY, EntityStore, Invocation};
