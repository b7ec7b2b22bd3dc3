//! The [`Aggregate`] trait: the pure decision and fold functions a domain
//! plugs into the runtime.

use core::fmt;
use core::hash::Hash;
use core::str::FromStr;

use cellgrid_types::Region;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Ambient inputs to a decision that the domain must not read itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    /// Wall-clock reading taken once per invocation.
    pub now: DateTime<Utc>,
    /// Region of the store processing the command.
    pub region: Region,
}

/// An event-sourced entity type.
///
/// `Default` is the empty state every entity starts from before its first
/// accepted command. `decide` and `apply` must be pure: the runtime may
/// call `apply` again during replay and expects the same result.
pub trait Aggregate:
    Clone + Default + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Stable name of the entity type, used as the journal partition.
    const KIND: &'static str;

    /// Entity key. Its `Display` form is the journal key.
    type Id: Clone + fmt::Display + FromStr + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    /// Commands this entity accepts.
    type Command: fmt::Debug + Send + Sync;

    /// Events this entity persists.
    type Event: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Whether the entity has never accepted a command.
    fn is_empty(&self) -> bool;

    /// Decide which events `command` produces against the current state.
    ///
    /// An empty vector is a valid outcome (a no-op), not an error.
    fn decide(
        &self,
        id: &Self::Id,
        command: &Self::Command,
        context: &CommandContext,
    ) -> Vec<Self::Event>;

    /// Fold one event into the state.
    #[must_use]
    fn apply(self, event: &Self::Event) -> Self;
}
