//! Error types for the entity runtime.
//!
//! A command whose guard fails is *not* an error: it returns an
//! [`Invocation`](crate::Invocation) with no events. Everything in
//! [`StoreError`] is a real failure.

/// Errors that can occur while invoking, reading or replicating entities.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The entity has never accepted a command.
    #[error("{kind} '{id}' not found")]
    NotFound {
        /// Aggregate kind (e.g. `grid-cell`).
        kind: &'static str,
        /// Entity id.
        id: String,
    },

    /// Another writer advanced the entity's stream first.
    #[error("{kind} '{id}' sequence conflict: expected {expected}, found {actual}")]
    Conflict {
        /// Aggregate kind.
        kind: String,
        /// Entity id.
        id: String,
        /// Sequence the writer based its decision on.
        expected: u64,
        /// Sequence found in the journal.
        actual: u64,
    },

    /// An entity id received from outside the process does not parse.
    #[error("invalid {kind} id {id:?}")]
    InvalidId {
        /// Aggregate kind.
        kind: &'static str,
        /// The id as received.
        id: String,
    },

    /// The journal backend failed.
    #[error("journal error: {0}")]
    Journal(String),

    /// An event or snapshot could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether retrying the same command later may succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Journal(_))
    }
}
