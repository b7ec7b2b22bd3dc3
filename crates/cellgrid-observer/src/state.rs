//! Shared application state for the HTTP surface.

use std::sync::Arc;

use cellgrid_core::{GridRuntime, MemoryGridService};
use cellgrid_store::EventJournal;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
pub struct AppState<J: EventJournal> {
    /// The command and query service every handler delegates to.
    pub service: Arc<MemoryGridService<J>>,
}

impl<J: EventJournal> AppState<J> {
    /// State serving `service`.
    pub const fn new(service: Arc<MemoryGridService<J>>) -> Self {
        Self { service }
    }

    /// State serving the service of a running node.
    pub fn from_runtime(runtime: &GridRuntime<J>) -> Self {
        Self::new(Arc::clone(runtime.service()))
    }
}
