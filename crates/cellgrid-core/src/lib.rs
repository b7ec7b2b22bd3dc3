//! Cellgrid node logic above the entity store.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `cellgrid-config.yaml`
//! - [`view`] -- [`CellQuery`] and the in-memory [`MemoryCellView`]
//! - [`pursuit`] -- read-model backed predator pursuit
//! - [`retry`] -- exponential backoff with jitter
//! - [`consumer`] -- the [`PropagationConsumer`]
//! - [`bulk`] -- rectangle fill
//! - [`service`] -- the client-facing [`GridService`]
//! - [`runtime`] -- [`GridRuntime`], which wires everything together

pub mod bulk;
pub mod config;
pub mod consumer;
pub mod pursuit;
pub mod retry;
pub mod runtime;
pub mod service;
pub mod view;

pub use bulk::{BulkFillReport, fill_rectangle, subdivide};
pub use config::{ConfigError, GridConfig, JournalBackend};
pub use consumer::{Disposition, PropagationConsumer};
pub use pursuit::Pursuit;
pub use retry::RetryPolicy;
pub use runtime::{GridRuntime, MemoryGridService};
pub use service::{
    CellRequest, CommandReceipt, FillJob, FillRectangleRequest, GridService, SensorRequest,
    ServiceError, ServiceSettings,
};
pub use view::{CellQuery, MemoryCellView, ViewError, collect_cells_in_area};
