//! Shared type definitions for Cellgrid.
//!
//! Cellgrid keeps a sparse, unbounded 2D grid in which every cell is an
//! independently persisted, event-sourced entity. This crate holds the
//! vocabulary every other crate speaks.
//!
//! # Modules
//!
//! - [`ids`] -- [`CellId`] (the `"row x col"` partition key) and [`EventId`]
//! - [`region`] -- [`Region`] tags used for multi-region loop prevention
//! - [`enums`] -- the [`Status`] color enumeration
//! - [`structs`] -- timing stamps, rectangles and read-model rows

pub mod enums;
pub mod ids;
pub mod region;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{Status, UnknownStatus};
pub use ids::{CellId, CellIdError, EventId};
pub use region::{LOCAL_REGION_NAME, Region};
pub use structs::{CellPage, CellRow, Rect, Timing};
