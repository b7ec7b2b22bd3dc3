//! Cellgrid domain logic.
//!
//! Pure decision and fold functions for the entities that live in the
//! entity store, plus the predator pursuit algorithm the propagation
//! consumer consults before moving a predator.
//!
//! # Modules
//!
//! - [`cell`] -- the grid cell aggregate: commands, events and guards
//! - [`geometry`] -- radius checks with the spread cap
//! - [`predator`] -- short- and long-range pursuit, compass quantization
//! - [`sensor`] -- the sensor aggregate
//! - [`error`] -- [`DomainError`]

pub mod cell;
pub mod error;
pub mod geometry;
pub mod predator;
pub mod sensor;

pub use cell::{CellCommand, CellEvent, CellState, PredatorStep, Spread, StatusUpdated};
pub use error::DomainError;
pub use geometry::{MAX_SPREAD_RADIUS, inside_radius};
pub use predator::{Heading, next_cell};
pub use sensor::{SensorCommand, SensorEvent, SensorId, SensorState};
