//! HTTP surface for Cellgrid.
//!
//! This crate provides an Axum server that exposes:
//!
//! - **Cell commands** (`PUT /grid-cell/...`) for status updates, span,
//!   fill, clear, erase, predators and rectangle fills
//! - **Cell queries** (`GET /grid-cell/...`) for entity state, read-model
//!   rows, paginated rectangle listings and the serving region
//! - **Sensor endpoints** (`/sensor/...`) for status reports
//!
//! Handlers are thin: every request is passed to the shared
//! [`cellgrid_core::GridService`] and its result or error is rendered as
//! JSON. Commands answer as soon as their own cell has committed; the
//! propagation they trigger continues in the background.

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;

pub use error::ObserverError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use state::AppState;
