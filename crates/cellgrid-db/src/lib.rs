//! `PostgreSQL` storage for the Cellgrid entity store.
//!
//! The entity runtime only needs an append-only log per entity plus an
//! optional snapshot. This crate provides both on top of two tables and
//! plugs into the runtime through [`EventJournal`](cellgrid_store::EventJournal).
//!
//! # Modules
//!
//! - [`postgres`] -- connection pool, configuration and migrations
//! - [`journal`] -- [`PgEventJournal`]
//! - [`error`] -- [`DbError`]

pub mod error;
pub mod journal;
pub mod postgres;

pub use error::DbError;
pub use journal::PgEventJournal;
pub use postgres::{PostgresConfig, PostgresPool};
