//! PEGS requirements catalog.
//!
//! Requirements are classified by a closed hierarchy of kinds following the
//! PEGS (Project, Environment, Goals, System) structure, linked by typed
//! relations, and stored as append-only versions so that any past state can
//! be read back.
//!
//! The entry point is [`Catalog`], generic over a [`store::Storage`]
//! backend; [`db::Database`] is the SQLite one.

pub mod catalog;
pub mod db;
pub mod error;
pub mod models;
pub mod registry;
pub mod store;
pub mod validation;
pub mod versioning;

pub use catalog::{Catalog, CatalogConfig};
pub use db::Database;
pub use error::{EntityKind, PegsError, Result};
