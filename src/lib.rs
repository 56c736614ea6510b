pub mod api;
pub mod config;

pub use pegs_core::{catalog, db, error, models, registry, store, validation, versioning};
pub use pegs_core::{Catalog, CatalogConfig, Database, PegsError};
