//! Domain models for the PEGS catalog.
//!
//! # Core Concepts
//!
//! - [`Requirement`]: a typed requirement. Its concrete kind is a [`ReqType`]
//!   tag over a shared base record; kind-specific fields live in [`KindProps`].
//! - [`ReqId`]: the human-readable `<prefix><n>` identifier, allocated once
//!   per identity from a per-prefix sequence.
//! - [`RequirementRelation`]: a directed [`RelType`] link between two
//!   requirements of the same solution.
//!
//! Both entity families are versioned: each mutation yields a new snapshot
//! and deletion yields a tombstone snapshot.

mod kind;
mod relation;
mod req_id;
mod requirement;

pub use kind::*;
pub use relation::*;
pub use req_id::*;
pub use requirement::*;
