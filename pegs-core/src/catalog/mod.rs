//! The requirements catalog.
//!
//! [`Catalog`] is the single entry point for creating, versioning, querying
//! and relating requirements. It validates every change against the kind
//! registry and the relation rules, then hands complete snapshots to a
//! [`Storage`] implementation. It holds no state of its own beyond the store
//! handle and its policy flags, so it is cheap to clone when the store is.

mod relations;
mod requirements;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EntityKind, PegsError, Result};
use crate::store::{Storage, StoredVersion};
use crate::versioning;

/// Policy switches for a [`Catalog`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Reject a Contradicts relation on a pair that already Duplicates (and
    /// the reverse) instead of only logging it.
    #[serde(default)]
    pub strict_contradictions: bool,
}

#[derive(Clone)]
pub struct Catalog<S> {
    store: S,
    config: CatalogConfig,
}

impl<S: Storage> Catalog<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, CatalogConfig::default())
    }

    pub fn with_config(store: S, config: CatalogConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Latest version of a live identity of the given family, plus the
    /// number the next version will get.
    fn load_for_write(
        &self,
        entity: EntityKind,
        id: Uuid,
        expected: Option<u32>,
    ) -> Result<(StoredVersion, u32)> {
        let latest = self.load(entity, id)?;
        let next = versioning::next_version(entity, id, latest.as_ref(), expected)?;
        latest
            .map(|stored| (stored, next))
            .ok_or(PegsError::NotFound { entity, id })
    }

    /// Latest version of `id` if it belongs to the `entity` family.
    fn load(&self, entity: EntityKind, id: Uuid) -> Result<Option<StoredVersion>> {
        Ok(self
            .store
            .latest(id)?
            .filter(|stored| stored.entity_kind == entity))
    }
}
