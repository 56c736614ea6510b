//! The storage collaborator seam.
//!
//! The catalog never talks to a database directly. It hands complete
//! snapshots to a [`Storage`] implementation, which must make each call atomic
//! and keep versions append-only. [`crate::db::Database`] is the SQLite
//! implementation.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{EntityKind, Result};
use crate::models::{Direction, ReqId};

/// A snapshot about to be written.
#[derive(Debug, Clone)]
pub struct VersionDraft {
    pub entity_id: Uuid,
    pub entity_kind: EntityKind,
    /// Requirement kind or relation kind discriminator.
    pub kind_tag: String,
    pub solution_id: Uuid,
    pub left_id: Option<Uuid>,
    pub right_id: Option<Uuid>,
    pub fields: Value,
    pub effective_from: DateTime<Utc>,
    pub deleted: bool,
    pub modified_by: String,
}

/// A snapshot as read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredVersion {
    pub entity_id: Uuid,
    pub version: u32,
    pub entity_kind: EntityKind,
    pub kind_tag: String,
    pub solution_id: Uuid,
    pub req_id: Option<String>,
    pub left_id: Option<Uuid>,
    pub right_id: Option<Uuid>,
    pub fields: Value,
    pub effective_from: DateTime<Utc>,
    pub deleted: bool,
    pub modified_by: String,
}

/// Selects the current version of many entities.
#[derive(Debug, Clone)]
pub struct VersionQuery {
    pub entity_kind: EntityKind,
    /// Empty matches every tag.
    pub kind_tags: Vec<String>,
    pub solution_id: Option<Uuid>,
    /// Restricts relations to those touching this requirement.
    pub endpoint: Option<(Uuid, Direction)>,
    pub include_deleted: bool,
    /// Reads the state as of this instant instead of the latest state.
    pub as_of: Option<DateTime<Utc>>,
}

impl VersionQuery {
    pub fn new(entity_kind: EntityKind) -> Self {
        Self {
            entity_kind,
            kind_tags: Vec::new(),
            solution_id: None,
            endpoint: None,
            include_deleted: false,
            as_of: None,
        }
    }
}

/// Read access handed to the guard of [`Storage::insert_guarded`].
pub trait VersionReader {
    fn query_latest(&self, query: &VersionQuery) -> Result<Vec<StoredVersion>>;
}

/// Append-only version storage.
///
/// Every method is a single atomic unit: either the whole write is durable or
/// nothing is. Reads only observe committed versions.
pub trait Storage: Send + Sync {
    /// Writes version 1 of a new identity. With `sequence_prefix`, the next
    /// number of that prefix is allocated in the same transaction and stored
    /// as the identity's `req_id`.
    fn insert_initial(
        &self,
        draft: VersionDraft,
        sequence_prefix: Option<&'static str>,
    ) -> Result<StoredVersion>;

    /// Appends version `expected + 1`. Fails with
    /// [`crate::PegsError::ConcurrentModification`] when the latest stored
    /// version is not `expected`. The `req_id` of the identity is carried
    /// over and `effective_from` is raised to the previous version's if it
    /// would otherwise go backwards.
    fn append_version(&self, draft: VersionDraft, expected: u32) -> Result<StoredVersion>;

    /// Writes version 1 of a new unnumbered identity once `guard` accepts the
    /// committed state. The guard runs in the same transaction as the insert,
    /// so no other write can land between the check and the row. Nothing is
    /// written when the guard fails.
    fn insert_guarded(
        &self,
        draft: VersionDraft,
        guard: &dyn Fn(&dyn VersionReader) -> Result<()>,
    ) -> Result<StoredVersion>;

    fn latest(&self, entity_id: Uuid) -> Result<Option<StoredVersion>>;

    /// Latest version with `effective_from <= at`.
    fn as_of(&self, entity_id: Uuid, at: DateTime<Utc>) -> Result<Option<StoredVersion>>;

    /// All versions of an identity, oldest first.
    fn history(&self, entity_id: Uuid) -> Result<Vec<StoredVersion>>;

    /// Current version of every matching identity.
    fn query_latest(&self, query: &VersionQuery) -> Result<Vec<StoredVersion>>;

    /// Looks up the identity holding `req_id`.
    fn find_by_req_id(&self, req_id: &ReqId) -> Result<Option<Uuid>>;
}
