//! Error taxonomy for catalog operations.

use thiserror::Error;
use uuid::Uuid;

use crate::models::ReqType;

/// Result alias used by every catalog and storage operation.
pub type Result<T, E = PegsError> = std::result::Result<T, E>;

/// Which family of versioned entity an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Requirement,
    Relation,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requirement => "requirement",
            Self::Relation => "relation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "requirement" => Some(Self::Requirement),
            "relation" => Some(Self::Relation),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures surfaced by the catalog.
///
/// Every variant except [`PegsError::UnknownKind`], [`PegsError::Storage`] and
/// [`PegsError::Serialization`] is a recoverable caller error. None of them is
/// raised after a partial commit: a failing operation leaves the store untouched.
#[derive(Debug, Error)]
pub enum PegsError {
    /// The submitted field set does not satisfy the kind's schema.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A persisted kind tag is not part of the registry. Only reachable with a
    /// corrupt or foreign database.
    #[error("unknown requirement kind '{0}'")]
    UnknownKind(String),

    /// An update tried to change the concrete kind of an existing requirement.
    #[error("requirement {id} is a {existing} and cannot become a {requested}")]
    ImmutableKind {
        id: Uuid,
        existing: ReqType,
        requested: ReqType,
    },

    /// A relation violates the semantic rules of its kind.
    #[error("relation constraint violated: {0}")]
    RelationConstraint(String),

    /// The entity advanced past the version the caller based its change on.
    #[error("{entity} {id} was modified concurrently (expected version {expected}, found {actual})")]
    ConcurrentModification {
        entity: EntityKind,
        id: Uuid,
        expected: u32,
        actual: u32,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: Uuid },

    /// The identity exists but its latest version is a tombstone.
    #[error("{entity} {id} has been deleted")]
    Deleted { entity: EntityKind, id: Uuid },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PegsError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn relation(msg: impl Into<String>) -> Self {
        Self::RelationConstraint(msg.into())
    }

    /// True for errors caused by the caller's input or by a lost race, as
    /// opposed to faults of the store itself.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::UnknownKind(_) | Self::Storage(_) | Self::Serialization(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_round_trips_through_str() {
        for kind in [EntityKind::Requirement, EntityKind::Relation] {
            assert_eq!(EntityKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::from_str("feature"), None);
    }

    #[test]
    fn internal_failures_are_not_recoverable() {
        assert!(!PegsError::UnknownKind("widget".into()).is_recoverable());
        assert!(PegsError::validation("name too long").is_recoverable());
        assert!(PegsError::NotFound {
            entity: EntityKind::Requirement,
            id: Uuid::nil()
        }
        .is_recoverable());
    }

    #[test]
    fn messages_name_the_entity() {
        let err = PegsError::Deleted {
            entity: EntityKind::Relation,
            id: Uuid::nil(),
        };
        assert_eq!(
            err.to_string(),
            "relation 00000000-0000-0000-0000-000000000000 has been deleted"
        );
    }
}
