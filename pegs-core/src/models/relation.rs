use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PegsError, Result};
use crate::store::StoredVersion;

/// The kinds of directed binary relation between two requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelType {
    /// left is textually included in, or a sub-requirement of, right
    Belongs,
    /// left assumes right and adds a property right lacks
    Extends,
    /// left adds detail to right's properties
    Details,
    /// the properties of left and right cannot both hold
    Contradicts,
    /// left is a consequence of right
    Follows,
    /// left specifies the same property as right
    Repeats,
    /// a repetition between requirements of the same kind
    Duplicates,
    /// a repetition between requirements of different kinds
    Explains,
    /// some sub-requirement of left repeats some sub-requirement of right
    Shares,
    /// left, a constraint, applies to right
    Constrains,
    /// left and right are unrelated
    Disjoins,
    /// left is an exception to right's property
    Excepts,
    Characterizes,
}

impl RelType {
    pub const ALL: [RelType; 13] = [
        Self::Belongs,
        Self::Extends,
        Self::Details,
        Self::Contradicts,
        Self::Follows,
        Self::Repeats,
        Self::Duplicates,
        Self::Explains,
        Self::Shares,
        Self::Constrains,
        Self::Disjoins,
        Self::Excepts,
        Self::Characterizes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Belongs => "belongs",
            Self::Extends => "extends",
            Self::Details => "details",
            Self::Contradicts => "contradicts",
            Self::Follows => "follows",
            Self::Repeats => "repeats",
            Self::Duplicates => "duplicates",
            Self::Explains => "explains",
            Self::Shares => "shares",
            Self::Constrains => "constrains",
            Self::Disjoins => "disjoins",
            Self::Excepts => "excepts",
            Self::Characterizes => "characterizes",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|rel| rel.as_str() == s)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Belongs => "⊆",
            Self::Extends => ">",
            Self::Details => "»",
            Self::Contradicts => "⊕",
            Self::Follows => "⊣",
            Self::Repeats => "⇔",
            Self::Duplicates => "≡",
            Self::Explains => "≅",
            Self::Shares => "∩",
            Self::Constrains => "▸",
            Self::Disjoins => "||",
            Self::Excepts => "\\",
            Self::Characterizes => "—",
        }
    }

    /// `a R b` implies `b R a`.
    pub fn is_symmetric(&self) -> bool {
        matches!(
            self,
            Self::Contradicts | Self::Repeats | Self::Duplicates | Self::Shares | Self::Disjoins
        )
    }

    /// The relation this one refines: every `Details` pair is an `Extends`
    /// pair, every `Duplicates` or `Explains` pair is a `Repeats` pair.
    pub fn specializes(&self) -> Option<RelType> {
        match self {
            Self::Details => Some(Self::Extends),
            Self::Duplicates | Self::Explains => Some(Self::Repeats),
            _ => None,
        }
    }

    pub fn implies(&self, other: RelType) -> bool {
        *self == other || self.specializes() == Some(other)
    }
}

impl std::fmt::Display for RelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed relation between two requirements, as seen at one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementRelation {
    pub id: Uuid,
    pub rel_type: RelType,
    pub left_id: Uuid,
    pub right_id: Uuid,
    pub solution_id: Uuid,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub modified_by: String,
    pub last_modified: DateTime<Utc>,
    pub version: u32,
    pub deleted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RelationContent {
    pub(crate) created_by: String,
    pub(crate) created_at: DateTime<Utc>,
}

impl RequirementRelation {
    pub fn symbol(&self) -> &'static str {
        self.rel_type.symbol()
    }

    /// The other end of the relation, if `requirement_id` takes part in it.
    pub fn other_end(&self, requirement_id: Uuid) -> Option<Uuid> {
        if self.left_id == requirement_id {
            Some(self.right_id)
        } else if self.right_id == requirement_id {
            Some(self.left_id)
        } else {
            None
        }
    }

    /// True when this relation states `rel_type` between `left` and `right`,
    /// reading symmetric kinds in both orientations.
    pub fn connects(&self, rel_type: RelType, left: Uuid, right: Uuid) -> bool {
        self.rel_type == rel_type
            && ((self.left_id == left && self.right_id == right)
                || (rel_type.is_symmetric() && self.left_id == right && self.right_id == left))
    }

    pub(crate) fn from_stored(stored: StoredVersion) -> Result<Self> {
        let rel_type = RelType::from_str(&stored.kind_tag).ok_or_else(|| {
            tracing::error!(tag = %stored.kind_tag, "Encountered unregistered relation kind");
            PegsError::UnknownKind(stored.kind_tag.clone())
        })?;
        let (Some(left_id), Some(right_id)) = (stored.left_id, stored.right_id) else {
            return Err(PegsError::validation(format!(
                "relation {} is missing an endpoint",
                stored.entity_id
            )));
        };
        let content: RelationContent = serde_json::from_value(stored.fields)?;

        Ok(Self {
            id: stored.entity_id,
            rel_type,
            left_id,
            right_id,
            solution_id: stored.solution_id,
            created_by: content.created_by,
            created_at: content.created_at,
            modified_by: stored.modified_by,
            last_modified: stored.effective_from,
            version: stored.version,
            deleted: stored.deleted,
        })
    }
}

/// Input for relating two requirements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRelationInput {
    pub rel_type: RelType,
    pub left_id: Uuid,
    pub right_id: Uuid,
    pub created_by: String,
}

/// Which end of a relation a requirement must occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Right,
    #[default]
    Either,
}

/// A problem found by [`crate::Catalog::check_consistency`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum ConsistencyIssue {
    SelfRelation { relation_id: Uuid },
    ContradictsAndDuplicates { left_id: Uuid, right_id: Uuid },
    /// Requirements that reach each other through `Belongs`.
    BelongsCycle { members: Vec<Uuid> },
    DanglingRelation { relation_id: Uuid, requirement_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for rel in RelType::ALL {
            assert_eq!(RelType::from_str(rel.as_str()), Some(rel));
        }
    }

    #[test]
    fn repetitions_specialize_repeats() {
        assert!(RelType::Duplicates.implies(RelType::Repeats));
        assert!(RelType::Explains.implies(RelType::Repeats));
        assert!(RelType::Details.implies(RelType::Extends));
        assert!(!RelType::Repeats.implies(RelType::Duplicates));
        assert!(!RelType::Contradicts.implies(RelType::Repeats));
    }

    #[test]
    fn disjoins_is_symmetric_and_follows_is_not() {
        assert!(RelType::Disjoins.is_symmetric());
        assert!(RelType::Contradicts.is_symmetric());
        assert!(!RelType::Follows.is_symmetric());
        assert!(!RelType::Explains.is_symmetric());
    }

    fn relation(rel_type: RelType, left: Uuid, right: Uuid) -> RequirementRelation {
        let now = Utc::now();
        RequirementRelation {
            id: Uuid::new_v4(),
            rel_type,
            left_id: left,
            right_id: right,
            solution_id: Uuid::nil(),
            created_by: "test".into(),
            created_at: now,
            modified_by: "test".into(),
            last_modified: now,
            version: 1,
            deleted: false,
        }
    }

    #[test]
    fn symmetric_relations_connect_both_orientations() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let contradicts = relation(RelType::Contradicts, a, b);
        assert!(contradicts.connects(RelType::Contradicts, b, a));

        let belongs = relation(RelType::Belongs, a, b);
        assert!(belongs.connects(RelType::Belongs, a, b));
        assert!(!belongs.connects(RelType::Belongs, b, a));
        assert_eq!(belongs.other_end(a), Some(b));
        assert_eq!(belongs.other_end(Uuid::new_v4()), None);
    }
}
