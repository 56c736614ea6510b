use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::kind::{PropsShape, ReqType};
use super::req_id::ReqId;
use crate::error::{PegsError, Result};
use crate::store::StoredVersion;

/// A requirement as seen at one version.
///
/// The base record is shared by every kind; `req_type` selects the concrete
/// kind and `props` carries the fields that kind adds. `req_id` is assigned on
/// creation and copied unchanged into every later version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: Uuid,
    pub req_type: ReqType,
    pub req_id: ReqId,
    pub name: String,
    pub description: String,
    /// Marks a placeholder for a property the schema cannot express yet.
    pub is_silence: bool,
    pub solution_id: Uuid,
    pub props: KindProps,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub modified_by: String,
    /// `effective_from` of this version.
    pub last_modified: DateTime<Utc>,
    pub version: u32,
    /// Set on the tombstone version only.
    pub deleted: bool,
}

/// The part of a requirement snapshot that is not held in dedicated columns.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RequirementContent {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) is_silence: bool,
    pub(crate) created_by: String,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) props: KindProps,
}

impl Requirement {
    pub(crate) fn content(&self) -> Result<Value> {
        Ok(serde_json::to_value(RequirementContent {
            name: self.name.clone(),
            description: self.description.clone(),
            is_silence: self.is_silence,
            created_by: self.created_by.clone(),
            created_at: self.created_at,
            props: self.props.clone(),
        })?)
    }

    pub(crate) fn from_stored(stored: StoredVersion) -> Result<Self> {
        let req_type = ReqType::from_tag(&stored.kind_tag)?;
        let req_id = stored
            .req_id
            .as_deref()
            .ok_or_else(|| {
                PegsError::validation(format!("requirement {} has no req_id", stored.entity_id))
            })?
            .parse::<ReqId>()
            .map_err(|e| PegsError::validation(e.to_string()))?;
        let content: RequirementContent = serde_json::from_value(stored.fields)?;

        Ok(Self {
            id: stored.entity_id,
            req_type,
            req_id,
            name: content.name,
            description: content.description,
            is_silence: content.is_silence,
            solution_id: stored.solution_id,
            props: content.props,
            created_by: content.created_by,
            created_at: content.created_at,
            modified_by: stored.modified_by,
            last_modified: stored.effective_from,
            version: stored.version,
            deleted: stored.deleted,
        })
    }
}

/// MoSCoW prioritization of behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MoscowPriority {
    Must,
    Should,
    Could,
    Wont,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintCategory {
    #[serde(rename = "Business Rule")]
    BusinessRule,
    #[serde(rename = "Physical Law")]
    PhysicalLaw,
    #[serde(rename = "Engineering Decision")]
    EngineeringDecision,
}

/// Kind-specific fields, one variant per [`PropsShape`].
///
/// Weak references (`parent_component`, `follows`) hold only the target's
/// identity; resolution goes through the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum KindProps {
    Plain,
    Component {
        parent_component: Option<Uuid>,
    },
    Person {
        email: Option<String>,
    },
    Behavior {
        priority: MoscowPriority,
    },
    Constraint {
        category: Option<ConstraintCategory>,
    },
    Consequence {
        follows: Option<Uuid>,
    },
}

impl KindProps {
    /// Builds the props of `shape` from an already validated field map.
    pub(crate) fn from_fields(shape: PropsShape, fields: Map<String, Value>) -> Result<Self> {
        let mut object = fields;
        object.insert("shape".into(), Value::String(shape_tag(shape).into()));
        Ok(serde_json::from_value(Value::Object(object))?)
    }

    /// Set fields as a map, the inverse of [`KindProps::from_fields`].
    pub(crate) fn to_fields(&self) -> Result<Map<String, Value>> {
        let Value::Object(mut object) = serde_json::to_value(self)? else {
            return Ok(Map::new());
        };
        object.remove("shape");
        object.retain(|_, value| !value.is_null());
        Ok(object)
    }

    pub fn priority(&self) -> Option<MoscowPriority> {
        match self {
            Self::Behavior { priority } => Some(*priority),
            _ => None,
        }
    }

    pub fn category(&self) -> Option<ConstraintCategory> {
        match self {
            Self::Constraint { category } => *category,
            _ => None,
        }
    }

    pub fn follows(&self) -> Option<Uuid> {
        match self {
            Self::Consequence { follows } => *follows,
            _ => None,
        }
    }

    pub fn parent_component(&self) -> Option<Uuid> {
        match self {
            Self::Component { parent_component } => *parent_component,
            _ => None,
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            Self::Person { email } => email.as_deref(),
            _ => None,
        }
    }
}

fn shape_tag(shape: PropsShape) -> &'static str {
    match shape {
        PropsShape::Plain => "plain",
        PropsShape::Component => "component",
        PropsShape::Person => "person",
        PropsShape::Behavior => "behavior",
        PropsShape::Constraint => "constraint",
        PropsShape::Consequence => "consequence",
    }
}

/// Input for creating a requirement.
///
/// Kind-specific fields (`priority`, `email`, ...) travel in `fields` and are
/// checked against the kind's schema before anything is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequirementInput {
    pub req_type: ReqType,
    pub solution_id: Uuid,
    /// Empty or missing names become `{Untitled <Kind>}`.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_silence: bool,
    pub created_by: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl CreateRequirementInput {
    pub fn new(req_type: ReqType, solution_id: Uuid, created_by: impl Into<String>) -> Self {
        Self {
            req_type,
            solution_id,
            name: None,
            description: None,
            is_silence: false,
            created_by: created_by.into(),
            fields: Map::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn silence(mut self) -> Self {
        self.is_silence = true;
        self
    }

    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }
}

/// Input for updating a requirement. Absent fields keep their current value;
/// an explicit `null` in `fields` clears an optional field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRequirementInput {
    /// Must name the requirement's existing kind.
    pub req_type: ReqType,
    pub modified_by: String,
    /// When set, the update fails unless this is still the latest version.
    #[serde(default)]
    pub expected_version: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_silence: Option<bool>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl UpdateRequirementInput {
    pub fn new(req_type: ReqType, modified_by: impl Into<String>) -> Self {
        Self {
            req_type,
            modified_by: modified_by.into(),
            expected_version: None,
            name: None,
            description: None,
            is_silence: None,
            fields: Map::new(),
        }
    }

    pub fn expecting(mut self, version: u32) -> Self {
        self.expected_version = Some(version);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }
}

/// Predicates for [`crate::Catalog::find_many`]; all set predicates must hold.
///
/// Silence requirements are hidden unless `is_silence` is changed from its
/// default of `Some(false)`; `None` matches both.
#[derive(Debug, Clone, PartialEq)]
pub struct RequirementFilter {
    /// Matches the listed kinds and their descendants. Empty matches all.
    pub req_types: Vec<ReqType>,
    pub solution_id: Option<Uuid>,
    /// Case-insensitive substring of the name.
    pub name: Option<String>,
    pub created_by: Option<String>,
    pub priority: Option<MoscowPriority>,
    pub category: Option<ConstraintCategory>,
    pub follows: Option<Uuid>,
    pub parent_component: Option<Uuid>,
    pub is_silence: Option<bool>,
    pub include_deleted: bool,
    pub as_of: Option<DateTime<Utc>>,
}

impl Default for RequirementFilter {
    fn default() -> Self {
        Self {
            req_types: Vec::new(),
            solution_id: None,
            name: None,
            created_by: None,
            priority: None,
            category: None,
            follows: None,
            parent_component: None,
            is_silence: Some(false),
            include_deleted: false,
            as_of: None,
        }
    }
}

impl RequirementFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_kind(mut self, req_type: ReqType) -> Self {
        self.req_types.push(req_type);
        self
    }

    pub fn in_solution(mut self, solution_id: Uuid) -> Self {
        self.solution_id = Some(solution_id);
        self
    }

    pub fn named_like(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn silence(mut self, is_silence: Option<bool>) -> Self {
        self.is_silence = is_silence;
        self
    }

    pub fn including_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    pub fn as_of(mut self, at: DateTime<Utc>) -> Self {
        self.as_of = Some(at);
        self
    }

    /// Concrete kind tags the kind filter expands to; empty means any kind.
    pub fn kind_tags(&self) -> Vec<String> {
        let mut kinds: Vec<ReqType> = self
            .req_types
            .iter()
            .flat_map(|kind| kind.concrete_descendants())
            .collect();
        kinds.sort();
        kinds.dedup();
        kinds.into_iter().map(|kind| kind.as_str().to_string()).collect()
    }

    /// Field predicates not pushed down to storage.
    pub fn matches(&self, req: &Requirement) -> bool {
        if let Some(is_silence) = self.is_silence {
            if req.is_silence != is_silence {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if !req.name.to_lowercase().contains(&name.to_lowercase()) {
                return false;
            }
        }
        if let Some(created_by) = &self.created_by {
            if &req.created_by != created_by {
                return false;
            }
        }
        if self.priority.is_some() && req.props.priority() != self.priority {
            return false;
        }
        if self.category.is_some() && req.props.category() != self.category {
            return false;
        }
        if self.follows.is_some() && req.props.follows() != self.follows {
            return false;
        }
        if self.parent_component.is_some()
            && req.props.parent_component() != self.parent_component
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn props_round_trip_through_field_maps() {
        let props = KindProps::Behavior {
            priority: MoscowPriority::Should,
        };
        let fields = props.to_fields().unwrap();
        assert_eq!(fields.get("priority"), Some(&json!("SHOULD")));
        assert!(fields.get("shape").is_none());
        assert_eq!(
            KindProps::from_fields(PropsShape::Behavior, fields).unwrap(),
            props
        );
    }

    #[test]
    fn unset_optional_props_are_left_out_of_field_maps() {
        let props = KindProps::Consequence { follows: None };
        assert!(props.to_fields().unwrap().is_empty());
        assert_eq!(
            KindProps::from_fields(PropsShape::Consequence, Map::new()).unwrap(),
            props
        );
    }

    #[test]
    fn constraint_categories_use_their_labels() {
        assert_eq!(
            serde_json::to_value(ConstraintCategory::PhysicalLaw).unwrap(),
            json!("Physical Law")
        );
        let parsed: ConstraintCategory = serde_json::from_value(json!("Business Rule")).unwrap();
        assert_eq!(parsed, ConstraintCategory::BusinessRule);
    }

    #[test]
    fn create_input_collects_kind_fields() {
        let input: CreateRequirementInput = serde_json::from_value(json!({
            "req_type": "functional_behavior",
            "solution_id": Uuid::nil(),
            "created_by": "alice",
            "priority": "COULD"
        }))
        .unwrap();
        assert_eq!(input.req_type, ReqType::FunctionalBehavior);
        assert_eq!(input.fields.get("priority"), Some(&json!("COULD")));
        assert!(!input.is_silence);
    }

    #[test]
    fn default_filter_hides_silence_only() {
        let filter = RequirementFilter::default();
        assert_eq!(filter.is_silence, Some(false));
        assert!(!filter.include_deleted);
        assert!(filter.kind_tags().is_empty());
    }

    #[test]
    fn kind_filter_expands_to_concrete_descendants() {
        let tags = RequirementFilter::new().of_kind(ReqType::Obstacle).kind_tags();
        assert_eq!(tags, vec!["obstacle".to_string(), "situation".to_string()]);
    }
}
