//! Static metadata for every requirement kind.
//!
//! The registry is a pure lookup table: identifier prefix, parent kind,
//! abstractness and the declarative field schema of each [`ReqType`]. Field
//! specs are declared on the kind that introduces them and inherited by every
//! descendant, see [`fields_of`].

use serde::Serialize;

use crate::models::ReqType;

/// MoSCoW priority values accepted by the `priority` field.
pub const PRIORITY_VALUES: &[&str] = &["MUST", "SHOULD", "COULD", "WONT"];

/// Constraint categories accepted by the `category` field.
pub const CATEGORY_VALUES: &[&str] = &["Business Rule", "Physical Law", "Engineering Decision"];

/// Value type of a kind-specific field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "of", rename_all = "snake_case")]
pub enum FieldType {
    Email,
    /// UUID of a live requirement of the given kind (or a descendant).
    Reference(ReqType),
    /// One of a fixed list of string values.
    Enum(&'static [&'static str]),
}

/// Declarative schema entry for one kind-specific field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    #[serde(rename = "field_type")]
    pub ty: FieldType,
    pub required: bool,
    /// Applied on create when the field is absent.
    pub default: Option<&'static str>,
}

/// Registry entry for one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KindInfo {
    pub req_type: ReqType,
    pub label: &'static str,
    pub prefix: Option<&'static str>,
    pub parent: Option<ReqType>,
    pub is_abstract: bool,
    /// Fields introduced by this kind; see [`fields_of`] for the inherited set.
    pub fields: &'static [FieldSpec],
}

const COMPONENT_FIELDS: &[FieldSpec] = &[FieldSpec {
    name: "parent_component",
    ty: FieldType::Reference(ReqType::Component),
    required: false,
    default: None,
}];

const PERSON_FIELDS: &[FieldSpec] = &[FieldSpec {
    name: "email",
    ty: FieldType::Email,
    required: true,
    default: None,
}];

const BEHAVIOR_FIELDS: &[FieldSpec] = &[FieldSpec {
    name: "priority",
    ty: FieldType::Enum(PRIORITY_VALUES),
    required: true,
    default: Some("MUST"),
}];

const CONSTRAINT_FIELDS: &[FieldSpec] = &[FieldSpec {
    name: "category",
    ty: FieldType::Enum(CATEGORY_VALUES),
    required: true,
    default: None,
}];

const FOLLOWS_FIELDS: &[FieldSpec] = &[FieldSpec {
    name: "follows",
    ty: FieldType::Reference(ReqType::ParsedRequirement),
    required: false,
    default: None,
}];

const fn kind(
    req_type: ReqType,
    label: &'static str,
    prefix: Option<&'static str>,
    parent: Option<ReqType>,
    fields: &'static [FieldSpec],
) -> KindInfo {
    KindInfo {
        req_type,
        label,
        prefix,
        parent,
        is_abstract: prefix.is_none(),
        fields,
    }
}

// Indexed by `ReqType as usize`; order must match the enum declaration.
#[rustfmt::skip]
static KINDS: [KindInfo; 34] = [
    kind(ReqType::Actor, "Actor", None, None, &[]),
    kind(ReqType::Component, "Component", None, Some(ReqType::Actor), COMPONENT_FIELDS),
    kind(ReqType::GlossaryTerm, "Glossary Term", Some("E.1."), Some(ReqType::Component), &[]),
    kind(ReqType::SystemComponent, "System Component", Some("S.1."), Some(ReqType::Component), &[]),
    kind(ReqType::EnvironmentComponent, "Environment Component", Some("E.2."), Some(ReqType::Component), &[]),
    kind(ReqType::Person, "Person", Some("P.1."), Some(ReqType::Actor), PERSON_FIELDS),
    kind(ReqType::Goal, "Goal", None, None, &[]),
    kind(ReqType::Obstacle, "Obstacle", Some("G.2."), Some(ReqType::Goal), FOLLOWS_FIELDS),
    kind(ReqType::Situation, "Situation", Some("G.2."), Some(ReqType::Obstacle), &[]),
    kind(ReqType::Outcome, "Outcome", Some("G.3."), Some(ReqType::Goal), FOLLOWS_FIELDS),
    kind(ReqType::Behavior, "Behavior", None, None, BEHAVIOR_FIELDS),
    kind(ReqType::Functionality, "Functionality", None, Some(ReqType::Behavior), &[]),
    kind(ReqType::FunctionalBehavior, "Functional Behavior", Some("S.2."), Some(ReqType::Functionality), &[]),
    kind(ReqType::NonFunctionalBehavior, "Non-Functional Behavior", Some("S.2."), Some(ReqType::Functionality), &[]),
    kind(ReqType::Example, "Example", Some("S.4."), Some(ReqType::Behavior), &[]),
    kind(ReqType::TestCase, "Test Case", Some("S.6."), Some(ReqType::Example), &[]),
    kind(ReqType::Scenario, "Scenario", None, Some(ReqType::Behavior), &[]),
    kind(ReqType::Epic, "Epic", Some("G.5."), Some(ReqType::Scenario), &[]),
    kind(ReqType::UserStory, "User Story", Some("G.5."), Some(ReqType::Scenario), &[]),
    kind(ReqType::Responsibility, "Responsibility", None, None, &[]),
    kind(ReqType::Role, "Role", Some("P.1."), Some(ReqType::Responsibility), &[]),
    kind(ReqType::Noise, "Noise", Some("M.3."), None, &[]),
    kind(ReqType::Hint, "Hint", Some("M.3."), Some(ReqType::Noise), &[]),
    kind(ReqType::MetaRequirement, "Meta Requirement", None, None, &[]),
    kind(ReqType::Justification, "Justification", Some("M.1."), Some(ReqType::MetaRequirement), &[]),
    kind(ReqType::ParsedRequirement, "Parsed Requirement", Some("M.2."), Some(ReqType::MetaRequirement), &[]),
    kind(ReqType::Assumption, "Assumption", Some("E.4."), None, FOLLOWS_FIELDS),
    kind(ReqType::Effect, "Effect", Some("E.5."), None, FOLLOWS_FIELDS),
    kind(ReqType::Limit, "Limit", Some("G.6."), None, FOLLOWS_FIELDS),
    kind(ReqType::Invariant, "Invariant", Some("E.6."), None, &[]),
    kind(ReqType::Product, "Product", Some("P.4."), None, &[]),
    kind(ReqType::Task, "Task", Some("P.4."), None, &[]),
    kind(ReqType::Silence, "Silence", Some("M.0."), None, &[]),
    kind(ReqType::Constraint, "Constraint", Some("E.3."), None, CONSTRAINT_FIELDS),
];

pub fn info(req_type: ReqType) -> &'static KindInfo {
    &KINDS[req_type as usize]
}

pub fn all() -> &'static [KindInfo] {
    &KINDS
}

/// Own and inherited field specs, root-most kind first.
pub fn fields_of(req_type: ReqType) -> Vec<&'static FieldSpec> {
    let mut chain: Vec<ReqType> = std::iter::once(req_type)
        .chain(req_type.ancestors())
        .collect();
    chain.reverse();
    chain
        .into_iter()
        .flat_map(|kind| info(kind).fields.iter())
        .collect()
}

/// Every distinct prefix, longest first so that prefix matching is unambiguous.
pub fn prefixes() -> Vec<&'static str> {
    let mut prefixes: Vec<&'static str> = KINDS.iter().filter_map(|k| k.prefix).collect();
    prefixes.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    prefixes.dedup();
    prefixes
}
