use serde::{Deserialize, Serialize};

use crate::error::{PegsError, Result};
use crate::registry;

/// The closed set of requirement kinds.
///
/// Abstract kinds (`Actor`, `Component`, `Goal`, `Behavior`, `Functionality`,
/// `Scenario`, `Responsibility`, `MetaRequirement`) exist so that kind filters
/// and field inheritance can name them; they are never instantiated.
/// Per-kind metadata lives in [`crate::registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReqType {
    Actor,
    Component,
    GlossaryTerm,
    SystemComponent,
    EnvironmentComponent,
    Person,
    Goal,
    Obstacle,
    Situation,
    Outcome,
    Behavior,
    Functionality,
    FunctionalBehavior,
    NonFunctionalBehavior,
    Example,
    TestCase,
    Scenario,
    Epic,
    UserStory,
    Responsibility,
    Role,
    Noise,
    Hint,
    MetaRequirement,
    Justification,
    ParsedRequirement,
    Assumption,
    Effect,
    Limit,
    Invariant,
    Product,
    Task,
    Silence,
    Constraint,
}

impl ReqType {
    /// Every kind, in registry order.
    pub const ALL: [ReqType; 34] = [
        Self::Actor,
        Self::Component,
        Self::GlossaryTerm,
        Self::SystemComponent,
        Self::EnvironmentComponent,
        Self::Person,
        Self::Goal,
        Self::Obstacle,
        Self::Situation,
        Self::Outcome,
        Self::Behavior,
        Self::Functionality,
        Self::FunctionalBehavior,
        Self::NonFunctionalBehavior,
        Self::Example,
        Self::TestCase,
        Self::Scenario,
        Self::Epic,
        Self::UserStory,
        Self::Responsibility,
        Self::Role,
        Self::Noise,
        Self::Hint,
        Self::MetaRequirement,
        Self::Justification,
        Self::ParsedRequirement,
        Self::Assumption,
        Self::Effect,
        Self::Limit,
        Self::Invariant,
        Self::Product,
        Self::Task,
        Self::Silence,
        Self::Constraint,
    ];

    /// The persisted discriminator value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Actor => "actor",
            Self::Component => "component",
            Self::GlossaryTerm => "glossary_term",
            Self::SystemComponent => "system_component",
            Self::EnvironmentComponent => "environment_component",
            Self::Person => "person",
            Self::Goal => "goal",
            Self::Obstacle => "obstacle",
            Self::Situation => "situation",
            Self::Outcome => "outcome",
            Self::Behavior => "behavior",
            Self::Functionality => "functionality",
            Self::FunctionalBehavior => "functional_behavior",
            Self::NonFunctionalBehavior => "non_functional_behavior",
            Self::Example => "example",
            Self::TestCase => "test_case",
            Self::Scenario => "scenario",
            Self::Epic => "epic",
            Self::UserStory => "user_story",
            Self::Responsibility => "responsibility",
            Self::Role => "role",
            Self::Noise => "noise",
            Self::Hint => "hint",
            Self::MetaRequirement => "meta_requirement",
            Self::Justification => "justification",
            Self::ParsedRequirement => "parsed_requirement",
            Self::Assumption => "assumption",
            Self::Effect => "effect",
            Self::Limit => "limit",
            Self::Invariant => "invariant",
            Self::Product => "product",
            Self::Task => "task",
            Self::Silence => "silence",
            Self::Constraint => "constraint",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    /// Parses a persisted discriminator. An unregistered tag means the store
    /// holds data this build does not know about.
    pub fn from_tag(tag: &str) -> Result<Self> {
        Self::from_str(tag).ok_or_else(|| {
            tracing::error!(tag, "Encountered unregistered requirement kind");
            PegsError::UnknownKind(tag.to_string())
        })
    }

    pub fn label(&self) -> &'static str {
        registry::info(*self).label
    }

    /// Identifier prefix, `None` for abstract kinds.
    pub fn prefix(&self) -> Option<&'static str> {
        registry::info(*self).prefix
    }

    pub fn parent(&self) -> Option<ReqType> {
        registry::info(*self).parent
    }

    pub fn is_abstract(&self) -> bool {
        registry::info(*self).is_abstract
    }

    /// Parent chain from the immediate parent up to the root kind.
    pub fn ancestors(&self) -> impl Iterator<Item = ReqType> {
        std::iter::successors(self.parent(), |kind| kind.parent())
    }

    /// True when `self` is `other` or one of its descendants.
    pub fn is_a(&self, other: ReqType) -> bool {
        *self == other || self.ancestors().any(|kind| kind == other)
    }

    /// Concrete kinds that satisfy `is_a(self)`, including `self` when concrete.
    pub fn concrete_descendants(&self) -> Vec<ReqType> {
        Self::ALL
            .into_iter()
            .filter(|kind| !kind.is_abstract() && kind.is_a(*self))
            .collect()
    }

    /// The PEGS book this kind is filed under, if any.
    pub fn part(&self) -> Option<PegsPart> {
        self.prefix().and_then(PegsPart::from_prefix)
    }

    /// Field shape carried by requirements of this kind.
    pub fn shape(&self) -> PropsShape {
        if self.is_a(Self::Component) {
            PropsShape::Component
        } else if self.is_a(Self::Behavior) {
            PropsShape::Behavior
        } else {
            match self {
                Self::Person => PropsShape::Person,
                Self::Constraint => PropsShape::Constraint,
                Self::Assumption
                | Self::Effect
                | Self::Limit
                | Self::Obstacle
                | Self::Situation
                | Self::Outcome => PropsShape::Consequence,
                _ => PropsShape::Plain,
            }
        }
    }
}

impl std::fmt::Display for ReqType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The four books of a PEGS requirements document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PegsPart {
    Project,
    Environment,
    Goals,
    System,
}

impl PegsPart {
    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.chars().next() {
            Some('P') => Some(Self::Project),
            Some('E') => Some(Self::Environment),
            Some('G') => Some(Self::Goals),
            Some('S') => Some(Self::System),
            _ => None,
        }
    }
}

/// The set of kind-specific fields a kind carries, after inheritance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropsShape {
    Plain,
    Component,
    Person,
    Behavior,
    Constraint,
    Consequence,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for kind in ReqType::ALL {
            assert_eq!(ReqType::from_str(kind.as_str()), Some(kind));
            assert_eq!(
                serde_json::to_value(kind).unwrap(),
                serde_json::json!(kind.as_str())
            );
        }
    }

    #[test]
    fn unknown_tag_is_an_unknown_kind_error() {
        let err = ReqType::from_tag("widget").unwrap_err();
        assert!(matches!(err, PegsError::UnknownKind(tag) if tag == "widget"));
    }

    #[test]
    fn hierarchy_is_single_inheritance() {
        assert!(ReqType::Situation.is_a(ReqType::Obstacle));
        assert!(ReqType::Situation.is_a(ReqType::Goal));
        assert!(ReqType::GlossaryTerm.is_a(ReqType::Actor));
        assert!(ReqType::TestCase.is_a(ReqType::Behavior));
        assert!(!ReqType::Outcome.is_a(ReqType::Obstacle));
        assert_eq!(
            ReqType::UserStory.ancestors().collect::<Vec<_>>(),
            vec![ReqType::Scenario, ReqType::Behavior]
        );
        assert_eq!(ReqType::Assumption.parent(), None);
    }

    #[test]
    fn goal_descendants_are_concrete() {
        let mut kinds = ReqType::Goal.concrete_descendants();
        kinds.sort();
        assert_eq!(
            kinds,
            vec![ReqType::Obstacle, ReqType::Situation, ReqType::Outcome]
        );
    }

    #[test]
    fn shapes_follow_inheritance() {
        assert_eq!(ReqType::GlossaryTerm.shape(), PropsShape::Component);
        assert_eq!(ReqType::Epic.shape(), PropsShape::Behavior);
        assert_eq!(ReqType::Situation.shape(), PropsShape::Consequence);
        assert_eq!(ReqType::Person.shape(), PropsShape::Person);
        assert_eq!(ReqType::Hint.shape(), PropsShape::Plain);
    }

    #[test]
    fn parts_come_from_prefixes() {
        assert_eq!(ReqType::Assumption.part(), Some(PegsPart::Environment));
        assert_eq!(ReqType::Outcome.part(), Some(PegsPart::Goals));
        assert_eq!(ReqType::Role.part(), Some(PegsPart::Project));
        assert_eq!(ReqType::TestCase.part(), Some(PegsPart::System));
        assert_eq!(ReqType::Justification.part(), None);
        assert_eq!(ReqType::Goal.part(), None);
    }
}
