use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Catalog;
use crate::error::{EntityKind, PegsError, Result};
use crate::models::{
    CreateRequirementInput, KindProps, ReqId, ReqType, Requirement, RequirementContent,
    RequirementFilter, UpdateRequirementInput,
};
use crate::store::{Storage, VersionDraft, VersionQuery};
use crate::validation;
use crate::versioning;

impl<S: Storage> Catalog<S> {
    /// Creates version 1 of a new requirement and assigns its `req_id`.
    pub fn create(&self, input: CreateRequirementInput) -> Result<Requirement> {
        let req_type = input.req_type;
        let Some(prefix) = req_type.prefix() else {
            return Err(PegsError::validation(format!(
                "{} is abstract and cannot be instantiated",
                req_type.label()
            )));
        };

        let props = validation::props_for_create(req_type, input.is_silence, &input.fields)?;
        let id = Uuid::new_v4();
        self.check_references(id, input.solution_id, validation::references(req_type, &props))?;

        let now = versioning::now();
        let content = RequirementContent {
            name: validation::resolve_name(req_type, input.name.as_deref()),
            description: input.description.unwrap_or_default(),
            is_silence: input.is_silence,
            created_by: input.created_by.clone(),
            created_at: now,
            props,
        };
        let draft = VersionDraft {
            entity_id: id,
            entity_kind: EntityKind::Requirement,
            kind_tag: req_type.as_str().to_string(),
            solution_id: input.solution_id,
            left_id: None,
            right_id: None,
            fields: serde_json::to_value(&content)?,
            effective_from: now,
            deleted: false,
            modified_by: input.created_by,
        };

        let stored = self.store.insert_initial(draft, Some(prefix))?;
        let requirement = Requirement::from_stored(stored)?;
        tracing::info!(
            id = %requirement.id,
            req_id = %requirement.req_id,
            kind = req_type.as_str(),
            "Created requirement"
        );
        Ok(requirement)
    }

    /// Appends a new version with `input` merged over the current one.
    pub fn update(&self, id: Uuid, input: UpdateRequirementInput) -> Result<Requirement> {
        let (stored, next) =
            self.load_for_write(EntityKind::Requirement, id, input.expected_version)?;
        let current = Requirement::from_stored(stored)?;

        if input.req_type != current.req_type {
            return Err(PegsError::ImmutableKind {
                id,
                existing: current.req_type,
                requested: input.req_type,
            });
        }

        let req_type = current.req_type;
        let is_silence = input.is_silence.unwrap_or(current.is_silence);
        let props =
            validation::props_for_update(req_type, &current.props, is_silence, &input.fields)?;

        // Only references that this update sets are re-checked.
        let changed = validation::references(req_type, &props)
            .into_iter()
            .filter(|(field, _, _)| input.fields.get(*field).is_some_and(|v| !v.is_null()))
            .collect();
        self.check_references(id, current.solution_id, changed)?;

        let name = match input.name.as_deref() {
            Some(name) => validation::resolve_name(req_type, Some(name)),
            None => current.name.clone(),
        };
        let updated = Requirement {
            name,
            description: input.description.unwrap_or_else(|| current.description.clone()),
            is_silence,
            props,
            ..current
        };

        let draft = self.requirement_draft(&updated, &input.modified_by, false)?;
        let requirement = Requirement::from_stored(self.store.append_version(draft, next - 1)?)?;
        tracing::info!(
            id = %requirement.id,
            req_id = %requirement.req_id,
            version = requirement.version,
            "Updated requirement"
        );
        Ok(requirement)
    }

    /// Tombstones a requirement. Its history stays readable and relations
    /// pointing at it are left in place.
    pub fn delete(&self, id: Uuid, actor: &str) -> Result<Requirement> {
        let (stored, next) = self.load_for_write(EntityKind::Requirement, id, None)?;
        let current = Requirement::from_stored(stored)?;

        let draft = self.requirement_draft(&current, actor, true)?;
        let tombstone = Requirement::from_stored(self.store.append_version(draft, next - 1)?)?;
        tracing::info!(
            id = %tombstone.id,
            req_id = %tombstone.req_id,
            version = tombstone.version,
            "Deleted requirement"
        );
        Ok(tombstone)
    }

    /// Current version of a live requirement.
    pub fn get(&self, id: Uuid) -> Result<Requirement> {
        let Some(stored) = self.load(EntityKind::Requirement, id)? else {
            return Err(PegsError::NotFound {
                entity: EntityKind::Requirement,
                id,
            });
        };
        if stored.deleted {
            return Err(PegsError::Deleted {
                entity: EntityKind::Requirement,
                id,
            });
        }
        Requirement::from_stored(stored)
    }

    pub fn get_by_req_id(&self, req_id: &ReqId) -> Result<Option<Requirement>> {
        match self.store.find_by_req_id(req_id)? {
            Some(id) => self.get(id).map(Some),
            None => Ok(None),
        }
    }

    /// Every version of a requirement, oldest first, tombstone included.
    pub fn history(&self, id: Uuid) -> Result<Vec<Requirement>> {
        let versions = self.store.history(id)?;
        if versions.is_empty()
            || versions
                .iter()
                .any(|v| v.entity_kind != EntityKind::Requirement)
        {
            return Err(PegsError::NotFound {
                entity: EntityKind::Requirement,
                id,
            });
        }
        versions.into_iter().map(Requirement::from_stored).collect()
    }

    /// The requirement as it was at `at`; `None` if it did not exist yet or
    /// was already deleted.
    pub fn as_of(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<Requirement>> {
        if self.load(EntityKind::Requirement, id)?.is_none() {
            return Err(PegsError::NotFound {
                entity: EntityKind::Requirement,
                id,
            });
        }
        self.store
            .as_of(id, at)?
            .filter(|stored| !stored.deleted)
            .map(Requirement::from_stored)
            .transpose()
    }

    /// Requirements matching every predicate of `filter`.
    ///
    /// Candidate rows are selected in storage by kind, solution and point in
    /// time; decoding and the field predicates run as the iterator advances.
    pub fn find_many(
        &self,
        filter: &RequirementFilter,
    ) -> Result<impl Iterator<Item = Result<Requirement>>> {
        let mut query = VersionQuery::new(EntityKind::Requirement);
        query.kind_tags = filter.kind_tags();
        query.solution_id = filter.solution_id;
        query.include_deleted = filter.include_deleted;
        query.as_of = filter.as_of;

        let rows = self.store.query_latest(&query)?;
        tracing::debug!(candidates = rows.len(), ?filter, "Finding requirements");

        let filter = filter.clone();
        Ok(rows
            .into_iter()
            .map(Requirement::from_stored)
            .filter(move |decoded| match decoded {
                Ok(requirement) => filter.matches(requirement),
                Err(_) => true,
            }))
    }

    fn requirement_draft(
        &self,
        requirement: &Requirement,
        actor: &str,
        deleted: bool,
    ) -> Result<VersionDraft> {
        Ok(VersionDraft {
            entity_id: requirement.id,
            entity_kind: EntityKind::Requirement,
            kind_tag: requirement.req_type.as_str().to_string(),
            solution_id: requirement.solution_id,
            left_id: None,
            right_id: None,
            fields: requirement.content()?,
            effective_from: versioning::now(),
            deleted,
            modified_by: actor.to_string(),
        })
    }

    /// Checks that each reference names a live requirement of the expected
    /// kind in the same solution, and that component parents stay acyclic.
    fn check_references(
        &self,
        id: Uuid,
        solution_id: Uuid,
        references: Vec<(&'static str, ReqType, Uuid)>,
    ) -> Result<()> {
        for (field, target_kind, target_id) in references {
            if target_id == id {
                return Err(PegsError::validation(format!(
                    "field '{field}' cannot reference the requirement itself"
                )));
            }

            let target = self.get(target_id).map_err(|e| match e {
                PegsError::NotFound { .. } | PegsError::Deleted { .. } => {
                    PegsError::validation(format!("field '{field}' references {e}"))
                }
                other => other,
            })?;

            if !target.req_type.is_a(target_kind) {
                return Err(PegsError::validation(format!(
                    "field '{field}' must reference a {}, {} is a {}",
                    target_kind.label(),
                    target.req_id,
                    target.req_type.label()
                )));
            }
            if target.solution_id != solution_id {
                return Err(PegsError::validation(format!(
                    "field '{field}' references {} from another solution",
                    target.req_id
                )));
            }
            if field == "parent_component" {
                self.check_component_chain(id, &target.props)?;
            }
        }
        Ok(())
    }

    fn check_component_chain(&self, id: Uuid, parent: &KindProps) -> Result<()> {
        let mut seen = HashSet::new();
        let mut next = parent.parent_component();
        while let Some(ancestor) = next {
            if ancestor == id {
                return Err(PegsError::validation(
                    "parent_component would make the component its own ancestor",
                ));
            }
            if !seen.insert(ancestor) {
                tracing::warn!(%ancestor, "Existing parent_component chain is cyclic");
                break;
            }
            next = match self.load(EntityKind::Requirement, ancestor)? {
                Some(stored) if !stored.deleted => {
                    Requirement::from_stored(stored)?.props.parent_component()
                }
                _ => None,
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::MoscowPriority;
    use serde_json::json;

    fn catalog() -> Catalog<Database> {
        let db = Database::open_memory().unwrap();
        db.migrate().unwrap();
        Catalog::new(db)
    }

    #[test]
    fn abstract_kinds_cannot_be_created() {
        let catalog = catalog();
        let err = catalog
            .create(CreateRequirementInput::new(ReqType::Goal, Uuid::new_v4(), "ana"))
            .unwrap_err();
        assert!(matches!(err, PegsError::Validation(_)));
    }

    #[test]
    fn kinds_sharing_a_prefix_share_a_sequence() {
        let catalog = catalog();
        let solution = Uuid::new_v4();
        let epic = catalog
            .create(CreateRequirementInput::new(ReqType::Epic, solution, "ana"))
            .unwrap();
        let story = catalog
            .create(CreateRequirementInput::new(ReqType::UserStory, solution, "ana"))
            .unwrap();
        assert_eq!(epic.req_id.to_string(), "G.5.1");
        assert_eq!(story.req_id.to_string(), "G.5.2");
        assert_eq!(story.name, "{Untitled User Story}");
        assert_eq!(story.props.priority(), Some(MoscowPriority::Must));
    }

    #[test]
    fn follows_must_target_a_parsed_requirement() {
        let catalog = catalog();
        let solution = Uuid::new_v4();
        let assumption = catalog
            .create(CreateRequirementInput::new(ReqType::Assumption, solution, "ana"))
            .unwrap();

        let err = catalog
            .create(
                CreateRequirementInput::new(ReqType::Effect, solution, "ana")
                    .with_field("follows", assumption.id.to_string()),
            )
            .unwrap_err();
        assert!(matches!(err, PegsError::Validation(msg) if msg.contains("Parsed Requirement")));

        let parsed = catalog
            .create(CreateRequirementInput::new(
                ReqType::ParsedRequirement,
                solution,
                "ana",
            ))
            .unwrap();
        let effect = catalog
            .create(
                CreateRequirementInput::new(ReqType::Effect, solution, "ana")
                    .with_field("follows", parsed.id.to_string()),
            )
            .unwrap();
        assert_eq!(effect.props.follows(), Some(parsed.id));
    }

    #[test]
    fn component_parents_cannot_loop() {
        let catalog = catalog();
        let solution = Uuid::new_v4();
        let root = catalog
            .create(CreateRequirementInput::new(ReqType::SystemComponent, solution, "ana"))
            .unwrap();
        let child = catalog
            .create(
                CreateRequirementInput::new(ReqType::SystemComponent, solution, "ana")
                    .with_field("parent_component", root.id.to_string()),
            )
            .unwrap();

        let err = catalog
            .update(
                root.id,
                UpdateRequirementInput::new(ReqType::SystemComponent, "ana")
                    .with_field("parent_component", child.id.to_string()),
            )
            .unwrap_err();
        assert!(matches!(err, PegsError::Validation(msg) if msg.contains("ancestor")));
    }

    #[test]
    fn references_must_stay_in_the_solution() {
        let catalog = catalog();
        let parsed = catalog
            .create(CreateRequirementInput::new(
                ReqType::ParsedRequirement,
                Uuid::new_v4(),
                "ana",
            ))
            .unwrap();
        let err = catalog
            .create(
                CreateRequirementInput::new(ReqType::Outcome, Uuid::new_v4(), "ana")
                    .with_field("follows", json!(parsed.id.to_string())),
            )
            .unwrap_err();
        assert!(matches!(err, PegsError::Validation(msg) if msg.contains("another solution")));
    }

    #[test]
    fn deleted_requirements_reject_updates() {
        let catalog = catalog();
        let task = catalog
            .create(CreateRequirementInput::new(ReqType::Task, Uuid::new_v4(), "ana"))
            .unwrap();
        let tombstone = catalog.delete(task.id, "bob").unwrap();
        assert!(tombstone.deleted);
        assert_eq!(tombstone.version, 2);
        assert_eq!(tombstone.modified_by, "bob");

        let err = catalog
            .update(task.id, UpdateRequirementInput::new(ReqType::Task, "ana").named("x"))
            .unwrap_err();
        assert!(matches!(err, PegsError::Deleted { .. }));
        assert!(matches!(
            catalog.get(task.id).unwrap_err(),
            PegsError::Deleted { .. }
        ));
        assert_eq!(catalog.history(task.id).unwrap().len(), 2);
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let catalog = catalog();
        let id = Uuid::new_v4();
        assert!(matches!(
            catalog.get(id).unwrap_err(),
            PegsError::NotFound { .. }
        ));
        assert!(matches!(
            catalog.delete(id, "ana").unwrap_err(),
            PegsError::NotFound { .. }
        ));
        assert!(matches!(
            catalog.history(id).unwrap_err(),
            PegsError::NotFound { .. }
        ));
    }
}
