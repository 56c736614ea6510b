use std::collections::{BTreeSet, HashSet};

use petgraph::algo::{has_path_connecting, tarjan_scc};
use petgraph::graphmap::DiGraphMap;
use uuid::Uuid;

use super::Catalog;
use crate::error::{EntityKind, PegsError, Result};
use crate::models::{
    ConsistencyIssue, CreateRelationInput, Direction, RelType, RelationContent, ReqType,
    Requirement, RequirementRelation,
};
use crate::store::{Storage, StoredVersion, VersionDraft, VersionQuery, VersionReader};
use crate::versioning;

impl<S: Storage> Catalog<S> {
    /// Records `left rel_type right` after checking the rules of its kind.
    pub fn relate(&self, input: CreateRelationInput) -> Result<RequirementRelation> {
        let rel_type = input.rel_type;
        let left = self.get(input.left_id)?;
        if input.left_id == input.right_id {
            return Err(PegsError::relation(format!(
                "{} cannot relate to itself",
                left.req_id
            )));
        }
        let right = self.get(input.right_id)?;

        if left.solution_id != right.solution_id {
            return Err(PegsError::relation(format!(
                "{} and {} belong to different solutions",
                left.req_id, right.req_id
            )));
        }
        check_kinds(rel_type, &left, &right)?;

        let strict = self.config.strict_contradictions;
        let guard =
            |reader: &dyn VersionReader| check_rules(reader, rel_type, &left, &right, strict);

        let now = versioning::now();
        let content = RelationContent {
            created_by: input.created_by.clone(),
            created_at: now,
        };
        let draft = VersionDraft {
            entity_id: Uuid::new_v4(),
            entity_kind: EntityKind::Relation,
            kind_tag: rel_type.as_str().to_string(),
            solution_id: left.solution_id,
            left_id: Some(left.id),
            right_id: Some(right.id),
            fields: serde_json::to_value(&content)?,
            effective_from: now,
            deleted: false,
            modified_by: input.created_by,
        };

        let stored = self.store.insert_guarded(draft, &guard)?;
        let relation = RequirementRelation::from_stored(stored)?;
        tracing::info!(
            id = %relation.id,
            left = %left.req_id,
            right = %right.req_id,
            kind = rel_type.as_str(),
            "Created relation"
        );
        Ok(relation)
    }

    /// Tombstones a relation.
    pub fn unrelate(&self, id: Uuid, actor: &str) -> Result<RequirementRelation> {
        let (stored, next) = self.load_for_write(EntityKind::Relation, id, None)?;
        let draft = VersionDraft {
            effective_from: versioning::now(),
            deleted: true,
            modified_by: actor.to_string(),
            ..draft_of(stored)
        };

        let stored = self.store.append_version(draft, next - 1)?;
        let tombstone = RequirementRelation::from_stored(stored)?;
        tracing::info!(
            id = %tombstone.id,
            kind = tombstone.rel_type.as_str(),
            "Deleted relation"
        );
        Ok(tombstone)
    }

    pub fn get_relation(&self, id: Uuid) -> Result<RequirementRelation> {
        match self.load(EntityKind::Relation, id)? {
            Some(stored) if stored.deleted => Err(PegsError::Deleted {
                entity: EntityKind::Relation,
                id,
            }),
            Some(stored) => RequirementRelation::from_stored(stored),
            None => Err(PegsError::NotFound {
                entity: EntityKind::Relation,
                id,
            }),
        }
    }

    pub fn relation_history(&self, id: Uuid) -> Result<Vec<RequirementRelation>> {
        let versions = self.store.history(id)?;
        if versions.is_empty() || versions.iter().any(|v| v.entity_kind != EntityKind::Relation) {
            return Err(PegsError::NotFound {
                entity: EntityKind::Relation,
                id,
            });
        }
        versions
            .into_iter()
            .map(RequirementRelation::from_stored)
            .collect()
    }

    /// Live relations in which `requirement_id` takes the given end.
    ///
    /// Relations whose other end has been deleted are skipped.
    pub fn relations_of(
        &self,
        requirement_id: Uuid,
        direction: Direction,
    ) -> Result<impl Iterator<Item = Result<RequirementRelation>> + '_> {
        self.get(requirement_id)?;

        let rows = self.store.query_latest(&VersionQuery {
            endpoint: Some((requirement_id, direction)),
            ..VersionQuery::new(EntityKind::Relation)
        })?;
        tracing::debug!(%requirement_id, ?direction, candidates = rows.len(), "Listing relations");

        Ok(rows.into_iter().filter_map(move |stored| {
            let relation = match RequirementRelation::from_stored(stored) {
                Ok(relation) => relation,
                Err(e) => return Some(Err(e)),
            };
            let other = relation.other_end(requirement_id)?;
            match self.is_live(other) {
                Ok(true) => Some(Ok(relation)),
                Ok(false) => None,
                Err(e) => Some(Err(e)),
            }
        }))
    }

    /// Like [`Catalog::relations_of`], restricted to relations that imply
    /// `rel_type` (asking for Repeats also yields Duplicates and Explains).
    pub fn relations_of_kind(
        &self,
        requirement_id: Uuid,
        direction: Direction,
        rel_type: RelType,
    ) -> Result<impl Iterator<Item = Result<RequirementRelation>> + '_> {
        Ok(self
            .relations_of(requirement_id, direction)?
            .filter(move |relation| match relation {
                Ok(relation) => relation.rel_type.implies(rel_type),
                Err(_) => true,
            }))
    }

    /// Scans a solution for relation sets that the per-relation rules cannot
    /// rule out on their own.
    pub fn check_consistency(&self, solution_id: Uuid) -> Result<Vec<ConsistencyIssue>> {
        let relations = self.live_relations(VersionQuery {
            solution_id: Some(solution_id),
            ..VersionQuery::new(EntityKind::Relation)
        })?;
        let live: HashSet<Uuid> = self
            .store
            .query_latest(&VersionQuery {
                solution_id: Some(solution_id),
                ..VersionQuery::new(EntityKind::Requirement)
            })?
            .into_iter()
            .map(|stored| stored.entity_id)
            .collect();

        let mut issues = Vec::new();
        let mut conflicting = BTreeSet::new();
        let mut belongs = DiGraphMap::<Uuid, ()>::new();

        for relation in &relations {
            if relation.left_id == relation.right_id {
                issues.push(ConsistencyIssue::SelfRelation {
                    relation_id: relation.id,
                });
            }
            for end in [relation.left_id, relation.right_id] {
                if !live.contains(&end) {
                    issues.push(ConsistencyIssue::DanglingRelation {
                        relation_id: relation.id,
                        requirement_id: end,
                    });
                }
            }
            if relation.rel_type == RelType::Contradicts
                && relations.iter().any(|other| {
                    other.connects(RelType::Duplicates, relation.left_id, relation.right_id)
                        || other.connects(RelType::Duplicates, relation.right_id, relation.left_id)
                })
            {
                let pair = if relation.left_id <= relation.right_id {
                    (relation.left_id, relation.right_id)
                } else {
                    (relation.right_id, relation.left_id)
                };
                conflicting.insert(pair);
            }
            if relation.rel_type == RelType::Belongs
                && live.contains(&relation.left_id)
                && live.contains(&relation.right_id)
            {
                belongs.add_edge(relation.left_id, relation.right_id, ());
            }
        }

        issues.extend(
            conflicting
                .into_iter()
                .map(|(left_id, right_id)| ConsistencyIssue::ContradictsAndDuplicates {
                    left_id,
                    right_id,
                }),
        );
        for mut members in tarjan_scc(&belongs) {
            if members.len() > 1 {
                members.sort();
                issues.push(ConsistencyIssue::BelongsCycle { members });
            }
        }

        if issues.is_empty() {
            tracing::debug!(%solution_id, relations = relations.len(), "Solution is consistent");
        } else {
            tracing::warn!(%solution_id, issues = issues.len(), "Solution has consistency issues");
        }
        Ok(issues)
    }

    fn live_relations(&self, query: VersionQuery) -> Result<Vec<RequirementRelation>> {
        decode_relations(self.store.query_latest(&query)?)
    }

    fn is_live(&self, id: Uuid) -> Result<bool> {
        Ok(self
            .load(EntityKind::Requirement, id)?
            .is_some_and(|stored| !stored.deleted))
    }
}

/// Rules that depend on the other live relations of the pair or of the
/// solution. Runs inside the insert transaction.
fn check_rules(
    reader: &dyn VersionReader,
    rel_type: RelType,
    left: &Requirement,
    right: &Requirement,
    strict_contradictions: bool,
) -> Result<()> {
    let around_left = reader.query_latest(&VersionQuery {
        endpoint: Some((left.id, Direction::Either)),
        ..VersionQuery::new(EntityKind::Relation)
    })?;
    let existing: Vec<RequirementRelation> = decode_relations(around_left)?
        .into_iter()
        .filter(|relation| relation.other_end(left.id) == Some(right.id))
        .collect();

    if existing
        .iter()
        .any(|relation| relation.connects(rel_type, left.id, right.id))
    {
        return Err(PegsError::relation(format!(
            "{} {} {} already exists",
            left.req_id,
            rel_type.symbol(),
            right.req_id
        )));
    }

    let opposite = match rel_type {
        RelType::Contradicts => Some(RelType::Duplicates),
        RelType::Duplicates => Some(RelType::Contradicts),
        _ => None,
    };
    if let Some(opposite) = opposite {
        if existing
            .iter()
            .any(|relation| relation.connects(opposite, left.id, right.id))
        {
            if strict_contradictions {
                return Err(PegsError::relation(format!(
                    "{} and {} cannot both contradict and duplicate each other",
                    left.req_id, right.req_id
                )));
            }
            tracing::warn!(
                left = %left.req_id,
                right = %right.req_id,
                "Pair is related by both Contradicts and Duplicates"
            );
        }
    }

    if rel_type == RelType::Belongs {
        let graph = belongs_graph(reader, left.solution_id)?;
        if graph.contains_node(right.id)
            && graph.contains_node(left.id)
            && has_path_connecting(&graph, right.id, left.id, None)
        {
            return Err(PegsError::relation(format!(
                "{} already contains {} through Belongs, relating them would form a cycle",
                left.req_id, right.req_id
            )));
        }
    }

    Ok(())
}

/// Containment graph of the live Belongs relations of a solution whose ends
/// are both live.
fn belongs_graph(reader: &dyn VersionReader, solution_id: Uuid) -> Result<DiGraphMap<Uuid, ()>> {
    let live: HashSet<Uuid> = reader
        .query_latest(&VersionQuery {
            solution_id: Some(solution_id),
            ..VersionQuery::new(EntityKind::Requirement)
        })?
        .into_iter()
        .map(|stored| stored.entity_id)
        .collect();
    let relations = decode_relations(reader.query_latest(&VersionQuery {
        kind_tags: vec![RelType::Belongs.as_str().to_string()],
        solution_id: Some(solution_id),
        ..VersionQuery::new(EntityKind::Relation)
    })?)?;

    Ok(relations
        .iter()
        .filter(|relation| live.contains(&relation.left_id) && live.contains(&relation.right_id))
        .map(|relation| (relation.left_id, relation.right_id))
        .collect())
}

fn decode_relations(rows: Vec<StoredVersion>) -> Result<Vec<RequirementRelation>> {
    rows.into_iter()
        .map(RequirementRelation::from_stored)
        .collect()
}

fn check_kinds(rel_type: RelType, left: &Requirement, right: &Requirement) -> Result<()> {
    match rel_type {
        RelType::Duplicates if left.req_type != right.req_type => Err(PegsError::relation(format!(
            "Duplicates needs two requirements of the same kind, got {} and {}",
            left.req_type.label(),
            right.req_type.label()
        ))),
        RelType::Explains if left.req_type == right.req_type => Err(PegsError::relation(format!(
            "Explains needs requirements of different kinds, both are {}",
            left.req_type.label()
        ))),
        RelType::Constrains if !left.req_type.is_a(ReqType::Constraint) => {
            Err(PegsError::relation(format!(
                "only a Constraint can constrain, {} is a {}",
                left.req_id,
                left.req_type.label()
            )))
        }
        _ => Ok(()),
    }
}

fn draft_of(stored: StoredVersion) -> VersionDraft {
    VersionDraft {
        entity_id: stored.entity_id,
        entity_kind: stored.entity_kind,
        kind_tag: stored.kind_tag,
        solution_id: stored.solution_id,
        left_id: stored.left_id,
        right_id: stored.right_id,
        fields: stored.fields,
        effective_from: stored.effective_from,
        deleted: stored.deleted,
        modified_by: stored.modified_by,
    }
}
