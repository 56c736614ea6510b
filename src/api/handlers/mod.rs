use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use pegs_core::models::*;
use pegs_core::registry::{self, KindInfo};
use pegs_core::PegsError;

use super::AppState;

type ApiResult<T> = Result<T, (StatusCode, String)>;

// ============================================================
// Error Handling
// ============================================================

/// Map a catalog error to a response. Caller errors are returned as-is;
/// store faults are logged in full and answered with a generic message.
fn api_error(e: PegsError) -> (StatusCode, String) {
    if !e.is_recoverable() {
        tracing::error!("Internal error: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        );
    }

    let status = match &e {
        PegsError::Validation(_) | PegsError::ImmutableKind { .. } => StatusCode::BAD_REQUEST,
        PegsError::RelationConstraint(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PegsError::NotFound { .. } => StatusCode::NOT_FOUND,
        PegsError::Deleted { .. } => StatusCode::GONE,
        PegsError::ConcurrentModification { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::warn!("Request rejected: {}", e);
    (status, e.to_string())
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Kinds
// ============================================================

pub async fn list_kinds() -> Json<&'static [KindInfo]> {
    Json(registry::all())
}

// ============================================================
// Requirements
// ============================================================

#[derive(Debug, Default, Deserialize)]
pub struct ListRequirementsQuery {
    pub req_type: Option<ReqType>,
    pub solution_id: Option<Uuid>,
    pub name: Option<String>,
    pub created_by: Option<String>,
    pub priority: Option<MoscowPriority>,
    pub category: Option<ConstraintCategory>,
    pub follows: Option<Uuid>,
    pub parent_component: Option<Uuid>,
    /// List silence placeholders alongside regular requirements.
    #[serde(default)]
    pub include_silence: bool,
    #[serde(default)]
    pub include_deleted: bool,
    pub as_of: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ListRequirementsQuery {
    fn filter(&self) -> RequirementFilter {
        RequirementFilter {
            req_types: self.req_type.into_iter().collect(),
            solution_id: self.solution_id,
            name: self.name.clone(),
            created_by: self.created_by.clone(),
            priority: self.priority,
            category: self.category,
            follows: self.follows,
            parent_component: self.parent_component,
            is_silence: if self.include_silence {
                None
            } else {
                Some(false)
            },
            include_deleted: self.include_deleted,
            as_of: self.as_of,
        }
    }
}

pub async fn list_requirements(
    State(catalog): State<AppState>,
    Query(query): Query<ListRequirementsQuery>,
) -> ApiResult<Json<Vec<Requirement>>> {
    catalog
        .find_many(&query.filter())
        .map_err(api_error)?
        .skip(query.offset.unwrap_or(0))
        .take(query.limit.unwrap_or(usize::MAX))
        .collect::<Result<Vec<_>, _>>()
        .map(Json)
        .map_err(api_error)
}

pub async fn create_requirement(
    State(catalog): State<AppState>,
    Json(input): Json<CreateRequirementInput>,
) -> ApiResult<(StatusCode, Json<Requirement>)> {
    catalog
        .create(input)
        .map(|r| (StatusCode::CREATED, Json(r)))
        .map_err(api_error)
}

pub async fn get_requirement(
    State(catalog): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Requirement>> {
    catalog.get(id).map(Json).map_err(api_error)
}

pub async fn get_requirement_by_req_id(
    State(catalog): State<AppState>,
    Path(req_id): Path<String>,
) -> ApiResult<Json<Requirement>> {
    let req_id: ReqId = req_id
        .parse()
        .map_err(|e: ReqIdError| (StatusCode::BAD_REQUEST, e.to_string()))?;
    catalog
        .get_by_req_id(&req_id)
        .map_err(api_error)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("Requirement {req_id} not found")))
}

pub async fn update_requirement(
    State(catalog): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateRequirementInput>,
) -> ApiResult<Json<Requirement>> {
    catalog.update(id, input).map(Json).map_err(api_error)
}

#[derive(Debug, Deserialize)]
pub struct ActorQuery {
    pub actor: String,
}

pub async fn delete_requirement(
    State(catalog): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ActorQuery>,
) -> ApiResult<Json<Requirement>> {
    catalog.delete(id, &query.actor).map(Json).map_err(api_error)
}

pub async fn get_requirement_history(
    State(catalog): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Requirement>>> {
    catalog.history(id).map(Json).map_err(api_error)
}

#[derive(Debug, Deserialize)]
pub struct AsOfQuery {
    pub at: DateTime<Utc>,
}

pub async fn get_requirement_as_of(
    State(catalog): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<AsOfQuery>,
) -> ApiResult<Json<Requirement>> {
    catalog
        .as_of(id, query.at)
        .map_err(api_error)?
        .map(Json)
        .ok_or((
            StatusCode::NOT_FOUND,
            format!("Requirement {id} did not exist at {}", query.at.to_rfc3339()),
        ))
}

#[derive(Debug, Default, Deserialize)]
pub struct RelationsQuery {
    #[serde(default)]
    pub direction: Direction,
    pub rel_type: Option<RelType>,
}

pub async fn list_requirement_relations(
    State(catalog): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<RelationsQuery>,
) -> ApiResult<Json<Vec<RequirementRelation>>> {
    let relations = match query.rel_type {
        Some(rel_type) => catalog
            .relations_of_kind(id, query.direction, rel_type)
            .map_err(api_error)?
            .collect::<Result<Vec<_>, _>>(),
        None => catalog
            .relations_of(id, query.direction)
            .map_err(api_error)?
            .collect::<Result<Vec<_>, _>>(),
    };
    relations.map(Json).map_err(api_error)
}

// ============================================================
// Relations
// ============================================================

pub async fn create_relation(
    State(catalog): State<AppState>,
    Json(input): Json<CreateRelationInput>,
) -> ApiResult<(StatusCode, Json<RequirementRelation>)> {
    catalog
        .relate(input)
        .map(|r| (StatusCode::CREATED, Json(r)))
        .map_err(api_error)
}

pub async fn get_relation(
    State(catalog): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RequirementRelation>> {
    catalog.get_relation(id).map(Json).map_err(api_error)
}

pub async fn delete_relation(
    State(catalog): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ActorQuery>,
) -> ApiResult<Json<RequirementRelation>> {
    catalog.unrelate(id, &query.actor).map(Json).map_err(api_error)
}

pub async fn get_relation_history(
    State(catalog): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<RequirementRelation>>> {
    catalog.relation_history(id).map(Json).map_err(api_error)
}

// ============================================================
// Solutions
// ============================================================

pub async fn check_consistency(
    State(catalog): State<AppState>,
    Path(solution_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ConsistencyIssue>>> {
    catalog
        .check_consistency(solution_id)
        .map(Json)
        .map_err(api_error)
}
