mod handlers;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use pegs_core::{Catalog, Database};

pub type AppState = Catalog<Database>;

pub fn create_router(catalog: AppState) -> Router {
    let api = Router::new()
        // Requirements
        .route("/requirements", get(handlers::list_requirements))
        .route("/requirements", post(handlers::create_requirement))
        .route("/requirements/by-req-id/{req_id}", get(handlers::get_requirement_by_req_id))
        .route("/requirements/{id}", get(handlers::get_requirement))
        .route("/requirements/{id}", put(handlers::update_requirement))
        .route("/requirements/{id}", delete(handlers::delete_requirement))
        .route("/requirements/{id}/history", get(handlers::get_requirement_history))
        .route("/requirements/{id}/as-of", get(handlers::get_requirement_as_of))
        .route("/requirements/{id}/relations", get(handlers::list_requirement_relations))
        // Relations
        .route("/relations", post(handlers::create_relation))
        .route("/relations/{id}", get(handlers::get_relation))
        .route("/relations/{id}", delete(handlers::delete_relation))
        .route("/relations/{id}/history", get(handlers::get_relation_history))
        // Solutions
        .route("/solutions/{id}/consistency", get(handlers::check_consistency))
        // Kind registry
        .route("/kinds", get(handlers::list_kinds))
        // Health
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(catalog)
}
