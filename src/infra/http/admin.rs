use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use serde::Deserialize;
use tracing::info;

use crate::{
    cache::{CacheKey, ResponseStore},
    infra::db::PostgresRepositories,
};

use super::{
    db_health_response,
    middleware::{log_responses, set_request_context},
};

#[derive(Clone)]
pub struct AdminState {
    pub cache: Arc<ResponseStore>,
    pub db: Arc<PostgresRepositories>,
}

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/cache", delete(clear_cache))
        .route("/cache/entry", delete(delete_cache_entry))
        .route("/health", get(admin_health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn clear_cache(State(state): State<AdminState>) -> Response {
    let dropped = state.cache.len();
    state.cache.clear();
    info!(
        target = "helldivers_api::admin::cache",
        dropped, "response cache cleared"
    );
    StatusCode::NO_CONTENT.into_response()
}

#[derive(Debug, Deserialize)]
struct EntryParams {
    key: String,
}

async fn delete_cache_entry(
    State(state): State<AdminState>,
    Query(params): Query<EntryParams>,
) -> Response {
    let removed = state.cache.delete(&CacheKey::from_raw(params.key.as_str()));
    info!(
        target = "helldivers_api::admin::cache",
        key = %params.key,
        removed,
        "response cache entry invalidated"
    );
    StatusCode::NO_CONTENT.into_response()
}

async fn admin_health(State(state): State<AdminState>) -> Response {
    db_health_response(state.db.health_check().await)
}
