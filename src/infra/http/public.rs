use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, RawQuery, State},
    middleware,
    routing::get,
};

use crate::application::{
    envelope::ApiResponse, error::ApiError, handlers::Handler, request::ResourceRequest,
};

use super::middleware::{log_responses, set_request_context};

/// One (usually cached) handler per resource.
#[derive(Clone)]
pub struct ApiState {
    pub assignments: Arc<dyn Handler>,
    pub rewards: Arc<dyn Handler>,
    pub events: Arc<dyn Handler>,
    pub orders: Arc<dyn Handler>,
    pub reports: Arc<dyn Handler>,
    pub stratagems: Arc<dyn Handler>,
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/assignments", get(list_assignments))
        .route("/assignments/{id}", get(get_assignment))
        .route("/assignments/{id}/reward", get(get_assignment_reward))
        .route("/events", get(list_events))
        .route("/events/{id}", get(get_event))
        .route("/orders", get(list_orders))
        .route("/orders/{id}", get(get_order))
        .route("/reports", get(list_reports))
        .route("/reports/{id}", get(get_report))
        .route("/stratagems", get(list_stratagems))
        .route("/stratagems/{id}", get(get_stratagem))
        .fallback(route_not_found)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn collection(
    handler: &dyn Handler,
    route: &'static str,
    query: Option<String>,
) -> ApiResponse {
    handler
        .handle(&ResourceRequest::collection(route, query.as_deref()))
        .await
}

async fn record(
    handler: &dyn Handler,
    route: &'static str,
    id: String,
    query: Option<String>,
) -> ApiResponse {
    handler
        .handle(&ResourceRequest::record(route, id, query.as_deref()))
        .await
}

async fn list_assignments(State(state): State<ApiState>, RawQuery(query): RawQuery) -> ApiResponse {
    collection(state.assignments.as_ref(), "/assignments", query).await
}

async fn get_assignment(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
) -> ApiResponse {
    record(state.assignments.as_ref(), "/assignments/{id}", id, query).await
}

async fn get_assignment_reward(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
) -> ApiResponse {
    record(state.rewards.as_ref(), "/assignments/{id}/reward", id, query).await
}

async fn list_events(State(state): State<ApiState>, RawQuery(query): RawQuery) -> ApiResponse {
    collection(state.events.as_ref(), "/events", query).await
}

async fn get_event(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
) -> ApiResponse {
    record(state.events.as_ref(), "/events/{id}", id, query).await
}

async fn list_orders(State(state): State<ApiState>, RawQuery(query): RawQuery) -> ApiResponse {
    collection(state.orders.as_ref(), "/orders", query).await
}

async fn get_order(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
) -> ApiResponse {
    record(state.orders.as_ref(), "/orders/{id}", id, query).await
}

async fn list_reports(State(state): State<ApiState>, RawQuery(query): RawQuery) -> ApiResponse {
    collection(state.reports.as_ref(), "/reports", query).await
}

async fn get_report(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
) -> ApiResponse {
    record(state.reports.as_ref(), "/reports/{id}", id, query).await
}

async fn list_stratagems(State(state): State<ApiState>, RawQuery(query): RawQuery) -> ApiResponse {
    collection(state.stratagems.as_ref(), "/stratagems", query).await
}

async fn get_stratagem(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
) -> ApiResponse {
    record(state.stratagems.as_ref(), "/stratagems/{id}", id, query).await
}

async fn route_not_found() -> ApiResponse {
    ApiError::not_found("Route not found").into()
}
