//! Read handlers: one per resource, plus the assignment reward lookup.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, instrument};

use super::{
    envelope::{ApiResponse, Envelope},
    error::ApiError,
    pagination::Pagination,
    query::{QueryDescriptor, QueryLimits},
    repos::{ResourceRepo, RewardsRepo},
    request::{ResolvedRequest, ResourceRequest, Target},
    resources::{ASSIGNMENTS, Presentation, Resource},
};

/// An idempotent read handler.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Validate `request` exactly as [`Handler::handle`] will.
    fn resolve(&self, request: &ResourceRequest) -> Result<ResolvedRequest, ApiError>;

    async fn handle(&self, request: &ResourceRequest) -> ApiResponse;
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn resolve(&self, request: &ResourceRequest) -> Result<ResolvedRequest, ApiError> {
        (**self).resolve(request)
    }

    async fn handle(&self, request: &ResourceRequest) -> ApiResponse {
        (**self).handle(request).await
    }
}

/// Serves `GET /<resource>` and `GET /<resource>/{id}`.
pub struct ResourceHandler<R> {
    repo: Arc<dyn ResourceRepo<R>>,
    limits: QueryLimits,
    presentation: Presentation,
}

impl<R: Resource> ResourceHandler<R> {
    pub fn new(
        repo: Arc<dyn ResourceRepo<R>>,
        limits: QueryLimits,
        presentation: Presentation,
    ) -> Self {
        Self {
            repo,
            limits,
            presentation,
        }
    }

    async fn find(&self, id: i64) -> Result<Envelope, ApiError> {
        let record = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApiError::not_found(R::schema().not_found_detail(id)))?;

        Ok(Envelope::record(self.present(record)?))
    }

    async fn list(&self, query: &QueryDescriptor) -> Result<Envelope, ApiError> {
        let page = self.repo.list(query).await?;
        let items = page
            .items
            .into_iter()
            .map(|record| self.present(record))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Envelope::collection(
            items,
            Pagination::new(query.skip, query.take, page.total),
        ))
    }

    fn present(&self, mut record: R) -> Result<Value, ApiError> {
        record.present(&self.presentation);
        to_value(&record)
    }
}

#[async_trait]
impl<R: Resource> Handler for ResourceHandler<R> {
    fn resolve(&self, request: &ResourceRequest) -> Result<ResolvedRequest, ApiError> {
        request.resolve(R::schema(), self.limits)
    }

    #[instrument(skip_all, fields(route = request.route()))]
    async fn handle(&self, request: &ResourceRequest) -> ApiResponse {
        let resolved = match self.resolve(request) {
            Ok(resolved) => resolved,
            Err(err) => return err.into(),
        };

        let outcome = match &resolved.target {
            Target::Record(id) => self.find(*id).await,
            Target::Collection(query) => self.list(query).await,
        };

        respond(resolved.route, outcome)
    }
}

/// Serves `GET /assignments/{id}/reward`.
pub struct RewardHandler {
    repo: Arc<dyn RewardsRepo>,
    limits: QueryLimits,
}

impl RewardHandler {
    pub fn new(repo: Arc<dyn RewardsRepo>, limits: QueryLimits) -> Self {
        Self { repo, limits }
    }

    /// Resolve `request` and pull out the assignment id it addresses.
    fn locate(&self, request: &ResourceRequest) -> Result<(ResolvedRequest, i64), ApiError> {
        let resolved = request.resolve(&ASSIGNMENTS, self.limits)?;
        match resolved.target {
            Target::Record(id) => Ok((resolved, id)),
            Target::Collection(_) => Err(ApiError::validation(
                "reward lookups require an assignment id",
            )),
        }
    }

    async fn find(&self, assignment_id: i64) -> Result<Envelope, ApiError> {
        let reward = self
            .repo
            .find_for_assignment(assignment_id)
            .await?
            .ok_or_else(|| {
                ApiError::not_found(format!(
                    "Assignment with id ({assignment_id}) appears to have no reward"
                ))
            })?;

        Ok(Envelope::record(to_value(&reward)?))
    }
}

#[async_trait]
impl Handler for RewardHandler {
    fn resolve(&self, request: &ResourceRequest) -> Result<ResolvedRequest, ApiError> {
        self.locate(request).map(|(resolved, _)| resolved)
    }

    #[instrument(skip_all, fields(route = request.route()))]
    async fn handle(&self, request: &ResourceRequest) -> ApiResponse {
        match self.locate(request) {
            Ok((resolved, assignment_id)) => {
                respond(resolved.route, self.find(assignment_id).await)
            }
            Err(err) => err.into(),
        }
    }
}

fn to_value<T: Serialize>(record: &T) -> Result<Value, ApiError> {
    serde_json::to_value(record).map_err(|err| ApiError::Upstream(err.to_string()))
}

fn respond(route: &'static str, outcome: Result<Envelope, ApiError>) -> ApiResponse {
    match outcome {
        Ok(envelope) => ApiResponse::ok(envelope),
        Err(err) => {
            if let ApiError::Upstream(detail) = &err {
                error!(
                    target = "helldivers_api::handlers",
                    route,
                    detail = %detail,
                    "data layer failure"
                );
            }
            err.into()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::http::StatusCode;
    use time::macros::datetime;

    use super::*;
    use crate::application::repos::{ListPage, RepoError};
    use crate::domain::entities::{EventRecord, RewardRecord};

    struct FixedEvents {
        events: Vec<EventRecord>,
        fail: bool,
        seen: Mutex<Vec<QueryDescriptor>>,
    }

    impl FixedEvents {
        fn new(events: Vec<EventRecord>) -> Self {
            Self {
                events,
                fail: false,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ResourceRepo<EventRecord> for FixedEvents {
        async fn find_by_id(&self, id: i64) -> Result<Option<EventRecord>, RepoError> {
            if self.fail {
                return Err(RepoError::Timeout);
            }
            Ok(self.events.iter().find(|event| event.id == id).cloned())
        }

        async fn list(&self, query: &QueryDescriptor) -> Result<ListPage<EventRecord>, RepoError> {
            if self.fail {
                return Err(RepoError::from_persistence("connection reset"));
            }
            self.seen.lock().expect("lock").push(query.clone());
            let skip = query.skip as usize;
            let take = query.take.get() as usize;
            Ok(ListPage {
                items: self.events.iter().skip(skip).take(take).cloned().collect(),
                total: self.events.len() as u64,
            })
        }
    }

    fn event(id: i64) -> EventRecord {
        EventRecord {
            id,
            event_id: id * 10,
            title: Some(format!("Event {id}")),
            message: None,
            race: Some("Terminids".to_string()),
            flag: 1,
            created_at: datetime!(2024-02-01 0:00 UTC),
            updated_at: datetime!(2024-02-01 0:00 UTC),
        }
    }

    fn handler(repo: FixedEvents) -> ResourceHandler<EventRecord> {
        ResourceHandler::new(Arc::new(repo), QueryLimits::default(), Presentation::default())
    }

    #[tokio::test]
    async fn finds_record_by_id() {
        let handler = handler(FixedEvents::new(vec![event(1), event(2)]));
        let response = handler
            .handle(&ResourceRequest::record("/events/{id}", "2", None))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.envelope().data["eventId"], 20);
        assert!(response.envelope().error.is_none());
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let handler = handler(FixedEvents::new(Vec::new()));
        let response = handler
            .handle(&ResourceRequest::record("/events/{id}", "42", None))
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.envelope().error.as_ref().map(|e| e.details.clone()),
            Some(vec!["Event with id (42) not found".to_string()])
        );
    }

    #[tokio::test]
    async fn lists_with_pagination() {
        let events = (1..=12).map(event).collect();
        let handler = handler(FixedEvents::new(events));
        let response = handler
            .handle(&ResourceRequest::collection("/events", Some("take=5&skip=10")))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let envelope = response.envelope();
        assert_eq!(envelope.data.as_array().map(Vec::len), Some(2));
        let pagination = envelope.pagination.expect("pagination present");
        assert_eq!(pagination.page, 3);
        assert_eq!(pagination.page_count, 3);
        assert_eq!(pagination.total, 12);
    }

    #[tokio::test]
    async fn validation_errors_skip_the_repository() {
        let repo = Arc::new(FixedEvents::new(vec![event(1)]));
        let handler = ResourceHandler::new(
            repo.clone() as Arc<dyn ResourceRepo<EventRecord>>,
            QueryLimits::default(),
            Presentation::default(),
        );
        let response = handler
            .handle(&ResourceRequest::collection("/events", Some("where[secret]=1")))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(repo.seen.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn upstream_failures_are_server_errors() {
        let mut repo = FixedEvents::new(Vec::new());
        repo.fail = true;
        let handler = handler(repo);
        let response = handler
            .handle(&ResourceRequest::collection("/events", None))
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.envelope().error.as_ref().map(|e| e.details.clone()),
            Some(vec!["persistence error: connection reset".to_string()])
        );
    }

    struct NoRewards;

    #[async_trait]
    impl RewardsRepo for NoRewards {
        async fn find_for_assignment(&self, _id: i64) -> Result<Option<RewardRecord>, RepoError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn missing_reward_detail() {
        let handler = RewardHandler::new(Arc::new(NoRewards), QueryLimits::default());
        let response = handler
            .handle(&ResourceRequest::record("/assignments/{id}/reward", "9", None))
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.envelope().error.as_ref().map(|e| e.details.clone()),
            Some(vec!["Assignment with id (9) appears to have no reward".to_string()])
        );
    }

    #[tokio::test]
    async fn reward_lookup_without_id_is_rejected() {
        let handler = RewardHandler::new(Arc::new(NoRewards), QueryLimits::default());
        let request = ResourceRequest::collection("/assignments/{id}/reward", None);

        assert_eq!(
            handler.resolve(&request),
            Err(ApiError::validation("reward lookups require an assignment id"))
        );
        let response = handler.handle(&request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reward_lookup_resolves_to_the_assignment_record() {
        let handler = RewardHandler::new(Arc::new(NoRewards), QueryLimits::default());
        let resolved = handler
            .resolve(&ResourceRequest::record("/assignments/{id}/reward", "4", None))
            .expect("valid id");
        assert_eq!(resolved.target, Target::Record(4));
        assert_eq!(resolved.route, "/assignments/{id}/reward");
    }
}
