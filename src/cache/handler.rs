//! Response caching around any [`Handler`].

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use metrics::counter;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::application::{
    envelope::ApiResponse,
    error::ApiError,
    handlers::Handler,
    request::{ResolvedRequest, ResourceRequest},
};

use super::{
    METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_CACHE_SKIP, METRIC_CACHE_STORE,
    config::CacheConfig, keys::CacheKey, store::ResponseStore,
};

type Gates = DashMap<CacheKey, Arc<Mutex<()>>>;

/// Serves repeated reads from a [`ResponseStore`].
///
/// The key comes from the inner handler's own validation, so a request the
/// inner handler would reject is rejected here with the same error and is never
/// stored. Concurrent misses on one key are coalesced: the first caller runs the
/// inner handler while the rest wait and then read its stored result.
///
/// On a hit the inner handler does not run at all, including the failure
/// logging it performs. A cached response is replayed silently until it
/// expires or is invalidated.
pub struct CachingHandler<H> {
    inner: H,
    store: Arc<ResponseStore>,
    config: CacheConfig,
    in_flight: Gates,
}

impl<H: Handler> CachingHandler<H> {
    pub fn new(inner: H, store: Arc<ResponseStore>, config: CacheConfig) -> Self {
        Self {
            inner,
            store,
            config,
            in_flight: DashMap::new(),
        }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }

    fn lookup(&self, key: &CacheKey) -> Option<ApiResponse> {
        let hit = self.store.get(key)?;
        counter!(METRIC_CACHE_HIT).increment(1);
        debug!(cache = "response", outcome = "hit", key = %key, "serving cached response");
        Some(hit)
    }

    fn remember(&self, key: CacheKey, response: &ApiResponse) {
        if self.config.should_store(response.status()) {
            counter!(METRIC_CACHE_STORE).increment(1);
            debug!(
                cache = "response",
                key = %key,
                status = response.status().as_u16(),
                "caching response"
            );
            self.store.set(key, response.clone());
        } else {
            counter!(METRIC_CACHE_SKIP).increment(1);
            debug!(
                cache = "response",
                key = %key,
                status = response.status().as_u16(),
                "response not cached"
            );
        }
    }
}

#[async_trait]
impl<H: Handler> Handler for CachingHandler<H> {
    fn resolve(&self, request: &ResourceRequest) -> Result<ResolvedRequest, ApiError> {
        self.inner.resolve(request)
    }

    #[instrument(skip_all, fields(route = request.route()))]
    async fn handle(&self, request: &ResourceRequest) -> ApiResponse {
        let resolved = match self.inner.resolve(request) {
            Ok(resolved) => resolved,
            Err(err) => return err.into(),
        };

        if !self.config.enabled {
            return self.inner.handle(request).await;
        }

        let key = CacheKey::for_request(&resolved);
        if let Some(hit) = self.lookup(&key) {
            return hit;
        }

        let flight = Flight::join(&self.in_flight, &key);
        let _permit = flight.gate.lock().await;

        // Another caller may have filled the entry while we waited.
        if let Some(hit) = self.lookup(&key) {
            return hit;
        }

        counter!(METRIC_CACHE_MISS).increment(1);
        debug!(cache = "response", outcome = "miss", key = %key, "executing handler");

        let response = self.inner.handle(request).await;
        self.remember(key.clone(), &response);
        response
    }
}

/// Membership in the per-key gate map; the gate is dropped with its last user.
struct Flight<'a> {
    gates: &'a Gates,
    key: &'a CacheKey,
    gate: Arc<Mutex<()>>,
}

impl<'a> Flight<'a> {
    fn join(gates: &'a Gates, key: &'a CacheKey) -> Self {
        let gate = gates
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Self { gates, key, gate }
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        // One reference is the map's, one is ours.
        self.gates.remove_if(self.key, |_, gate| {
            Arc::ptr_eq(gate, &self.gate) && Arc::strong_count(gate) <= 2
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::http::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::application::{
        envelope::Envelope,
        query::QueryLimits,
        resources::EVENTS,
    };
    use crate::cache::store::ManualClock;

    struct Scripted {
        calls: AtomicUsize,
        status: StatusCode,
        delay: Duration,
    }

    impl Scripted {
        fn new(status: StatusCode) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                status,
                delay: Duration::ZERO,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Handler for Scripted {
        fn resolve(&self, request: &ResourceRequest) -> Result<ResolvedRequest, ApiError> {
            request.resolve(&EVENTS, QueryLimits::default())
        }

        async fn handle(&self, _request: &ResourceRequest) -> ApiResponse {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.status {
                StatusCode::OK => ApiResponse::ok(Envelope::record(json!({"id": 1}))),
                StatusCode::NOT_FOUND => ApiError::not_found("Event with id (1) not found").into(),
                _ => ApiError::Upstream("boom".to_string()).into(),
            }
        }
    }

    fn caching(
        inner: Scripted,
        config: CacheConfig,
    ) -> (CachingHandler<Scripted>, Arc<ResponseStore>) {
        let store = Arc::new(ResponseStore::new(&config));
        (CachingHandler::new(inner, store.clone(), config), store)
    }

    fn by_id(id: &str) -> ResourceRequest {
        ResourceRequest::record("/events/{id}", id, None)
    }

    #[tokio::test]
    async fn hit_skips_inner_handler() {
        let (handler, _store) = caching(Scripted::new(StatusCode::OK), CacheConfig::default());

        let first = handler.handle(&by_id("1")).await;
        let second = handler.handle(&by_id("1")).await;

        assert_eq!(handler.inner().calls(), 1);
        assert!(first.shares_envelope(&second));
    }

    #[tokio::test]
    async fn not_found_is_cached() {
        let (handler, store) =
            caching(Scripted::new(StatusCode::NOT_FOUND), CacheConfig::default());

        handler.handle(&by_id("1")).await;
        let second = handler.handle(&by_id("1")).await;

        assert_eq!(second.status(), StatusCode::NOT_FOUND);
        assert_eq!(handler.inner().calls(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let (handler, store) = caching(
            Scripted::new(StatusCode::INTERNAL_SERVER_ERROR),
            CacheConfig::default(),
        );

        handler.handle(&by_id("1")).await;
        handler.handle(&by_id("1")).await;

        assert_eq!(handler.inner().calls(), 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn server_errors_stored_when_configured() {
        let config = CacheConfig {
            store_server_errors: true,
            ..Default::default()
        };
        let (handler, _store) = caching(Scripted::new(StatusCode::INTERNAL_SERVER_ERROR), config);

        handler.handle(&by_id("1")).await;
        handler.handle(&by_id("1")).await;

        assert_eq!(handler.inner().calls(), 1);
    }

    #[tokio::test]
    async fn validation_errors_surface_without_caching() {
        let (handler, store) = caching(Scripted::new(StatusCode::OK), CacheConfig::default());

        let response = handler
            .handle(&ResourceRequest::collection("/events", Some("take=101")))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.envelope().error.as_ref().map(|e| e.details.clone()),
            Some(vec![
                "Query parameter `take` must be between 1 and 100, got 101".to_string()
            ])
        );
        assert_eq!(handler.inner().calls(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn disabled_cache_always_delegates() {
        let config = CacheConfig {
            enabled: false,
            ..Default::default()
        };
        let (handler, store) = caching(Scripted::new(StatusCode::OK), config);

        handler.handle(&by_id("1")).await;
        handler.handle(&by_id("1")).await;

        assert_eq!(handler.inner().calls(), 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn expiry_triggers_recompute() {
        let clock = Arc::new(ManualClock::new());
        let config = CacheConfig::default();
        let store = Arc::new(ResponseStore::with_clock(&config, clock.clone()));
        let handler = CachingHandler::new(Scripted::new(StatusCode::OK), store, config);

        handler.handle(&by_id("1")).await;
        clock.advance(Duration::from_secs(61));
        handler.handle(&by_id("1")).await;

        assert_eq!(handler.inner().calls(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_compute_once() {
        let mut inner = Scripted::new(StatusCode::OK);
        inner.delay = Duration::from_millis(50);
        let (handler, _store) = caching(inner, CacheConfig::default());
        let handler = Arc::new(handler);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let handler = Arc::clone(&handler);
                tokio::spawn(async move { handler.handle(&by_id("7")).await })
            })
            .collect();
        for task in tasks {
            let response = task.await.expect("task");
            assert_eq!(response.status(), StatusCode::OK);
        }

        assert_eq!(handler.inner().calls(), 1);
        assert!(handler.in_flight.is_empty());
    }

    #[tokio::test]
    async fn cancelled_computation_stores_nothing() {
        let mut inner = Scripted::new(StatusCode::OK);
        inner.delay = Duration::from_secs(5);
        let (handler, store) = caching(inner, CacheConfig::default());

        let outcome =
            tokio::time::timeout(Duration::from_millis(20), handler.handle(&by_id("3"))).await;

        assert!(outcome.is_err());
        assert!(store.is_empty());
        assert!(handler.in_flight.is_empty());
    }
}
