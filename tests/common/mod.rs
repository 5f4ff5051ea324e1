#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use time::{OffsetDateTime, macros::datetime};
use tower::ServiceExt;

use helldivers_api::{
    application::{
        handlers::{Handler, ResourceHandler, RewardHandler},
        query::{QueryDescriptor, QueryLimits},
        repos::{ListPage, RepoError, ResourceRepo, RewardsRepo},
        resources::{Presentation, Resource},
    },
    cache::{CacheConfig, CachingHandler, ResponseStore},
    domain::entities::{
        AssignmentRecord, EventRecord, OrderRecord, ReportRecord, RewardRecord, StratagemRecord,
    },
    infra::{
        db::PostgresRepositories,
        http::{AdminState, ApiState, build_admin_router, build_router},
    },
};

const CREATED: OffsetDateTime = datetime!(2024-03-01 12:00 UTC);

/// In-memory repository that counts every call it serves.
pub struct MemoryRepo<R> {
    rows: Vec<R>,
    id_of: fn(&R) -> i64,
    delay: Duration,
    failure: Option<&'static str>,
    calls: AtomicUsize,
    last_query: Mutex<Option<QueryDescriptor>>,
}

impl<R> MemoryRepo<R> {
    pub fn new(rows: Vec<R>, id_of: fn(&R) -> i64) -> Self {
        Self {
            rows,
            id_of,
            delay: Duration::ZERO,
            failure: None,
            calls: AtomicUsize::new(0),
            last_query: Mutex::new(None),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, message: &'static str) -> Self {
        self.failure = Some(message);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<QueryDescriptor> {
        self.last_query.lock().expect("query lock").clone()
    }

    async fn enter(&self) -> Result<(), RepoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.failure {
            Some(message) => Err(RepoError::from_persistence(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<R: Clone + Send + Sync + 'static> ResourceRepo<R> for MemoryRepo<R> {
    async fn find_by_id(&self, id: i64) -> Result<Option<R>, RepoError> {
        self.enter().await?;
        Ok(self.rows.iter().find(|row| (self.id_of)(row) == id).cloned())
    }

    async fn list(&self, query: &QueryDescriptor) -> Result<ListPage<R>, RepoError> {
        self.enter().await?;
        *self.last_query.lock().expect("query lock") = Some(query.clone());
        let items = self
            .rows
            .iter()
            .skip(query.skip as usize)
            .take(query.take.get() as usize)
            .cloned()
            .collect();
        Ok(ListPage {
            items,
            total: self.rows.len() as u64,
        })
    }
}

#[derive(Default)]
pub struct MemoryRewards {
    rewards: Vec<RewardRecord>,
    calls: AtomicUsize,
}

impl MemoryRewards {
    pub fn new(rewards: Vec<RewardRecord>) -> Self {
        Self {
            rewards,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RewardsRepo for MemoryRewards {
    async fn find_for_assignment(
        &self,
        assignment_id: i64,
    ) -> Result<Option<RewardRecord>, RepoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .rewards
            .iter()
            .find(|reward| reward.assignment_id == assignment_id)
            .cloned())
    }
}

pub fn events(rows: Vec<EventRecord>) -> MemoryRepo<EventRecord> {
    MemoryRepo::new(rows, |row: &EventRecord| row.id)
}

pub fn orders(rows: Vec<OrderRecord>) -> MemoryRepo<OrderRecord> {
    MemoryRepo::new(rows, |row: &OrderRecord| row.id)
}

pub fn stratagems(rows: Vec<StratagemRecord>) -> MemoryRepo<StratagemRecord> {
    MemoryRepo::new(rows, |row: &StratagemRecord| row.id)
}

pub fn event(id: i64) -> EventRecord {
    EventRecord {
        id,
        event_id: 4000 + id,
        title: Some(format!("Event {id}")),
        message: Some("Defend the planet".to_string()),
        race: Some("Terminids".to_string()),
        flag: 1,
        created_at: CREATED,
        updated_at: CREATED,
    }
}

pub fn order(id: i64) -> OrderRecord {
    OrderRecord {
        id,
        message: Some(format!("Order {id}")),
        reward_type: Some(1),
        reward_amount: Some(50),
        expires_at: None,
        created_at: CREATED,
        updated_at: CREATED,
    }
}

pub fn stratagem(id: i64) -> StratagemRecord {
    StratagemRecord {
        id,
        codename: Some("E/MG-101".to_string()),
        name: "HMG Emplacement".to_string(),
        keys: vec!["down".to_string(), "up".to_string()],
        uses: "Unlimited".to_string(),
        cooldown: Some(180),
        activation: Some(3),
        image_url: "/hmg.png".to_string(),
        group_id: Some(2),
        created_at: CREATED,
        updated_at: CREATED,
    }
}

pub fn reward(assignment_id: i64) -> RewardRecord {
    RewardRecord {
        id: 1,
        assignment_id,
        reward_type: 1,
        amount: 45,
    }
}

/// Every repository and the shared store behind one router pair.
pub struct Fixture {
    pub assignments: Arc<MemoryRepo<AssignmentRecord>>,
    pub rewards: Arc<MemoryRewards>,
    pub events: Arc<MemoryRepo<EventRecord>>,
    pub orders: Arc<MemoryRepo<OrderRecord>>,
    pub reports: Arc<MemoryRepo<ReportRecord>>,
    pub stratagems: Arc<MemoryRepo<StratagemRecord>>,
    pub store: Arc<ResponseStore>,
    pub config: CacheConfig,
    pub presentation: Presentation,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            assignments: Arc::new(MemoryRepo::new(Vec::new(), |row: &AssignmentRecord| row.id)),
            rewards: Arc::new(MemoryRewards::default()),
            events: Arc::new(events(Vec::new())),
            orders: Arc::new(orders(Vec::new())),
            reports: Arc::new(MemoryRepo::new(Vec::new(), |row: &ReportRecord| row.id)),
            stratagems: Arc::new(stratagems(Vec::new())),
            store: Arc::new(ResponseStore::new(&config)),
            config,
            presentation: Presentation::default(),
        }
    }

    fn cached<H: Handler + 'static>(&self, handler: H) -> Arc<dyn Handler> {
        Arc::new(CachingHandler::new(
            handler,
            self.store.clone(),
            self.config.clone(),
        ))
    }

    fn resource<R: Resource>(&self, repo: Arc<dyn ResourceRepo<R>>) -> Arc<dyn Handler> {
        self.cached(ResourceHandler::new(
            repo,
            QueryLimits::default(),
            self.presentation.clone(),
        ))
    }

    pub fn router(&self) -> Router {
        let state = ApiState {
            assignments: self.resource::<AssignmentRecord>(self.assignments.clone()),
            rewards: self.cached(RewardHandler::new(
                self.rewards.clone(),
                QueryLimits::default(),
            )),
            events: self.resource::<EventRecord>(self.events.clone()),
            orders: self.resource::<OrderRecord>(self.orders.clone()),
            reports: self.resource::<ReportRecord>(self.reports.clone()),
            stratagems: self.resource::<StratagemRecord>(self.stratagems.clone()),
        };
        build_router(state)
    }

    /// Admin router over a pool that never connects; health checks fail fast.
    pub fn admin_router(&self) -> Router {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://helldivers@127.0.0.1:1/helldivers")
            .expect("lazy pool should build");
        build_admin_router(AdminState {
            cache: self.store.clone(),
            db: Arc::new(PostgresRepositories::new(pool)),
        })
    }
}

pub async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body should be json")
    };
    (status, body)
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri).await
}
