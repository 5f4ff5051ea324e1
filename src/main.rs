use std::{process, sync::Arc};

use helldivers_api::{
    application::{
        error::AppError,
        handlers::{Handler, ResourceHandler, RewardHandler},
        query::QueryLimits,
        repos::{ResourceRepo, RewardsRepo},
        resources::{Presentation, Resource},
    },
    cache::{CacheConfig, CachingHandler, ResponseStore},
    config,
    domain::entities::{
        AssignmentRecord, EventRecord, OrderRecord, ReportRecord, StratagemRecord,
    },
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, AdminState, ApiState},
        telemetry,
    },
};
use tokio::try_join;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings);

    info!(
        target = "helldivers_api::serve",
        public = %settings.server.public_addr,
        admin = %settings.server.admin_addr,
        cache_enabled = settings.cache.enabled,
        cache_ttl_seconds = settings.cache.ttl_seconds.get(),
        "starting listeners"
    );

    serve_http(&settings, app.api_state, app.admin_state).await
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let pool = connect(&settings).await?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(target = "helldivers_api::migrate", "migrations applied");
    Ok(())
}

async fn connect(settings: &config::Settings) -> Result<sqlx::PgPool, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let pool = connect(settings).await?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

struct ApplicationContext {
    api_state: ApiState,
    admin_state: AdminState,
}

/// Wire every route handler behind one shared response store.
fn build_application_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> ApplicationContext {
    let cache_config = CacheConfig::from(&settings.cache);
    let store = Arc::new(ResponseStore::new(&cache_config));
    let limits = QueryLimits {
        default_take: settings.api.default_page_size,
        max_take: settings.api.max_page_size,
    };
    let presentation = Presentation::new(settings.storage.url.clone());

    let wiring = Wiring {
        store: store.clone(),
        config: cache_config,
        limits,
        presentation,
    };

    let rewards_repo: Arc<dyn RewardsRepo> = repositories.clone();
    let rewards = wiring.cached(RewardHandler::new(rewards_repo, limits));

    let api_state = ApiState {
        assignments: wiring.resource::<AssignmentRecord>(repositories.clone()),
        rewards,
        events: wiring.resource::<EventRecord>(repositories.clone()),
        orders: wiring.resource::<OrderRecord>(repositories.clone()),
        reports: wiring.resource::<ReportRecord>(repositories.clone()),
        stratagems: wiring.resource::<StratagemRecord>(repositories.clone()),
    };

    let admin_state = AdminState {
        cache: store,
        db: repositories,
    };

    ApplicationContext {
        api_state,
        admin_state,
    }
}

struct Wiring {
    store: Arc<ResponseStore>,
    config: CacheConfig,
    limits: QueryLimits,
    presentation: Presentation,
}

impl Wiring {
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
            self.limits,
            self.presentation.clone(),
        ))
    }
}

async fn serve_http(
    settings: &config::Settings,
    api_state: ApiState,
    admin_state: AdminState,
) -> Result<(), AppError> {
    let public_router = http::build_router(api_state);
    let admin_router = http::build_admin_router(admin_state);

    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    let public_server = axum::serve(public_listener, public_router.into_make_service());
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service());

    try_join!(public_server, admin_server)
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}
