//! # wizard: configuration and health-scan backend for a metric-collection cluster
//!
//! `wizard` lets operators inspect and edit the configuration of a distributed metric-collection
//! cluster, and scans the cluster for anomalies: metrics that stopped delivering values, metrics
//! that deliver although archived, incomplete metadata and non-finite values. Every anomaly is
//! kept as exactly one issue report per `(type, scope_type, scope)` until it disappears.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum). Documents are stored in PostgreSQL
//! (or in process-local maps for development) behind the traits in [`storage`]. Metric values are
//! read from a history gateway through [`history::HistoryClient`].
//!
//! - The **health scan** ([`health`]) streams all metadata, runs the per-metric checks on a
//!   bounded task pool and reconciles issue reports. Scans are started over HTTP or periodically.
//! - The **API layer** ([`api`]) exposes scans, issues, metric metadata and client configurations
//!   under `/api`.
//! - **Background services** run the periodic scan; with PostgreSQL and leader election enabled
//!   only the replica holding the advisory lock runs it.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use wizard::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = wizard::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.ok();
//!     })
//!     .await
//! }
//! ```
pub mod api;
pub mod config;
pub mod configs;
pub mod db;
pub mod errors;
pub mod health;
pub mod history;
mod leader_election;
mod openapi;
pub mod storage;
pub mod telemetry;

#[cfg(test)]
pub mod test_utils;

use axum::{
    Json, Router,
    routing::{delete, get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use config::DatabaseConfig;
use health::{
    ClusterScanner, HealthScanScheduler, IssueQueryService, ScanOptions,
    checks::{CheckSettings, MetricHealthChecks},
    reports::IssueReporter,
};
use history::{HistoryClient, HttpHistoryClient};
use sqlx::PgPool;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use storage::Stores;
use tokio::net::TcpListener;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info, instrument, warn};
use utoipa::OpenApi;

use crate::configs::ConfigManager;
use crate::openapi::ApiDoc;

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .scanner(scanner)
///     .issues(IssueQueryService::new(stores.issues.clone()))
///     .configs(ConfigManager::new(stores.configs.clone(), stores.metadata.clone()))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub scanner: ClusterScanner,
    pub issues: IssueQueryService,
    pub configs: ConfigManager,
}

impl AppState {
    /// Wire the services of the application over `stores` and `history`.
    pub fn from_parts(config: Config, stores: &Stores, history: Arc<dyn HistoryClient>) -> Self {
        let checks = MetricHealthChecks::new(
            IssueReporter::new(stores.issues.clone()),
            history,
            CheckSettings::from_config(&config.health_scan, &config.history),
        );
        let scanner = ClusterScanner::new(
            stores.metadata.clone(),
            stores.issues.clone(),
            checks,
            ScanOptions::from(&config.health_scan),
        );

        AppState::builder()
            .scanner(scanner)
            .issues(IssueQueryService::new(stores.issues.clone()))
            .configs(ConfigManager::new(stores.configs.clone(), stores.metadata.clone()))
            .config(config)
            .build()
    }
}

/// Get the wizard database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Open the configured storage backend. PostgreSQL pools are migrated before use.
async fn setup_storage(config: &Config) -> anyhow::Result<(Stores, Option<PgPool>)> {
    match &config.database {
        DatabaseConfig::Postgres { url, pool } => {
            info!("Using PostgreSQL storage");
            let pool = db::pools::connect(url, pool).await?;
            Ok((Stores::postgres(pool.clone()), Some(pool)))
        }
        DatabaseConfig::Memory => {
            warn!("Using in-memory storage: documents are lost on shutdown");
            Ok((Stores::in_memory(), None))
        }
    }
}

/// Build the application router.
///
/// - `/healthz` liveness endpoint
/// - `/api/*` handlers and `/api/openapi.json`
/// - `/internal/metrics` Prometheus endpoint when `enable_metrics` is set
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> Router {
    use api::handlers::{cluster, configs, metrics};

    let api_routes = Router::new()
        // Health scans and issues
        .route(
            "/cluster/health_scan",
            post(cluster::start_health_scan).get(cluster::get_health_scan),
        )
        .route("/cluster/issues", get(cluster::list_issues))
        .route("/cluster/issues/{issue_id}", delete(cluster::delete_issue))
        .route("/metric/{metric_id}/issues", get(cluster::get_metric_issues))
        // Metric metadata
        .route("/metrics", get(metrics::list_metrics))
        .route("/metrics/delete", post(metrics::delete_metrics))
        .route("/metric/{metric_id}", get(metrics::get_metric))
        // Client configurations
        .route("/clients", get(configs::list_clients))
        .route(
            "/client/{token}/config",
            get(configs::get_client_config).put(configs::put_client_config),
        )
        .route("/client/{token}/config/backups", get(configs::list_config_backups))
        .route(
            "/client/{token}/config/backups/{backup_id}",
            get(configs::get_config_backup),
        )
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .with_state(state.clone());

    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/api", api_routes);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route(
                "/internal/metrics",
                get(move || {
                    let metric_handle = metric_handle.clone();
                    async move { metric_handle.render() }
                }),
            )
            .layer(prometheus_layer);
    }

    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

/// Container for background services and their lifecycle management.
///
/// When dropped, the `drop_guard` cancels the shutdown token, signalling every task to stop.
pub struct BackgroundServices {
    is_leader: Arc<AtomicBool>,
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: CancellationToken,
    // Pub so that we can disarm it if we want to
    pub drop_guard: Option<DropGuard>,
}

impl BackgroundServices {
    /// Whether this replica currently runs the leader-only services.
    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::Relaxed)
    }

    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();
        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

/// Start the periodic health scan, behind leader election when running on PostgreSQL.
fn setup_background_services(
    pool: Option<PgPool>,
    scanner: ClusterScanner,
    config: &Config,
    shutdown_token: CancellationToken,
) -> BackgroundServices {
    let drop_guard = shutdown_token.clone().drop_guard();
    let mut background_tasks = Vec::new();
    let is_leader = Arc::new(AtomicBool::new(false));

    let scan_config = &config.background_services.health_scan;
    if !scan_config.enabled {
        info!("Periodic health scan disabled");
        return BackgroundServices {
            is_leader,
            background_tasks,
            shutdown_token,
            drop_guard: Some(drop_guard),
        };
    }

    let scheduler = HealthScanScheduler::new(scanner, scan_config.interval);

    match pool {
        Some(pool) if config.background_services.leader_election.enabled => {
            info!("Starting leader election - will attempt to acquire leadership");

            // Token of the current leadership session, cancelled when leadership is lost
            let session: Arc<parking_lot::Mutex<Option<CancellationToken>>> = Arc::default();

            let on_gain = {
                let session = session.clone();
                let scheduler = scheduler.clone();
                let parent = shutdown_token.clone();
                move || {
                    let token = parent.child_token();
                    *session.lock() = Some(token.clone());
                    let scheduler = scheduler.clone();
                    async move {
                        tokio::spawn(scheduler.run(token));
                        Ok(())
                    }
                }
            };
            let on_lose = move || {
                if let Some(token) = session.lock().take() {
                    token.cancel();
                }
                async { Ok(()) }
            };

            let handle = tokio::spawn(leader_election::leader_election_task(
                pool,
                is_leader.clone(),
                leader_election::LEADER_LOCK_ID,
                shutdown_token.clone(),
                on_gain,
                on_lose,
            ));
            background_tasks.push(handle);
        }
        _ => {
            info!("Launching without leader election: running as leader");
            is_leader.store(true, Ordering::Relaxed);
            background_tasks.push(tokio::spawn(scheduler.run(shutdown_token.clone())));
        }
    }

    BackgroundServices {
        is_leader,
        background_tasks,
        shutdown_token,
        drop_guard: Some(drop_guard),
    }
}

/// Main application struct that owns all resources and lifecycle.
///
/// 1. **Create**: [`Application::new`] opens storage (running migrations), connects the history
///    client and starts background services
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: when the shutdown future resolves, background services are stopped and
///    connections closed
pub struct Application {
    router: Router,
    config: Config,
    pool: Option<PgPool>,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting wizard with configuration: {:#?}", config);

        let (stores, pool) = setup_storage(&config).await?;
        let history: Arc<dyn HistoryClient> = Arc::new(HttpHistoryClient::new(&config.history));
        Ok(Self::with_parts(config, stores, pool, history))
    }

    /// Assemble the application over already opened stores.
    pub fn with_parts(config: Config, stores: Stores, pool: Option<PgPool>, history: Arc<dyn HistoryClient>) -> Self {
        let state = AppState::from_parts(config.clone(), &stores, history);
        let bg_services = setup_background_services(pool.clone(), state.scanner.clone(), &config, CancellationToken::new());
        let router = build_router(&state);

        Self {
            router,
            config,
            pool,
            bg_services,
        }
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, BackgroundServices) {
        let server = axum_test::TestServer::new(self.router).expect("Failed to create test server");
        (server, self.bg_services)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Wizard listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Stopping background services...");
        self.bg_services.shutdown().await;

        if let Some(pool) = self.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
