//! Field Lifecycle Management Service - Backend Server
//!
//! Tracks agricultural fields through their crop lifecycle, detects harvest
//! events from satellite vegetation indices, and keeps farmers informed
//! through in-app notifications.

use axum::{routing::get, Router};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod external;
mod handlers;
mod routes;
mod services;

pub use config::Config;

use services::{CacheService, LifecycleService, MonitoringService};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flm_server=debug,tower_http=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::load()?;

    tracing::info!("Starting Field Lifecycle Management Server");
    tracing::info!("Environment: {}", config.environment);

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Database connection established");

    // Run migrations in development
    if config.environment == "development" {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");
    }

    let config = Arc::new(config);

    // Reconcile materialized statuses against the event log before serving
    let lifecycle = lifecycle_service(&db_pool, &config);
    let repaired = lifecycle.reconcile_all().await?;
    if repaired > 0 {
        tracing::warn!("Reconciliation repaired {} field statuses", repaired);
    }

    // One-shot mode for external schedulers: `flm-server run-detection-cycle`
    if std::env::args().nth(1).as_deref() == Some("run-detection-cycle") {
        let monitoring = MonitoringService::new(db_pool.clone(), config.clone());
        let report = monitoring.run_detection_cycle().await?;
        tracing::info!(
            "Detection cycle finished: {} fields, {} candidates, {} resow flags, {} dormant, {} failed",
            report.fields_processed,
            report.candidates.len(),
            report.resow_flags.len(),
            report.dormant_transitions,
            report.failed_fields
        );
        return Ok(());
    }

    // In-process scheduler
    if config.monitoring.scheduler_enabled {
        let monitoring = MonitoringService::new(db_pool.clone(), config.clone());
        let interval = Duration::from_secs(config.monitoring.poll_interval_minutes * 60);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately, skip it
            loop {
                ticker.tick().await;
                if let Err(e) = monitoring.run_detection_cycle().await {
                    tracing::error!("Scheduled detection cycle failed: {}", e);
                }
            }
        });
        tracing::info!(
            "Detection scheduler enabled, every {} minutes",
            config.monitoring.poll_interval_minutes
        );
    }

    // Create application state
    let state = AppState {
        db: db_pool,
        config,
    };

    // Build application
    let app = create_app(state.clone());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn lifecycle_service(db: &sqlx::PgPool, config: &Arc<Config>) -> LifecycleService {
    let cache = CacheService::new(db.clone(), config.monitoring.cache_ttl_hours);
    LifecycleService::new(db.clone(), cache, config.lifecycle.clone())
}

/// Create the application router with all routes and middleware
fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Field Lifecycle Management Service API v1.0"
}
