//! Cooking School Ledger Backend
//!
//! REST backend for course and student enrollment records, with SQLite
//! document persistence and a webhook relay for ledger events.

mod api;
mod config;
mod db;
mod errors;
mod ledger;
mod models;
mod relay;

use std::sync::Arc;

use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::SqliteStore;
use ledger::Ledger;
use relay::WebhookRelay;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub ledger: Arc<Ledger>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Cooking School Ledger Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    let state = build_state(&config).await?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Open the database, the relay and the ledger projections.
pub async fn build_state(config: &Config) -> Result<AppState, Box<dyn std::error::Error>> {
    let pool = db::init_database(&config.db_path).await?;
    let store = Arc::new(SqliteStore::new(pool));

    let relay = Arc::new(WebhookRelay::new(
        config.webhook_url.clone(),
        config.relay_timeout,
    )?);
    if !relay.is_enabled() {
        tracing::warn!("No webhook configured (LEDGER_WEBHOOK_URL). Relay deliveries are skipped!");
    }

    let ledger = Ledger::open(store.clone(), relay, config.cascade_mode).await?;

    Ok(AppState {
        store,
        ledger: Arc::new(ledger),
    })
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Datastore
        .route("/datastore", get(api::get_datastore))
        .route("/datastore/revision", get(api::get_revision))
        // Courses
        .route("/courses", get(api::list_courses).post(api::create_course))
        .route("/courses/{id}", delete(api::delete_course))
        .route("/courses/{id}/name", patch(api::rename_course))
        .route("/courses/{id}/name/commit", post(api::commit_course_name))
        .route("/courses/{id}/date-range", put(api::update_date_range))
        .route("/courses/by-name/{name}", delete(api::delete_course_by_name))
        .route("/courses/by-name/{name}/summary", get(api::course_summary))
        .route("/courses/by-name/{name}/finish", post(api::finish_enrollment))
        // Students
        .route("/students", get(api::list_students).post(api::create_student))
        .route(
            "/students/{id}",
            get(api::get_student)
                .put(api::update_student)
                .delete(api::delete_student),
        )
        // View session
        .route("/session", get(api::get_session))
        .route("/session/active", put(api::select_course))
        .route("/session/editor", post(api::editor_action));

    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
