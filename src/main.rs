//! Royal Academy Portal Backend
//!
//! Hosts the portal's key-value document store with a realtime changefeed, and
//! runs the sync layer on top of it: role-scoped dashboards, live class
//! consoles, heartbeat presence and fee payments.

mod api;
mod auth;
mod config;
mod dashboard;
mod db;
mod errors;
mod filter;
mod live;
mod models;
mod payments;
mod presence;
mod records;
mod store;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;
use errors::AppError;
use live::LiveConsoles;
use payments::{MockGateway, Payments};
use presence::{PresenceTracker, SystemClock};
use store::{KvStore, LocalCache};

/// The store adapter as wired in the server: SQLite behind a local cache.
pub type Store = KvStore<Repository>;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub store: Arc<Store>,
    pub presence: PresenceTracker<Repository>,
    pub consoles: Arc<LiveConsoles<Repository>>,
    pub payments: Arc<Payments<Repository, MockGateway>>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Open the database and cache and wire the sync layer on top.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let pool = db::init_database(&config.db_path).await?;
        let repo = Arc::new(Repository::new(pool));

        let cache = match &config.cache_path {
            Some(path) => LocalCache::open(path.clone()).await,
            None => LocalCache::in_memory(),
        };
        let store = Arc::new(KvStore::new(Arc::clone(&repo), cache));

        let clock = Arc::new(SystemClock);
        let presence = PresenceTracker::new(Arc::clone(&store), clock.clone(), &config.sync);
        let consoles = Arc::new(LiveConsoles::new(
            Arc::clone(&store),
            presence.clone(),
            config.sync.viewer_poll_interval,
        ));
        let payments = Arc::new(Payments::new(
            Arc::clone(&store),
            MockGateway::new(),
            clock,
        ));

        Ok(Self {
            repo,
            store,
            presence,
            consoles,
            payments,
            config: Arc::new(config),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (config, warnings) = Config::from_env();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    for warning in &warnings {
        tracing::warn!("{}", warning);
    }

    tracing::info!("Starting Royal Academy backend");
    tracing::info!("Database path: {:?}", config.db_path);
    match &config.cache_path {
        Some(path) => tracing::info!("Local cache: {:?}", path),
        None => tracing::info!("Local cache: in memory"),
    }
    tracing::info!(
        heartbeat = ?config.sync.heartbeat_interval,
        ttl = ?config.sync.presence_ttl,
        "Presence timing"
    );

    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (ROYAL_API_PSK). Authentication is disabled!");
    }

    let bind_addr = config.bind_addr;
    let state = AppState::build(config).await?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let psk = state.config.api_psk.clone();

    let api_routes = Router::new()
        // Documents
        .route("/revision", get(api::get_revision))
        .route("/documents", get(api::list_documents))
        .route("/documents/{key}", get(api::get_document))
        .route("/documents/{key}", put(api::put_document))
        .route("/documents/{key}", delete(api::delete_document))
        .route("/documents/{key}/events", get(api::document_events))
        // Dashboards
        .route("/dashboard", get(api::get_dashboard))
        // Live classes
        .route("/live/sessions", get(api::list_live_sessions))
        .route("/live/{teacher_id}", get(api::get_console))
        .route("/live/{teacher_id}/setup", post(api::setup_live))
        .route("/live/{teacher_id}/start", post(api::start_live))
        .route("/live/{teacher_id}/media", post(api::control_media))
        .route("/live/{teacher_id}/stop", post(api::stop_live))
        // Presence
        .route("/presence/{session_id}", get(api::get_presence))
        .route("/presence/{session_id}/heartbeat", post(api::heartbeat))
        // Read receipts
        .route("/notifications/{id}/read", post(api::read_notification))
        .route("/audio-messages/{id}/read", post(api::read_audio_message))
        // Payments
        .route("/fees/{id}/pay", post(api::pay_fee))
        .route("/payment-requests/{id}/pay", post(api::pay_request))
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
