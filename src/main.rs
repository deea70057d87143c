//! Tamil Flashcards Backend
//!
//! Local-first REST backend for Tamil vocabulary practice: words and sentences
//! grouped by topic, a daily learning streak, and a short deletion window for
//! fresh translations. SQLite is authoritative and a remote table store, when
//! configured, is kept as a best-effort mirror.

mod api;
mod clock;
mod config;
mod db;
mod errors;
mod lock;
mod models;
mod progress;
mod remote;
mod streak;

use std::sync::Arc;

use axum::{
    routing::{delete, get},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use clock::{Clock, SystemClock};
use config::Config;
use db::Repository;
use progress::ProgressStore;
use remote::{Mirror, RemoteStore, RestTableStore};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub progress: Arc<ProgressStore>,
    pub mirror: Mirror,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Tamil Flashcards Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);
    tracing::info!("Day boundary: {:?}", config.day_boundary);

    let mirror = match &config.remote {
        Some(remote) => {
            tracing::info!("Mirroring to remote store at {}", remote.url);
            let store: Arc<dyn RemoteStore> =
                Arc::new(RestTableStore::new(&remote.url, &remote.api_key)?);
            Mirror::new(Some(store))
        }
        None => {
            tracing::warn!("No remote store configured (FLASHCARDS_REMOTE_URL). Running local-only.");
            Mirror::default()
        }
    };

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Repository::new(pool);

    // Fill an empty local copy from the remote before serving
    let imported = remote::hydrate_items(&repo, &mirror).await?;
    if imported > 0 {
        tracing::info!("Hydrated {} items from remote store", imported);
    }

    let progress = ProgressStore::open(repo.clone(), mirror.clone()).await;
    let snapshot = progress.snapshot().await;
    tracing::info!(
        "Streak {} (longest {}), {} words and {} sentences learned",
        snapshot.current_streak,
        snapshot.longest_streak,
        snapshot.total_words_learned,
        snapshot.total_sentences_learned
    );

    // Log every saved streak record
    let mut updates = progress.subscribe();
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let data = updates.borrow_and_update().clone();
            tracing::debug!(
                "Progress saved: streak {} (longest {}), last activity {:?}",
                data.current_streak,
                data.longest_streak,
                data.last_activity_date
            );
        }
    });

    // Create application state
    let state = AppState {
        repo: Arc::new(repo),
        progress: Arc::new(progress),
        mirror,
        clock: Arc::new(SystemClock),
        config: Arc::new(config.clone()),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API routes
    let api_routes = Router::new()
        // Progress
        .route("/progress", get(api::get_progress))
        .route("/activity", get(api::get_activity))
        // Items
        .route("/{kind}/items", get(api::list_items).post(api::create_item))
        .route(
            "/{kind}/items/{id}",
            get(api::get_item)
                .put(api::update_item)
                .delete(api::delete_item),
        )
        // Topics
        .route("/{kind}/topics", get(api::list_topics))
        .route("/{kind}/topics/{name}", delete(api::delete_topic))
        .route("/{kind}/topics/{name}/lock", get(api::topic_lock));

    // Health check
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
