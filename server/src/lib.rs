//! Replikit Server - reference HTTP sync server exposing a
//! `replikit-engine` replica over the wire.
//!
//! Provides document CRUD and the §6.4 sync wire protocol for Flutter
//! and other clients to synchronize their local replica against this
//! one, using the engine's Postgres-backed `StorageBackend`.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod sync_target_http;

use crate::config::Config;
use crate::db::PgBackend;
use axum::Router;
use replikit_engine::Replica;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use sync_target_http::HttpSyncTarget;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub replica: Arc<Replica<PgBackend>>,
    pub config: Arc<Config>,
}

/// Connect, migrate, and open a replica over `config.database_url`.
/// Shared by the binary entry point and integration tests that want a
/// real in-process server.
pub async fn build_state(config: Config) -> Result<AppState, Box<dyn std::error::Error + Send + Sync>> {
    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    let backend = PgBackend::new(pool);
    let replica = tokio::task::spawn_blocking(move || Replica::open(backend)).await??;

    Ok(AppState {
        replica: Arc::new(replica),
        config: Arc::new(config),
    })
}

/// Assemble the full router (routes + tracing + permissive CORS) over
/// `state`. The binary additionally binds this to a listener; tests
/// exercise it directly via `tower::ServiceExt::oneshot` or by binding
/// their own ephemeral listener.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
