//! Binary entry point: load config, build the replica-backed app state,
//! and serve it. See `lib.rs` for the router/state assembly itself.

use replikit_server::config::Config;
use replikit_server::{build_router, build_state};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "replikit_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Replikit Server on {}:{}", config.host, config.port);
    let addr = format!("{}:{}", config.host, config.port);

    let state = build_state(config).await?;
    tracing::info!(replica_uid = %state.replica.replica_uid(), "replica opened");

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
