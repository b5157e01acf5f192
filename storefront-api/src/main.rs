//! # Storefront API Server
//!
//! HTTP edge for the storefront backend. Every `/api` request passes the
//! per-client rate limiter; read handlers share a Redis-backed response cache.
//!
//! ## Usage
//!
//! ```bash
//! REDIS_URL=redis://localhost:6379 cargo run -p storefront-api
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use storefront_api::{
    app::{build_router, AppState},
    config::Config,
};
use storefront_shared::kv::RedisClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "storefront_api=debug,storefront_shared=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Storefront API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env()?;
    let bind_address = config.bind_address();

    // An unreachable Redis is retried per command; requests fail open meanwhile
    let store = RedisClient::connect_or_defer(config.redis.clone()).await?;
    let state = AppState::new(Arc::new(store), config);

    // Resource routes are mounted by the services built on this edge
    let app = build_router(state, axum::Router::new());

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
