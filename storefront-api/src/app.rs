/// Application state and router builder
///
/// This module defines the shared application state and provides a function
/// that wraps the resource routes with the storefront edge middleware.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use storefront_api::{app::AppState, config::Config};
/// use storefront_shared::kv::RedisClient;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let store = RedisClient::new(config.redis.clone()).await?;
/// let state = AppState::new(Arc::new(store), config);
/// let app = storefront_api::app::build_router(state, axum::Router::new());
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    error::ApiError,
    middleware::{
        rate_limit::{rate_limit_layer, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING},
        security::SecurityHeadersLayer,
    },
};
use axum::{
    extract::OriginalUri,
    http::{header, HeaderName, HeaderValue, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use storefront_shared::{cache::ResponseCache, kv::KvStore, rate_limit::RateLimiter};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Headers browsers may send on cross-origin API requests
const CORS_ALLOWED_HEADERS: [&str; 10] = [
    "x-csrf-token",
    "x-requested-with",
    "accept",
    "accept-version",
    "content-length",
    "content-md5",
    "content-type",
    "date",
    "x-api-version",
    "authorization",
];

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// The store handle is created once at startup; the limiter and the cache
/// share it.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,

    /// Key-value store shared by the limiter and the cache
    pub store: Arc<dyn KvStore>,

    /// Fixed-window rate limiter
    pub limiter: RateLimiter,

    /// Response cache for read endpoints
    pub cache: ResponseCache,
}

impl AppState {
    /// Creates new application state around a store handle
    pub fn new(store: Arc<dyn KvStore>, config: Config) -> Self {
        let cache = ResponseCache::new(store.clone()).with_default_ttl(config.cache.default_ttl_secs);

        Self {
            limiter: RateLimiter::new(store.clone()),
            cache,
            store,
            config: Arc::new(config),
        }
    }
}

/// Builds the complete Axum router around the resource routes
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET /health              # Health check (not rate limited)
/// └── /api/                    # Caller-provided resource routes (rate limited)
///     └── *                    # JSON 404 for unknown API paths (rate limited)
/// ```
///
/// # Middleware Stack
///
/// Applied in order (outermost first):
/// 1. Security headers
/// 2. CORS (answers preflight requests before they are counted)
/// 3. Logging (tower-http TraceLayer)
/// 4. Rate limiting (`/api` only)
pub fn build_router(state: AppState, api_routes: Router<AppState>) -> Router {
    use crate::routes;

    // Health check (public, not rate limited)
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let api = api_routes
        .fallback(api_not_found)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_layer,
        ));

    let cors = cors_layer(&state.config);

    Router::new()
        .merge(health_routes)
        .nest("/api", api)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new())
        .with_state(state)
}

/// Configures CORS from `CORS_ORIGIN`
///
/// A wildcard origin cannot be combined with credentials, so credentials are
/// only allowed for an explicit origin list.
fn cors_layer(config: &Config) -> CorsLayer {
    let headers: Vec<HeaderName> = CORS_ALLOWED_HEADERS
        .into_iter()
        .map(HeaderName::from_static)
        .collect();

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::DELETE,
            Method::PATCH,
            Method::POST,
            Method::PUT,
        ])
        .allow_headers(headers)
        .expose_headers([header::RETRY_AFTER, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING])
        .max_age(Duration::from_secs(3600));

    if config.api.allows_any_origin() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(AllowOrigin::list(parse_origins(&config.api.cors_origins)))
            .allow_credentials(true)
    }
}

/// Parses configured origins, skipping values that are not valid header values
fn parse_origins(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect()
}

async fn api_not_found(OriginalUri(uri): OriginalUri) -> ApiError {
    ApiError::NotFound(format!("No route for {}", uri.path()))
}
