/// Rate limiting middleware for API endpoints
///
/// Applies the shared fixed-window [`RateLimiter`] to every request that
/// reaches the `/api` router. Limits are counted per client and per request
/// path, with the policy chosen by [`RateLimitConfig::policy_for`].
///
/// # Client Identification
///
/// 1. First entry of `X-Forwarded-For`
/// 2. Socket peer address (when served with connect info)
/// 3. `"unknown"`
///
/// # Headers
///
/// - `X-RateLimit-Limit`: Requests allowed per window
/// - `X-RateLimit-Remaining`: Requests left in the current window (omitted when
///   the store was unavailable and the request was let through)
/// - `Retry-After`: Window length in seconds (429 responses only)
///
/// # Example
///
/// ```no_run
/// use axum::{routing::get, Router};
/// use storefront_api::app::AppState;
/// use storefront_api::middleware::rate_limit::rate_limit_layer;
///
/// # fn example(state: AppState) {
/// let app: Router = Router::new()
///     .route("/api/products", get(|| async { "[]" }))
///     .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit_layer))
///     .with_state(state);
/// # }
/// ```
///
/// [`RateLimiter`]: storefront_shared::rate_limit::RateLimiter
/// [`RateLimitConfig::policy_for`]: crate::config::RateLimitConfig::policy_for

use crate::app::AppState;
use crate::error::ApiError;
use axum::{
    extract::{ConnectInfo, OriginalUri, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use storefront_shared::rate_limit::RateLimitDecision;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Client id used when no address is available
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Rate limiting middleware layer
///
/// Counts the request and returns 429 once the client is over its limit for
/// the path. Store failures never block the request.
pub async fn rate_limit_layer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    // Nested routers see a stripped URI; count against the full path
    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.0.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let client_id = client_id(request.headers(), peer);

    let policy = state.config.rate_limit.policy_for(&path);

    match state.limiter.check(&client_id, &path, policy).await {
        RateLimitDecision::Allowed { limit, remaining } => {
            let mut response = next.run(request).await;
            insert_rate_limit_headers(response.headers_mut(), limit, remaining);
            response
        }
        RateLimitDecision::Rejected {
            limit,
            retry_after_secs,
        } => {
            tracing::info!(
                client_id = %client_id,
                path = %path,
                limit = limit,
                "Rejecting request over rate limit"
            );
            let mut response = ApiError::rate_limited(retry_after_secs).into_response();
            insert_rate_limit_headers(response.headers_mut(), limit, Some(0));
            response
        }
    }
}

/// Resolves the client id for rate limiting
pub fn client_id(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty());

    match (forwarded, peer) {
        (Some(first), _) => first.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => UNKNOWN_CLIENT.to_string(),
    }
}

fn insert_rate_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: Option<u32>) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
    if let Some(remaining) = remaining {
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
    }
}
