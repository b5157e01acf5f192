/// Integration tests for the rate limiting edge
///
/// These tests drive the full router (security headers, CORS, tracing, rate
/// limiting) over an in-memory store:
/// - Default and per-route limits
/// - Rate limit headers and the 429 response
/// - Fail-open behavior when the store is down
/// - Paths outside the limiter

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{app_with_unavailable_store, body_json, header_str, TestContext};
use storefront_shared::kv::KvStore;
use tower::Service as _;

#[tokio::test]
async fn test_default_limit_then_429() {
    let ctx = TestContext::new();

    for expected_remaining in (0..10).rev() {
        let response = ctx.get_as("/api/products/1", "203.0.113.7").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "x-ratelimit-limit"), Some("10"));
        assert_eq!(
            header_str(&response, "x-ratelimit-remaining"),
            Some(expected_remaining.to_string().as_str())
        );
    }

    let response = ctx.get_as("/api/products/1", "203.0.113.7").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header_str(&response, "retry-after"), Some("60"));
    assert_eq!(header_str(&response, "x-ratelimit-remaining"), Some("0"));
    assert_eq!(header_str(&response, "x-frame-options"), Some("DENY"));

    let body = body_json(response).await;
    assert_eq!(body["error"], "rate_limit_exceeded");
    assert_eq!(body["message"], "Too many requests, please try again later");
}

#[tokio::test]
async fn test_rejected_requests_do_not_reach_handler() {
    let ctx = TestContext::new();

    for _ in 0..15 {
        ctx.get_as("/api/products?page=1", "203.0.113.7").await;
    }

    // First request computes, the next nine hit the cache, the rest are rejected
    assert_eq!(ctx.product_loads(), 1);
}

#[tokio::test]
async fn test_auth_routes_use_stricter_limit() {
    let ctx = TestContext::new();

    let login = || {
        Request::builder()
            .method(Method::POST)
            .uri("/api/auth/login")
            .header("x-forwarded-for", "198.51.100.20")
            .body(Body::empty())
            .unwrap()
    };

    for _ in 0..5 {
        let response = ctx.send(login()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "x-ratelimit-limit"), Some("5"));
    }

    let response = ctx.send(login()).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_clients_are_limited_independently() {
    let ctx = TestContext::new();

    for _ in 0..10 {
        ctx.get_as("/api/products/7", "10.0.0.1").await;
    }
    assert_eq!(
        ctx.get_as("/api/products/7", "10.0.0.1").await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    let other = ctx.get_as("/api/products/7", "10.0.0.2").await;
    assert_eq!(other.status(), StatusCode::OK);
    assert_eq!(header_str(&other, "x-ratelimit-remaining"), Some("9"));

    // Only the first forwarded address identifies the client
    let proxied = ctx
        .get_as("/api/products/7", "10.0.0.1, 172.16.0.1")
        .await;
    assert_eq!(proxied.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_requests_without_address_share_unknown_bucket() {
    let ctx = TestContext::new();

    let response = ctx
        .send(
            Request::builder()
                .uri("/api/products/3")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let count = ctx
        .store
        .get("rate-limit:unknown:/api/products/3")
        .await
        .unwrap();
    assert_eq!(count.as_deref(), Some("1"));
}

#[tokio::test]
async fn test_unknown_api_path_is_json_404_and_counted() {
    let ctx = TestContext::new();

    let response = ctx.get_as("/api/does-not-exist", "192.0.2.1").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(header_str(&response, "x-ratelimit-remaining"), Some("9"));

    let body = body_json(response).await;
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_health_is_not_rate_limited() {
    let ctx = TestContext::new();

    for _ in 0..20 {
        let response = ctx.get_as("/health", "192.0.2.1").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(header_str(&response, "x-ratelimit-limit").is_none());
    }

    let body = body_json(ctx.get_as("/health", "192.0.2.1").await).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "connected");
}

#[tokio::test]
async fn test_store_outage_fails_open() {
    let mut app = app_with_unavailable_store();

    for _ in 0..25 {
        let response = app
            .call(
                Request::builder()
                    .uri("/api/products/1")
                    .header("x-forwarded-for", "203.0.113.9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "x-ratelimit-limit"), Some("10"));
        assert!(header_str(&response, "x-ratelimit-remaining").is_none());
    }
}

#[tokio::test]
async fn test_health_reports_degraded_store() {
    let mut app = app_with_unavailable_store();

    let response = app
        .call(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["store"], "disconnected");
}

#[tokio::test]
async fn test_preflight_is_answered_without_counting() {
    let ctx = TestContext::new();

    let response = ctx
        .send(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/products")
                .header("origin", "https://shop.example.com")
                .header("access-control-request-method", "POST")
                .header("x-forwarded-for", "192.0.2.50")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "access-control-allow-origin"), Some("*"));
    assert!(ctx
        .store
        .get("rate-limit:192.0.2.50:/api/products")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
#[ignore] // Requires running Redis instance
async fn test_rate_limit_against_redis() {
    use std::sync::Arc;
    use storefront_api::app::{build_router, AppState};
    use storefront_shared::kv::{RedisClient, RedisConfig};

    let store = RedisClient::new(RedisConfig::local()).await.unwrap();
    let state = AppState::new(Arc::new(store), common::test_config());
    let mut app = build_router(state, axum::Router::new());
    let client = format!("test-{}", uuid::Uuid::new_v4());

    for _ in 0..10 {
        let response = app
            .call(
                Request::builder()
                    .uri("/api/anything")
                    .header("x-forwarded-for", client.as_str())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    let response = app
        .call(
            Request::builder()
                .uri("/api/anything")
                .header("x-forwarded-for", client.as_str())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}
