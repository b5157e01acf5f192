//! Common test utilities for integration tests
//!
//! This module provides shared infrastructure for integration tests:
//! - Test configuration without environment variables
//! - Router wired to an in-memory (or failing) store
//! - Sample product routes that read through and invalidate the cache
//! - Request and body helpers

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use storefront_api::app::{build_router, AppState};
use storefront_api::config::{ApiConfig, CacheConfig, Config, RateLimitConfig};
use storefront_api::error::{ApiError, ApiResult};
use storefront_shared::cache::keys::{self, ProductListQuery};
use storefront_shared::kv::{KvError, KvResult, KvStore, MemoryStore, RedisConfig};
use tower::Service as _;

/// Test context containing all necessary resources
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub state: AppState,
    pub app: Router,
    pub product_loads: Arc<AtomicUsize>,
}

impl TestContext {
    /// Creates a context backed by a fresh in-memory store
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let product_loads = Arc::new(AtomicUsize::new(0));
        let state = AppState::new(store.clone(), config);
        let app = build_router(state.clone(), product_routes(product_loads.clone()));

        TestContext {
            store,
            state,
            app,
            product_loads,
        }
    }

    /// Sends a GET request as the given client address
    pub async fn get_as(&self, uri: &str, client: &str) -> Response {
        self.send(
            Request::builder()
                .uri(uri)
                .header("x-forwarded-for", client)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().call(request).await.unwrap()
    }

    pub fn product_loads(&self) -> usize {
        self.product_loads.load(Ordering::SeqCst)
    }
}

/// Configuration with the default limits and no environment lookups
pub fn test_config() -> Config {
    Config {
        api: ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
        },
        redis: RedisConfig::local(),
        rate_limit: RateLimitConfig::default(),
        cache: CacheConfig::default(),
    }
}

/// Router over a store that fails every command
pub fn app_with_unavailable_store() -> Router {
    let state = AppState::new(Arc::new(UnavailableStore), test_config());
    build_router(state, product_routes(Arc::new(AtomicUsize::new(0))))
}

/// Reads a response body as JSON
pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn header_str<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
}

/// Sample resource routes mounted under `/api`
///
/// Product reads go through the response cache; writes invalidate the entity
/// key and every list page.
fn product_routes(loads: Arc<AtomicUsize>) -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/:id", get(get_product).put(update_product))
        .route("/auth/login", axum::routing::post(|| async { StatusCode::OK }))
        .layer(Extension(loads))
}

async fn get_product(
    State(state): State<AppState>,
    Extension(loads): Extension<Arc<AtomicUsize>>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Value>> {
    let product = state
        .cache
        .get_or_compute(&keys::product_key(id), keys::DETAIL_TTL_SECS, || async {
            loads.fetch_add(1, Ordering::SeqCst);
            if id == 0 {
                return Err(ApiError::NotFound("Product not found".to_string()));
            }
            Ok(json!({ "id": id, "title": format!("Product {}", id) }))
        })
        .await?;

    Ok(Json(product))
}

async fn list_products(
    State(state): State<AppState>,
    Extension(loads): Extension<Arc<AtomicUsize>>,
    Query(query): Query<ProductListQuery>,
) -> ApiResult<Json<Value>> {
    let page = state
        .cache
        .get_or_compute(&query.cache_key(), keys::LIST_TTL_SECS, || async {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ApiError>(json!({ "products": [], "page": query.page, "limit": query.limit }))
        })
        .await?;

    Ok(Json(page))
}

async fn update_product(State(state): State<AppState>, Path(id): Path<u64>) -> StatusCode {
    state
        .cache
        .invalidate_all(&keys::product_invalidation_keys(id))
        .await;
    StatusCode::NO_CONTENT
}

/// Store that fails every command
pub struct UnavailableStore;

#[async_trait]
impl KvStore for UnavailableStore {
    async fn incr(&self, _key: &str) -> KvResult<i64> {
        Err(KvError::Unavailable("connection refused".to_string()))
    }

    async fn expire(&self, _key: &str, _ttl_secs: u64) -> KvResult<bool> {
        Err(KvError::Unavailable("connection refused".to_string()))
    }

    async fn get(&self, _key: &str) -> KvResult<Option<String>> {
        Err(KvError::Unavailable("connection refused".to_string()))
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl_secs: u64) -> KvResult<()> {
        Err(KvError::Unavailable("connection refused".to_string()))
    }

    async fn del(&self, _keys: &[String]) -> KvResult<u64> {
        Err(KvError::Unavailable("connection refused".to_string()))
    }

    async fn keys(&self, _pattern: &str) -> KvResult<Vec<String>> {
        Err(KvError::Unavailable("connection refused".to_string()))
    }

    async fn ping(&self) -> KvResult<bool> {
        Err(KvError::Unavailable("connection refused".to_string()))
    }
}
