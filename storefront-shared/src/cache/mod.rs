/// Response cache
///
/// Stores JSON-serialized response bodies in the key-value store under
/// deterministic keys (see [`keys`]) with a TTL chosen at write time.
///
/// Every operation is fail-soft: a store error, a timeout or a payload that no
/// longer decodes turns a read into a miss and a write or invalidation into a
/// `false` return. Nothing here is surfaced to the client.
///
/// # Invalidation
///
/// [`ResponseCache::invalidate`] treats its argument as a glob pattern when it
/// contains `*`, `?` or `[`: matching keys are enumerated and deleted in one
/// batch. Enumeration and deletion are separate commands, so an entry written
/// between the two survives until its TTL expires.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use serde_json::json;
/// use storefront_shared::cache::{keys, ResponseCache};
/// use storefront_shared::kv::MemoryStore;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache = ResponseCache::new(Arc::new(MemoryStore::new()));
///
/// let key = keys::product_key(42);
/// assert!(cache.put(&key, &json!({"title": "X"}), keys::DETAIL_TTL_SECS).await);
///
/// let cached: Option<serde_json::Value> = cache.get(&key).await;
/// assert_eq!(cached, Some(json!({"title": "X"})));
///
/// assert!(cache.invalidate_all(&keys::product_invalidation_keys(42)).await);
/// assert!(cache.get::<serde_json::Value>(&key).await.is_none());
/// # }
/// ```

pub mod keys;

use crate::kv::{KvError, KvStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Cache operation errors
///
/// Only visible through the `try_*` methods; the fail-soft methods log them.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache store error: {0}")]
    Store(#[from] KvError),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Whether a cache key argument is a glob pattern
pub fn is_pattern(key: &str) -> bool {
    key.contains(['*', '?', '['])
}

/// TTL-bound JSON response cache over a shared key-value store
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn KvStore>,
    default_ttl_secs: u64,
}

impl ResponseCache {
    /// Creates a cache using [`keys::DEFAULT_TTL_SECS`] as the default TTL
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            default_ttl_secs: keys::DEFAULT_TTL_SECS,
        }
    }

    /// Overrides the default TTL
    pub fn with_default_ttl(mut self, ttl_secs: u64) -> Self {
        self.default_ttl_secs = ttl_secs;
        self
    }

    pub fn default_ttl_secs(&self) -> u64 {
        self.default_ttl_secs
    }

    /// Reads and decodes a cached value
    pub async fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.store.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Reads a cached value, `None` on a miss or any failure
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_get(key).await {
            Ok(Some(value)) => {
                tracing::debug!(key = %key, "Cache hit");
                Some(value)
            }
            Ok(None) => {
                tracing::debug!(key = %key, "Cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Serializes and stores a value with a TTL
    pub async fn try_put<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), CacheError> {
        let payload = serde_json::to_string(value)?;
        self.store.set_ex(key, &payload, ttl_secs).await?;
        Ok(())
    }

    /// Stores a value with a TTL, returning whether the write succeeded
    pub async fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl_secs: u64) -> bool {
        match self.try_put(key, value, ttl_secs).await {
            Ok(()) => {
                tracing::debug!(key = %key, ttl_secs = ttl_secs, "Cached response");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Cache write failed");
                false
            }
        }
    }

    /// Stores a value with the default TTL
    pub async fn put_default<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        self.put(key, value, self.default_ttl_secs).await
    }

    /// Deletes an exact key or every key matching a pattern
    ///
    /// Returns the number of deleted keys; no match is not an error.
    pub async fn try_invalidate(&self, key_or_pattern: &str) -> Result<u64, CacheError> {
        let targets = if is_pattern(key_or_pattern) {
            let matched = self.store.keys(key_or_pattern).await?;
            if matched.is_empty() {
                return Ok(0);
            }
            matched
        } else {
            vec![key_or_pattern.to_string()]
        };

        Ok(self.store.del(&targets).await?)
    }

    /// Deletes an exact key or every key matching a pattern, returning whether
    /// the deletion went through
    pub async fn invalidate(&self, key_or_pattern: &str) -> bool {
        match self.try_invalidate(key_or_pattern).await {
            Ok(removed) => {
                tracing::debug!(target_key = %key_or_pattern, removed = removed, "Cache invalidated");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, target_key = %key_or_pattern, "Cache invalidation failed");
                false
            }
        }
    }

    /// Invalidates each key or pattern in order
    ///
    /// Every entry is attempted even if an earlier one fails. Returns `true`
    /// only if all of them succeeded.
    pub async fn invalidate_all<S: AsRef<str>>(&self, keys_or_patterns: &[S]) -> bool {
        let mut all_ok = true;
        for target in keys_or_patterns {
            all_ok &= self.invalidate(target.as_ref()).await;
        }
        all_ok
    }

    /// Read-through lookup
    ///
    /// Returns the cached value on a hit. On a miss, runs `compute`, stores a
    /// successful result with `ttl_secs` and returns it, even if the store write
    /// fails. Errors from `compute` are returned unchanged and not cached.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl_secs: u64,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get(key).await {
            return Ok(cached);
        }

        let value = compute().await?;
        self.put(key, &value, ttl_secs).await;
        Ok(value)
    }
}
