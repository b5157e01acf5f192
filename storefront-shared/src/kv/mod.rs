/// Key-value store abstraction shared by the rate limiter and the response cache
///
/// Both components talk to the store exclusively through the [`KvStore`] trait,
/// so they can be wired to Redis in production and to [`MemoryStore`] in tests.
/// A single store handle is created at startup and passed to every component
/// that needs it.
///
/// # Implementations
///
/// - [`RedisClient`]: Redis via a multiplexed `ConnectionManager`, every command
///   bounded by the configured command timeout
/// - [`MemoryStore`]: in-process map with TTLs measured on the tokio clock
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use storefront_shared::kv::{KvStore, RedisClient, RedisConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RedisClient::new(RedisConfig::from_env()?).await?;
/// let store: Arc<dyn KvStore> = Arc::new(client);
///
/// let count = store.incr("rate-limit:10.0.0.1:/api/products").await?;
/// if count == 1 {
///     store.expire("rate-limit:10.0.0.1:/api/products", 60).await?;
/// }
/// # Ok(())
/// # }
/// ```

pub mod client;
pub mod memory;

pub use client::{RedisClient, RedisConfig};
pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a key-value store
///
/// Callers in this crate never surface these to clients: the rate limiter fails
/// open and the cache degrades to a miss.
#[derive(Error, Debug)]
pub enum KvError {
    /// The store could not be reached (connection refused, reset, DNS, ...)
    #[error("Key-value store unavailable: {0}")]
    Unavailable(String),

    /// A command did not complete within the command timeout
    #[error("Key-value command {command} timed out after {timeout_secs}s")]
    Timeout {
        command: &'static str,
        timeout_secs: u64,
    },

    /// The store rejected or failed a command
    #[error("Key-value command error: {0}")]
    Command(String),

    /// Invalid store configuration
    #[error("Key-value configuration error: {0}")]
    Config(String),
}

/// Result alias for store operations
pub type KvResult<T> = Result<T, KvError>;

/// Operations the rate limiter and the cache need from the store
///
/// Single-key operations must be atomic. Multi-key operations (`keys` followed
/// by `del`) are not expected to be transactional.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Atomically increments the integer at `key`, creating it at 1 if absent
    async fn incr(&self, key: &str) -> KvResult<i64>;

    /// Sets a time-to-live on an existing key
    ///
    /// Returns `false` if the key does not exist.
    async fn expire(&self, key: &str, ttl_secs: u64) -> KvResult<bool>;

    /// Reads a string value
    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    /// Writes a string value that expires after `ttl_secs`
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> KvResult<()>;

    /// Deletes the given keys in one batch, returning how many existed
    async fn del(&self, keys: &[String]) -> KvResult<u64>;

    /// Lists the keys matching a glob-style pattern (`*`, `?`, `[...]`)
    async fn keys(&self, pattern: &str) -> KvResult<Vec<String>>;

    /// Health check
    async fn ping(&self) -> KvResult<bool>;
}

/// Store that fails every command, for exercising degraded paths
#[cfg(test)]
pub(crate) struct UnavailableStore;

#[cfg(test)]
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
        Err(KvError::Timeout {
            command: "SET",
            timeout_secs: 2,
        })
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
