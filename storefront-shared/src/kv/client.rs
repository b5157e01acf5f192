/// Redis-backed key-value store
///
/// Wraps `redis::aio::ConnectionManager`, which multiplexes commands over one
/// connection and reconnects on its own after a drop. Every command is bounded
/// by `command_timeout_secs`; an expired timeout is reported as
/// [`KvError::Timeout`] and handled by callers like any other store failure.
///
/// Pattern enumeration uses `SCAN ... MATCH` rather than `KEYS` so that large
/// keyspaces do not block the server.
///
/// The connection is established on first use when Redis is down at startup
/// ([`RedisClient::connect_or_defer`]). Until a connection succeeds every
/// command fails with [`KvError::Unavailable`] or [`KvError::Timeout`], and the
/// next command tries again.
///
/// # Example
///
/// ```no_run
/// use storefront_shared::kv::{KvStore, RedisClient, RedisConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RedisConfig::from_env()?;
/// let client = RedisClient::new(config).await?;
///
/// let healthy = client.ping().await?;
/// println!("Redis healthy: {}", healthy);
/// # Ok(())
/// # }
/// ```

use super::{KvError, KvResult, KvStore};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Cmd, FromRedisValue, RedisError};
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Number of keys requested per SCAN round-trip
const SCAN_BATCH: usize = 250;

impl From<RedisError> for KvError {
    fn from(err: RedisError) -> Self {
        if err.is_timeout() {
            return KvError::Unavailable(format!("IO timeout: {}", err));
        }
        if err.is_connection_refusal() || err.is_connection_dropped() {
            return KvError::Unavailable(format!("Connection lost: {}", err));
        }
        match err.kind() {
            redis::ErrorKind::IoError => KvError::Unavailable(format!("IO error: {}", err)),
            redis::ErrorKind::ResponseError => {
                KvError::Command(format!("Response error: {}", err))
            }
            _ => KvError::Command(err.to_string()),
        }
    }
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    ///
    /// Format: redis://[username:password@]host:port[/db]
    pub url: String,

    /// Time allowed for the initial connection, in seconds
    pub connection_timeout_secs: u64,

    /// Time allowed for each command, in seconds
    pub command_timeout_secs: u64,
}

impl RedisConfig {
    /// Loads the configuration from environment variables
    ///
    /// # Environment Variables
    ///
    /// - `REDIS_URL`: Redis connection URL (required)
    /// - `REDIS_CONNECTION_TIMEOUT_SECS`: Connection timeout (default: 5)
    /// - `REDIS_COMMAND_TIMEOUT_SECS`: Per-command timeout (default: 2)
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Config`] if `REDIS_URL` is missing or a timeout is not
    /// a positive integer.
    pub fn from_env() -> KvResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads the configuration through a variable lookup function
    ///
    /// Reads the same variables as [`RedisConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> KvResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("REDIS_URL").ok_or_else(|| {
            KvError::Config("REDIS_URL environment variable is required".to_string())
        })?;

        Ok(Self {
            url,
            connection_timeout_secs: secs_from(&lookup, "REDIS_CONNECTION_TIMEOUT_SECS", 5)?,
            command_timeout_secs: secs_from(&lookup, "REDIS_COMMAND_TIMEOUT_SECS", 2)?,
        })
    }

    /// Creates a configuration pointing at a local Redis with default timeouts
    pub fn local() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connection_timeout_secs: 5,
            command_timeout_secs: 2,
        }
    }
}

fn secs_from<F>(lookup: &F, name: &str, default: u64) -> KvResult<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(secs),
            _ => Err(KvError::Config(format!(
                "{} must be a positive integer, got {:?}",
                name, raw
            ))),
        },
        None => Ok(default),
    }
}

/// Redis store handle
///
/// Cheap to clone; all clones share the same multiplexed connection.
#[derive(Clone)]
pub struct RedisClient {
    client: Client,
    manager: Arc<OnceCell<ConnectionManager>>,
    config: Arc<RedisConfig>,
}

impl RedisClient {
    /// Connects to Redis
    ///
    /// # Errors
    ///
    /// - [`KvError::Config`] if the URL is invalid
    /// - [`KvError::Unavailable`] if the connection fails
    /// - [`KvError::Timeout`] if the connection is not established in time
    pub async fn new(config: RedisConfig) -> KvResult<Self> {
        let client = Self::lazy(config)?;
        client.connection().await?;
        Ok(client)
    }

    /// Creates a client that connects on its first command
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Config`] if the URL is invalid.
    pub fn lazy(config: RedisConfig) -> KvResult<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| KvError::Config(format!("Invalid Redis URL: {}", e)))?;

        Ok(Self {
            client,
            manager: Arc::new(OnceCell::new()),
            config: Arc::new(config),
        })
    }

    /// Connects to Redis, deferring the connection if the server is unreachable
    ///
    /// Only an invalid configuration is an error; an unreachable server is
    /// logged and retried on the next command.
    pub async fn connect_or_defer(config: RedisConfig) -> KvResult<Self> {
        let client = Self::lazy(config)?;
        if let Err(e) = client.connection().await {
            tracing::warn!(
                error = %e,
                url = %sanitize_url(&client.config.url),
                "Redis unavailable at startup, will connect on first use"
            );
        }
        Ok(client)
    }

    /// Gets the Redis configuration
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Whether a connection has been established
    pub fn is_connected(&self) -> bool {
        self.manager.initialized()
    }

    /// Returns the shared connection, opening it if needed
    ///
    /// A failed attempt leaves the client unconnected so the next call retries.
    async fn connection(&self) -> KvResult<ConnectionManager> {
        let manager = self
            .manager
            .get_or_try_init(|| open_connection(self.client.clone(), &self.config))
            .await?;
        Ok(manager.clone())
    }

    /// Runs one command on the shared connection, bounded by the command timeout
    async fn query<T: FromRedisValue>(&self, command: &'static str, cmd: &Cmd) -> KvResult<T> {
        let mut conn = self.connection().await?;
        let timeout_secs = self.config.command_timeout_secs;

        match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            cmd.query_async::<_, T>(&mut conn),
        )
        .await
        {
            Ok(result) => result.map_err(KvError::from),
            Err(_) => Err(KvError::Timeout {
                command,
                timeout_secs,
            }),
        }
    }
}

async fn open_connection(client: Client, config: &RedisConfig) -> KvResult<ConnectionManager> {
    let manager = tokio::time::timeout(
        Duration::from_secs(config.connection_timeout_secs),
        ConnectionManager::new(client),
    )
    .await
    .map_err(|_| KvError::Timeout {
        command: "CONNECT",
        timeout_secs: config.connection_timeout_secs,
    })?
    .map_err(|e| KvError::Unavailable(format!("Failed to connect to Redis: {}", e)))?;

    tracing::info!(url = %sanitize_url(&config.url), "Redis client connected");
    Ok(manager)
}

#[async_trait]
impl KvStore for RedisClient {
    async fn incr(&self, key: &str) -> KvResult<i64> {
        let mut cmd = redis::cmd("INCR");
        cmd.arg(key);
        self.query("INCR", &cmd).await
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> KvResult<bool> {
        let mut cmd = redis::cmd("EXPIRE");
        cmd.arg(key).arg(ttl_secs);
        let applied: i64 = self.query("EXPIRE", &cmd).await?;
        Ok(applied == 1)
    }

    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.query("GET", &cmd).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> KvResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("EX").arg(ttl_secs);
        let _: () = self.query("SET", &cmd).await?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> KvResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("DEL");
        cmd.arg(keys);
        let removed: i64 = self.query("DEL", &cmd).await?;
        Ok(removed.max(0) as u64)
    }

    async fn keys(&self, pattern: &str) -> KvResult<Vec<String>> {
        let mut found = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH);
            let (next, batch): (u64, Vec<String>) = self.query("SCAN", &cmd).await?;
            found.extend(batch);

            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once across iterations
        found.sort_unstable();
        found.dedup();
        Ok(found)
    }

    async fn ping(&self) -> KvResult<bool> {
        let cmd = redis::cmd("PING");
        let pong: String = self.query("PING", &cmd).await?;
        if pong != "PONG" {
            tracing::warn!(response = %pong, "Unexpected PING response");
        }
        Ok(pong == "PONG")
    }
}

/// Replaces credentials in a Redis URL with `***:***` for logging
fn sanitize_url(url: &str) -> String {
    if let (Some(at_pos), Some(scheme_end)) = (url.rfind('@'), url.find("://")) {
        if at_pos > scheme_end {
            return format!("{}***:***@{}", &url[..scheme_end + 3], &url[at_pos + 1..]);
        }
    }
    url.to_string()
}
