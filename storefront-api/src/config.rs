/// Configuration management for the API server
///
/// This module loads configuration from environment variables and provides
/// a type-safe configuration struct.
///
/// # Environment Variables
///
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `CORS_ORIGIN`: Comma-separated allowed origins, or `*` (default: *)
/// - `REDIS_URL`: Redis connection URL (required)
/// - `REDIS_CONNECTION_TIMEOUT_SECS`: Connection timeout (default: 5)
/// - `REDIS_COMMAND_TIMEOUT_SECS`: Per-command timeout (default: 2)
/// - `RATE_LIMIT_REQUESTS`: Requests per window (default: 10)
/// - `RATE_LIMIT_WINDOW_SECS`: Window length in seconds (default: 60)
/// - `RATE_LIMIT_RULES`: Per-route overrides as `prefix=limit/window`, comma
///   separated (default: `/api/auth=5/60`)
/// - `CACHE_DEFAULT_TTL_SECS`: TTL for cache writes without one (default: 3600)
/// - `RUST_LOG`: Log level (default: debug for storefront crates)
///
/// # Example
///
/// ```no_run
/// use storefront_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use anyhow::Context;
use std::env;
use std::str::FromStr;
use storefront_shared::cache::keys::DEFAULT_TTL_SECS;
use storefront_shared::kv::RedisConfig;
use storefront_shared::rate_limit::{RateLimitPolicy, DEFAULT_LIMIT, DEFAULT_WINDOW_SECS};

/// Rate limit overrides applied when `RATE_LIMIT_RULES` is unset
pub const DEFAULT_RATE_LIMIT_RULES: &str = "/api/auth=5/60";

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Redis configuration
    pub redis: RedisConfig,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,

    /// Response cache configuration
    pub cache: CacheConfig,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Allowed CORS origins; a single `*` allows any origin
    pub cors_origins: Vec<String>,
}

impl ApiConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|origin| origin == "*")
    }
}

/// Rate limit override for paths under a prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pub prefix: String,
    pub policy: RateLimitPolicy,
}

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Policy for paths without a matching rule
    pub default_policy: RateLimitPolicy,

    /// Per-prefix overrides
    pub rules: Vec<RouteRule>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_policy: RateLimitPolicy::default(),
            rules: parse_rules(DEFAULT_RATE_LIMIT_RULES).unwrap_or_default(),
        }
    }
}

impl RateLimitConfig {
    /// Selects the policy for a request path
    ///
    /// The longest rule prefix that matches on a path-segment boundary wins.
    pub fn policy_for(&self, path: &str) -> RateLimitPolicy {
        self.rules
            .iter()
            .filter(|rule| prefix_matches(&rule.prefix, path))
            .max_by_key(|rule| rule.prefix.len())
            .map(|rule| rule.policy)
            .unwrap_or(self.default_policy)
    }
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Parses `prefix=limit/window` rules separated by commas
///
/// # Errors
///
/// Returns an error for a malformed rule or a non-positive limit or window.
pub fn parse_rules(raw: &str) -> anyhow::Result<Vec<RouteRule>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| -> anyhow::Result<RouteRule> {
            let (prefix, rate) = entry
                .split_once('=')
                .with_context(|| format!("Rate limit rule {:?} is missing '='", entry))?;
            let (limit, window) = rate
                .split_once('/')
                .with_context(|| format!("Rate limit rule {:?} must be prefix=limit/window", entry))?;

            let prefix = prefix.trim();
            if !prefix.starts_with('/') {
                anyhow::bail!("Rate limit rule prefix {:?} must start with '/'", prefix);
            }

            let limit = limit
                .trim()
                .parse::<u32>()
                .with_context(|| format!("Invalid limit in rate limit rule {:?}", entry))?;
            let window = window
                .trim()
                .parse::<u64>()
                .with_context(|| format!("Invalid window in rate limit rule {:?}", entry))?;

            Ok(RouteRule {
                prefix: prefix.to_string(),
                policy: RateLimitPolicy::new(limit, window)?,
            })
        })
        .collect()
}

/// Response cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL in seconds for writes that do not choose one
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing
    /// - Environment variables have invalid values
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration through a variable lookup function
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&lookup, "API_PORT", 8080u16)?;

        let cors_origins: Vec<String> = lookup("CORS_ORIGIN")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();
        if cors_origins.is_empty() {
            anyhow::bail!("CORS_ORIGIN must name at least one origin");
        }

        let redis = RedisConfig::from_lookup(&lookup)?;

        let default_policy = RateLimitPolicy::new(
            parse_or(&lookup, "RATE_LIMIT_REQUESTS", DEFAULT_LIMIT)?,
            parse_or(&lookup, "RATE_LIMIT_WINDOW_SECS", DEFAULT_WINDOW_SECS)?,
        )?;
        let rules = parse_rules(
            &lookup("RATE_LIMIT_RULES").unwrap_or_else(|| DEFAULT_RATE_LIMIT_RULES.to_string()),
        )?;

        let default_ttl_secs = parse_or(&lookup, "CACHE_DEFAULT_TTL_SECS", DEFAULT_TTL_SECS)?;
        if default_ttl_secs == 0 {
            anyhow::bail!("CACHE_DEFAULT_TTL_SECS must be positive");
        }

        Ok(Self {
            api: ApiConfig {
                host,
                port,
                cors_origins,
            },
            redis,
            rate_limit: RateLimitConfig {
                default_policy,
                rules,
            },
            cache: CacheConfig { default_ttl_secs },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} has an invalid value: {:?}", name, raw)),
        None => Ok(default),
    }
}
