/// Fixed-window rate limiting
///
/// Each (client, route) pair owns one counter in the key-value store under
/// `rate-limit:{client_id}:{route_id}`. A request increments the counter; the
/// increment that creates it (post-increment value 1) arms the expiry for the
/// window length. The expiry is never refreshed afterwards, so the window is
/// fixed from the first request and the counter disappears when it ends.
///
/// # Failure Policy
///
/// If the store cannot be reached the request is allowed (fail open). The
/// failure is logged and no remaining count is reported. When the expiry
/// cannot be armed on a new counter, the counter is deleted so that the client
/// is not locked out past the window.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use storefront_shared::kv::MemoryStore;
/// use storefront_shared::rate_limit::{RateLimitDecision, RateLimitPolicy, RateLimiter};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let limiter = RateLimiter::new(Arc::new(MemoryStore::new()));
/// let policy = RateLimitPolicy::new(5, 60).unwrap();
///
/// let decision = limiter.check("203.0.113.7", "/api/auth/login", policy).await;
/// assert_eq!(decision, RateLimitDecision::Allowed { limit: 5, remaining: Some(4) });
/// # }
/// ```

use crate::kv::KvStore;
use std::sync::Arc;
use thiserror::Error;

/// Prefix of every rate-limit counter key
pub const RATE_LIMIT_KEY_PREFIX: &str = "rate-limit";

/// Requests allowed per window when nothing else is configured
pub const DEFAULT_LIMIT: u32 = 10;

/// Window length in seconds when nothing else is configured
pub const DEFAULT_WINDOW_SECS: u64 = 60;

/// Rate limiting errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("Invalid rate limit policy: {0}")]
    InvalidPolicy(String),
}

/// Requests allowed per fixed window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    limit: u32,
    window_secs: u64,
}

impl RateLimitPolicy {
    /// Creates a policy, rejecting a zero limit or a zero-length window
    pub fn new(limit: u32, window_secs: u64) -> Result<Self, RateLimitError> {
        if limit == 0 {
            return Err(RateLimitError::InvalidPolicy(
                "limit must be positive".to_string(),
            ));
        }
        if window_secs == 0 {
            return Err(RateLimitError::InvalidPolicy(
                "window must be positive".to_string(),
            ));
        }
        Ok(Self { limit, window_secs })
    }

    /// Maximum requests per window
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Window length in seconds
    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window_secs: DEFAULT_WINDOW_SECS,
        }
    }
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// The request may proceed
    ///
    /// `remaining` is `None` when the store was unavailable and the check
    /// failed open.
    Allowed { limit: u32, remaining: Option<u32> },

    /// The request exceeded the limit for the current window
    Rejected { limit: u32, retry_after_secs: u64 },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

/// Builds the counter key for a client and route
pub fn rate_limit_key(client_id: &str, route_id: &str) -> String {
    format!("{}:{}:{}", RATE_LIMIT_KEY_PREFIX, client_id, route_id)
}

/// Fixed-window rate limiter over a shared key-value store
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KvStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Counts one request for `client_id` on `route_id` and decides whether it
    /// may proceed under `policy`
    ///
    /// Never fails: store errors produce an `Allowed` decision without a
    /// remaining count.
    pub async fn check(
        &self,
        client_id: &str,
        route_id: &str,
        policy: RateLimitPolicy,
    ) -> RateLimitDecision {
        let key = rate_limit_key(client_id, route_id);

        let count = match self.store.incr(&key).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    key = %key,
                    "Rate limit store unavailable, allowing request"
                );
                return RateLimitDecision::Allowed {
                    limit: policy.limit,
                    remaining: None,
                };
            }
        };

        if count == 1 {
            match self.store.expire(&key, policy.window_secs).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(key = %key, "Rate limit counter vanished before expiry was set");
                }
                Err(e) => {
                    tracing::error!(error = %e, key = %key, "Failed to arm rate limit window");
                    self.discard_counter(&key).await;
                }
            }
        }

        if count > i64::from(policy.limit) {
            tracing::debug!(
                client_id = %client_id,
                route_id = %route_id,
                count = count,
                limit = policy.limit,
                "Rate limit exceeded"
            );
            return RateLimitDecision::Rejected {
                limit: policy.limit,
                retry_after_secs: policy.window_secs,
            };
        }

        let remaining = (i64::from(policy.limit) - count).max(0);
        RateLimitDecision::Allowed {
            limit: policy.limit,
            remaining: Some(u32::try_from(remaining).unwrap_or(0)),
        }
    }

    /// Deletes a counter whose expiry could not be set
    ///
    /// A counter without a TTL would never reset, so the next request starts a
    /// fresh window instead.
    async fn discard_counter(&self, key: &str) {
        match self.store.del(&[key.to_string()]).await {
            Ok(_) => {
                tracing::warn!(key = %key, "Discarded rate limit counter without expiry");
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    key = %key,
                    "Failed to discard rate limit counter without expiry"
                );
            }
        }
    }
}
