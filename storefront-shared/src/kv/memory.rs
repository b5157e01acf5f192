/// In-memory key-value store
///
/// A process-local stand-in for Redis with the same observable semantics for the
/// commands in [`KvStore`]: integer increments, per-key TTLs, glob matching, and
/// expiry. Expired entries are dropped when touched, and every
/// [`SWEEP_INTERVAL`] writes the whole map is swept so that keys nobody reads
/// again do not accumulate. Expiry is measured with `tokio::time::Instant`, so tests running
/// under `tokio::time::pause()` can move past a TTL with `tokio::time::advance`.
///
/// # Example
///
/// ```
/// use storefront_shared::kv::{KvStore, MemoryStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::new();
/// store.set_ex("product:42", "{\"title\":\"X\"}", 300).await?;
/// assert_eq!(store.get("product:42").await?.as_deref(), Some("{\"title\":\"X\"}"));
/// # Ok(())
/// # }
/// ```

use super::{KvError, KvResult, KvStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Writes between two full sweeps of expired entries
pub const SWEEP_INTERVAL: usize = 256;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Process-local [`KvStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    /// Whether the store holds no live keys
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remaining time-to-live of a key, `None` if missing or persistent
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Drops every expired entry once per [`SWEEP_INTERVAL`] writes
    fn sweep_if_due(&self, entries: &mut HashMap<String, Entry>, now: Instant) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % SWEEP_INTERVAL == 0 {
            entries.retain(|_, entry| entry.is_live(now));
        }
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn incr(&self, key: &str) -> KvResult<i64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        self.sweep_if_due(&mut entries, now);

        let (current, expires_at) = match entries.get(key).filter(|entry| entry.is_live(now)) {
            Some(entry) => {
                let current = entry.value.parse::<i64>().map_err(|_| {
                    KvError::Command("value is not an integer or out of range".to_string())
                })?;
                (current, entry.expires_at)
            }
            None => (0, None),
        };

        let next = current
            .checked_add(1)
            .ok_or_else(|| KvError::Command("increment would overflow".to_string()))?;

        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );

        Ok(next)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> KvResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.expires_at = Some(now + Duration::from_secs(ttl_secs));
                Ok(true)
            }
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> KvResult<()> {
        if ttl_secs == 0 {
            return Err(KvError::Command("invalid expire time in 'set' command".to_string()));
        }

        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        self.sweep_if_due(&mut entries, now);

        let expires_at = now + Duration::from_secs(ttl_secs);
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> KvResult<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let removed = keys
            .iter()
            .filter_map(|key| entries.remove(key))
            .filter(|entry| entry.is_live(now))
            .count();

        Ok(removed as u64)
    }

    async fn keys(&self, pattern: &str) -> KvResult<Vec<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.is_live(now));

        let mut matched: Vec<String> = entries
            .keys()
            .filter(|key| glob_match(pattern.as_bytes(), key.as_bytes()))
            .cloned()
            .collect();
        matched.sort_unstable();

        Ok(matched)
    }

    async fn ping(&self) -> KvResult<bool> {
        Ok(true)
    }
}

/// Redis-style glob matching: `*`, `?`, `[abc]`, `[^a-z]` and `\` escapes
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((b'*', rest)) => (0..=text.len()).any(|skip| glob_match(rest, &text[skip..])),
        Some((b'?', rest)) => !text.is_empty() && glob_match(rest, &text[1..]),
        Some((b'[', rest)) => match (text.split_first(), class_match(rest)) {
            (Some((&ch, tail)), Some((matcher, after))) => {
                matcher(ch) && glob_match(after, tail)
            }
            // An unterminated class matches a literal '['
            (Some((&ch, tail)), None) => ch == b'[' && glob_match(rest, tail),
            (None, _) => false,
        },
        Some((b'\\', rest)) if !rest.is_empty() => {
            text.first() == Some(&rest[0]) && glob_match(&rest[1..], &text[1..])
        }
        Some((&literal, rest)) => text.first() == Some(&literal) && glob_match(rest, &text[1..]),
    }
}

/// Parses a `[...]` class body, returning a byte predicate and the pattern after `]`
fn class_match(body: &[u8]) -> Option<(impl Fn(u8) -> bool + '_, &[u8])> {
    let (negated, body) = match body.first() {
        Some(b'^') => (true, &body[1..]),
        _ => (false, body),
    };
    let end = body.iter().position(|&b| b == b']')?;
    let members = &body[..end];

    let matcher = move |ch: u8| {
        let mut hit = false;
        let mut i = 0;
        while i < members.len() {
            if i + 2 < members.len() && members[i + 1] == b'-' {
                let (lo, hi) = (members[i].min(members[i + 2]), members[i].max(members[i + 2]));
                hit |= (lo..=hi).contains(&ch);
                i += 3;
            } else {
                hit |= members[i] == ch;
                i += 1;
            }
        }
        hit != negated
    };

    Some((matcher, &body[end + 1..]))
}
