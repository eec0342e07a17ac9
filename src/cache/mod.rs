//! In-memory TTL cache used to deduplicate identical reads within a window.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::common::{ApiError, Clock};

/// Default entry lifetime when the caller does not supply one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

struct Entry<V> {
    value: V,
    created_at_millis: u64,
    ttl: Duration,
}

impl<V> Entry<V> {
    fn age_at(&self, now_millis: u64) -> Duration {
        Duration::from_millis(now_millis.saturating_sub(self.created_at_millis))
    }

    fn is_expired_at(&self, now_millis: u64) -> bool {
        self.age_at(now_millis) >= self.ttl
    }
}

/// Key→value store with per-entry expiry.
///
/// Shared page-wide: any caller may overwrite any key, so correctness
/// rests on key collision-freedom rather than per-key ownership. Reads
/// of expired entries evict and report a miss.
pub struct TtlCache<V> {
    entries: DashMap<String, Entry<V>>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_default_ttl(clock, DEFAULT_TTL)
    }

    pub fn with_default_ttl(clock: Arc<dyn Clock>, default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            default_ttl,
        }
    }

    /// Returns the value if present and unexpired, evicting otherwise.
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_entry(key).map(|(value, _)| value)
    }

    /// Like [`get`](Self::get) but also reports the entry's age, which the
    /// query layer compares against its staleness window.
    pub fn get_entry(&self, key: &str) -> Option<(V, Duration)> {
        let now = self.clock.now_millis();

        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired_at(now) {
                return Some((entry.value.clone(), entry.age_at(now)));
            }
        } else {
            return None;
        }

        // Expired: evict outside the read guard.
        tracing::debug!(key, "evicting expired cache entry");
        self.entries.remove(key);
        None
    }

    /// Unconditionally overwrites, with the default TTL unless given one.
    pub fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                created_at_millis: self.clock.now_millis(),
                ttl: ttl.unwrap_or(self.default_ttl),
            },
        );
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Evicts one key.
    pub fn clear(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Evicts everything.
    pub fn clear_all(&self) {
        self.entries.clear();
    }

    /// Returns the cached value on a hit; otherwise runs `producer`,
    /// stores the result, and returns it.
    ///
    /// Concurrent calls for the same key are NOT deduplicated here: each
    /// runs its own producer and the last writer wins. Callers that need
    /// single-flight semantics go through the query layer instead. A
    /// failed producer caches nothing and the error propagates as-is.
    pub async fn cached_call<F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        producer: F,
    ) -> Result<V, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ApiError>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let value = producer().await?;
        self.set(key, value.clone(), ttl);
        Ok(value)
    }
}
