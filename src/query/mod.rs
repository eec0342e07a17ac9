//! Query/mutation layer: single-flight de-duplication, stale-while-revalidate,
//! retries, and write-driven invalidation on top of the TTL cache.

pub mod retry;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;

use crate::cache::TtlCache;
use crate::common::{ApiError, AppConfig, Clock};
use retry::{with_retry, RetryPolicy};

type FlightOutcome = Option<Result<Value, ApiError>>;

/// Per-key bookkeeping for ordering and de-duplication.
///
/// `issued` numbers every fetch opened for the key; `applied` is the floor
/// below which a completing fetch must not touch the cache. Together they
/// give last-issued-wins: a superseded response is discarded, never
/// aborted mid-flight. `open` counts flights that have not yet landed;
/// once it reaches zero with nothing in flight the whole entry is pruned,
/// so the registry only holds keys with live bookkeeping.
#[derive(Default)]
struct KeyState {
    issued: u64,
    applied: u64,
    open: u32,
    inflight: Option<(u64, watch::Receiver<FlightOutcome>)>,
}

impl KeyState {
    fn settled(&self) -> bool {
        self.open == 0 && self.inflight.is_none()
    }
}

/// Clears a leader's registration if its future is dropped before the
/// outcome is recorded (caller timeout, aborted task, unmount). Without
/// this a dead flight would keep collecting joiners that can never be
/// answered.
struct FlightGuard {
    keys: Arc<Mutex<HashMap<String, KeyState>>>,
    key: String,
    seq: u64,
    armed: bool,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut keys = self
            .keys
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(state) = keys.get_mut(&self.key) {
            state.open -= 1;
            if matches!(state.inflight, Some((seq, _)) if seq == self.seq) {
                state.inflight = None;
            }
            if state.settled() {
                keys.remove(&self.key);
            }
            tracing::debug!(key = %self.key, seq = self.seq, "flight dropped before completing");
        }
    }
}

/// A query result plus whether it was served past its staleness window
/// (in which case a background refetch is already underway).
#[derive(Debug, Clone)]
pub struct QueryOutcome<T> {
    pub value: T,
    pub stale: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    /// Disable for fetches that are not idempotent.
    pub retry: bool,
    /// Override the cache (GC) lifetime for this key.
    pub ttl: Option<Duration>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            retry: true,
            ttl: None,
        }
    }
}

enum Role {
    Joiner(watch::Receiver<FlightOutcome>),
    Leader {
        seq: u64,
        tx: watch::Sender<FlightOutcome>,
    },
}

/// Shared query client. Cheap to clone; all clones observe the same cache
/// and key registry.
#[derive(Clone)]
pub struct QueryClient {
    cache: Arc<TtlCache<Value>>,
    keys: Arc<Mutex<HashMap<String, KeyState>>>,
    read_retry: RetryPolicy,
    write_retry: RetryPolicy,
    stale_after: Duration,
}

impl QueryClient {
    pub fn new(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache: Arc::new(TtlCache::with_default_ttl(clock, config.cache_ttl())),
            keys: Arc::new(Mutex::new(HashMap::new())),
            read_retry: RetryPolicy::reads(&config.retry),
            write_retry: RetryPolicy::writes(&config.retry),
            stale_after: config.stale_after(),
        }
    }

    /// Raw cache handle, for callers that want plain `cached_call`
    /// semantics without de-duplication.
    pub fn cache(&self) -> &TtlCache<Value> {
        &self.cache
    }

    /// Read with the default options (retries on, default TTL).
    pub async fn query<F, Fut>(
        &self,
        key: &str,
        fetcher: F,
    ) -> Result<QueryOutcome<Value>, ApiError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
    {
        self.query_with(key, QueryOptions::default(), fetcher).await
    }

    /// Read through the cache.
    ///
    /// Fresh hit: returned as-is. Stale hit: returned immediately while a
    /// background refetch runs (stale-while-revalidate). Miss: at most one
    /// network call per key is in flight at a time; concurrent callers
    /// join it and share its outcome.
    pub async fn query_with<F, Fut>(
        &self,
        key: &str,
        options: QueryOptions,
        fetcher: F,
    ) -> Result<QueryOutcome<Value>, ApiError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
    {
        if let Some((value, age)) = self.cache.get_entry(key) {
            if age < self.stale_after {
                return Ok(QueryOutcome {
                    value,
                    stale: false,
                });
            }
            self.spawn_refresh(key, options, Arc::new(fetcher));
            return Ok(QueryOutcome { value, stale: true });
        }

        let value = self.fetch(key, options, Arc::new(fetcher)).await?;
        Ok(QueryOutcome {
            value,
            stale: false,
        })
    }

    /// Typed read: deserializes the cached payload at the edge.
    pub async fn query_as<T, F, Fut>(
        &self,
        key: &str,
        fetcher: F,
    ) -> Result<QueryOutcome<T>, ApiError>
    where
        T: DeserializeOwned,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
    {
        let outcome = self.query(key, fetcher).await?;
        let value =
            serde_json::from_value(outcome.value).map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(QueryOutcome {
            value,
            stale: outcome.stale,
        })
    }

    /// Executes a write (retrying a transient failure at most once by
    /// default) and, on success, invalidates the listed keys so the next
    /// read refetches instead of serving pre-write data.
    pub async fn mutate<T, F, Fut>(
        &self,
        invalidates: &[String],
        op: F,
    ) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let result = with_retry(self.write_retry, op).await?;
        for key in invalidates {
            self.invalidate(key);
        }
        Ok(result)
    }

    /// Drops the cached entry and supersedes any fetch already in flight
    /// for the key; the next read opens a fresh fetch.
    pub fn invalidate(&self, key: &str) {
        self.cache.clear(key);

        let mut keys = self.lock_keys();
        if let Some(state) = keys.get_mut(key) {
            state.applied = state.issued;
            state.inflight = None;
            if state.settled() {
                keys.remove(key);
            }
        }
        tracing::debug!(key, "invalidated");
    }

    /// Inbound change-feed hook: an external writer touched this key.
    pub fn on_external_change(&self, key: &str) {
        self.invalidate(key);
    }

    fn lock_keys(&self) -> MutexGuard<'_, HashMap<String, KeyState>> {
        // The registry is only ever locked for short, non-awaiting
        // sections, so a poisoned lock still holds consistent data.
        self.keys
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn spawn_refresh<F, Fut>(&self, key: &str, options: QueryOptions, fetcher: Arc<F>)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
    {
        let this = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            if let Err(err) = this.fetch(&key, options, fetcher).await {
                tracing::debug!(key = %key, error = %err, "background refresh failed");
            }
        });
    }

    /// Opens a flight for the key, or joins the one already running. A
    /// joiner whose leader is dropped before answering loops back and
    /// opens a fresh flight of its own.
    async fn fetch<F, Fut>(
        &self,
        key: &str,
        options: QueryOptions,
        fetcher: Arc<F>,
    ) -> Result<Value, ApiError>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<Value, ApiError>> + Send,
    {
        loop {
            let role = {
                let mut keys = self.lock_keys();
                let state = keys.entry(key.to_string()).or_default();
                if let Some((_, rx)) = &state.inflight {
                    Role::Joiner(rx.clone())
                } else {
                    state.issued += 1;
                    state.open += 1;
                    let (tx, rx) = watch::channel(None);
                    state.inflight = Some((state.issued, rx));
                    Role::Leader {
                        seq: state.issued,
                        tx,
                    }
                }
            };

            match role {
                Role::Joiner(mut rx) => {
                    loop {
                        if let Some(result) = rx.borrow_and_update().clone() {
                            return result;
                        }
                        if rx.changed().await.is_err() {
                            break;
                        }
                    }
                    // The leader went away without an outcome; retry.
                }
                Role::Leader { seq, tx } => {
                    let mut guard = FlightGuard {
                        keys: Arc::clone(&self.keys),
                        key: key.to_string(),
                        seq,
                        armed: true,
                    };
                    let policy = if options.retry {
                        self.read_retry
                    } else {
                        RetryPolicy::none()
                    };
                    let result = with_retry(policy, || fetcher()).await;

                    {
                        let mut keys = self.lock_keys();
                        if let Some(state) = keys.get_mut(key) {
                            state.open -= 1;
                            // Only close the flight if it is still ours; an
                            // invalidation may have opened a newer one.
                            if matches!(state.inflight, Some((s, _)) if s == seq) {
                                state.inflight = None;
                            }
                            if seq > state.applied {
                                state.applied = seq;
                                if let Ok(value) = &result {
                                    self.cache.set(key, value.clone(), options.ttl);
                                }
                            } else {
                                tracing::debug!(key, seq, "discarding superseded response");
                            }
                            if state.settled() {
                                keys.remove(key);
                            }
                        }
                    }
                    guard.armed = false;

                    // Joiners still receive the outcome even when the cache
                    // write was superseded; their request predates the change.
                    let _ = tx.send(Some(result.clone()));
                    return result;
                }
            }
        }
    }
}
