mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lapidary::cache::TtlCache;
use lapidary::common::{ApiError, ManualClock};
use serde_json::{json, Value};

fn cache_with_clock() -> (TtlCache<Value>, Arc<ManualClock>) {
    let clock = ManualClock::new(0);
    (TtlCache::new(clock.clone()), clock)
}

#[test]
fn get_returns_value_within_ttl() {
    let (cache, clock) = cache_with_clock();

    cache.set("inventory-count", json!(42), Some(Duration::from_millis(5_000)));
    assert_eq!(cache.get("inventory-count"), Some(json!(42)));

    // Right up to the boundary the entry is still valid.
    clock.advance(Duration::from_millis(4_999));
    assert_eq!(cache.get("inventory-count"), Some(json!(42)));
}

#[test]
fn get_misses_once_ttl_elapses() {
    let (cache, clock) = cache_with_clock();

    cache.set("inventory-count", json!(42), Some(Duration::from_millis(5_000)));
    clock.advance(Duration::from_millis(6_000));

    assert_eq!(cache.get("inventory-count"), None);
    assert!(!cache.has("inventory-count"), "expired entry should be evicted");
}

#[test]
fn expired_read_evicts_and_allows_overwrite() {
    let (cache, clock) = cache_with_clock();

    cache.set("k", json!("old"), Some(Duration::from_millis(100)));
    clock.advance(Duration::from_millis(100));
    assert_eq!(cache.get("k"), None);

    cache.set("k", json!("new"), Some(Duration::from_millis(100)));
    assert_eq!(cache.get("k"), Some(json!("new")));
}

#[test]
fn default_ttl_applies_when_unspecified() {
    let (cache, clock) = cache_with_clock();

    cache.set("k", json!(1), None);
    clock.advance(Duration::from_secs(4 * 60));
    assert!(cache.has("k"), "entry should survive inside the default window");

    clock.advance(Duration::from_secs(2 * 60));
    assert!(!cache.has("k"), "entry should expire after the default window");
}

#[test]
fn clear_evicts_one_key_and_clear_all_everything() {
    let (cache, _clock) = cache_with_clock();

    cache.set("a", json!(1), None);
    cache.set("b", json!(2), None);

    cache.clear("a");
    assert!(!cache.has("a"));
    assert!(cache.has("b"));

    cache.set("a", json!(1), None);
    cache.clear_all();
    assert!(!cache.has("a"));
    assert!(!cache.has("b"));
}

#[test]
fn get_entry_reports_age() {
    let (cache, clock) = cache_with_clock();

    cache.set("k", json!(1), None);
    clock.advance(Duration::from_millis(250));

    let (_, age) = cache.get_entry("k").expect("entry should be present");
    assert_eq!(age, Duration::from_millis(250));
}

#[tokio::test]
async fn cached_call_skips_producer_on_hit() {
    let (cache, _clock) = cache_with_clock();
    let calls = AtomicU32::new(0);

    for _ in 0..2 {
        let value = cache
            .cached_call("k", Some(Duration::from_millis(5_000)), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(json!("produced")) }
            })
            .await
            .unwrap();
        assert_eq!(value, json!("produced"));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1, "second call should hit the cache");
}

#[tokio::test]
async fn cached_call_reinvokes_after_expiry() {
    let (cache, clock) = cache_with_clock();
    let calls = AtomicU32::new(0);

    for _ in 0..2 {
        cache
            .cached_call("k", Some(Duration::from_millis(1_000)), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(json!(1)) }
            })
            .await
            .unwrap();
        clock.advance(Duration::from_millis(1_500));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2, "expiry should re-invoke the producer");
}

#[tokio::test]
async fn cached_call_failure_caches_nothing() {
    let (cache, _clock) = cache_with_clock();

    let result = cache
        .cached_call("k", None, || async {
            Err(ApiError::Network("backend down".into()))
        })
        .await;

    assert!(matches!(result, Err(ApiError::Network(_))));
    assert!(!cache.has("k"), "failed producer must not populate the cache");

    // A later successful call fills the entry normally.
    let value = cache
        .cached_call("k", None, || async { Ok(json!(2)) })
        .await
        .unwrap();
    assert_eq!(value, json!(2));
    assert!(cache.has("k"));
}
