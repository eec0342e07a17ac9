#![allow(dead_code)]

use std::sync::Arc;

use lapidary::common::{AppConfig, ManualClock};
use lapidary::query::QueryClient;
use tempfile::TempDir;

pub const TEST_USER_ID: i64 = 7;

pub fn test_config(base_url: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.base_url = base_url.to_string();
    config.request_timeout_ms = 500;
    config.retry.base_delay_ms = 1;
    config.retry.cap_ms = 4;
    config
}

/// Query client over a manual clock: 100ms staleness window, 10s GC
/// window, short backoff so paused-time tests finish instantly.
pub fn query_client() -> (QueryClient, Arc<ManualClock>) {
    let clock = ManualClock::new(0);
    let mut config = AppConfig::default();
    config.stale_after_ms = 100;
    config.cache_ttl_ms = 10_000;
    config.retry.base_delay_ms = 10;
    config.retry.cap_ms = 40;
    (QueryClient::new(&config, clock.clone()), clock)
}

pub fn setup_temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}
