use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Retry tuning consumed by the query layer's single retry helper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts for read queries (first try included).
    pub read_attempts: u32,
    /// Total attempts for mutations (first try included).
    pub write_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: u32,
    pub cap_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            read_attempts: 3,
            write_attempts: 2,
            base_delay_ms: 250,
            multiplier: 2,
            cap_ms: 2_000,
        }
    }
}

/// Static identity used when the embedded bridge is absent.
///
/// The CLI's path into the system; also the provider's deterministic
/// fallback when the host never answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackAuth {
    pub bearer: String,
    pub user_id: i64,
    pub name: String,
    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_locale() -> String {
    "en".to_string()
}

/// Client configuration, layered: defaults, then an optional TOML file,
/// then `LAPIDARY_`-prefixed environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub resolve_timeout_ms: u64,
    /// Garbage-collection window: how long an entry stays in memory.
    pub cache_ttl_ms: u64,
    /// Staleness window: age after which a read triggers a background refetch.
    pub stale_after_ms: u64,
    /// Route a failed gate redirects to.
    pub fallback_route: String,
    pub retry: RetryConfig,
    pub fallback: Option<FallbackAuth>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout_ms: 8_000,
            resolve_timeout_ms: 3_000,
            cache_ttl_ms: 5 * 60 * 1_000,
            stale_after_ms: 60_000,
            fallback_route: "/".to_string(),
            retry: RetryConfig::default(),
            fallback: None,
        }
    }
}

impl AppConfig {
    /// Load config, optionally merging a TOML file on top of defaults.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed("LAPIDARY_").split("__"))
            .extract()
            .context("invalid configuration")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }
}
