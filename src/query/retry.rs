use std::future::Future;
use std::time::Duration;

use crate::common::{ApiError, RetryConfig};

/// Explicit retry policy: one shape, consumed by one helper.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, first try included. `1` means no retries.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
    pub cap: Duration,
}

impl RetryPolicy {
    pub fn reads(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.read_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier.max(1),
            cap: Duration::from_millis(config.cap_ms),
        }
    }

    pub fn writes(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.write_attempts.max(1),
            ..Self::reads(config)
        }
    }

    /// Single attempt, for fetches marked non-idempotent.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            multiplier: 1,
            cap: Duration::ZERO,
        }
    }

    /// Backoff before the next try, after `failures` failed attempts.
    fn delay_after(&self, failures: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(failures.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .map(|d| d.min(self.cap))
            .unwrap_or(self.cap)
    }
}

/// Runs `op`, retrying transient failures per `policy`.
///
/// Non-transient errors (4xx, decode failures) surface immediately.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut failures = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && failures + 1 < policy.max_attempts => {
                failures += 1;
                let delay = policy.delay_after(failures);
                tracing::debug!(
                    failures,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
