//! Bounded retry for upstream lookups.

use std::time::Duration;

use tracing::warn;
use warden_abac::{LookupError, with_timeout};
use warden_config::RetryConfig;

/// Longest single backoff delay.
const MAX_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    exponential: bool,
    attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig, attempt_timeout: Duration) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            exponential: config.exponential_backoff,
            attempt_timeout,
        }
    }

    /// Single attempt, no delay.
    pub fn once(attempt_timeout: Duration) -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            exponential: false,
            attempt_timeout,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        if !self.exponential {
            return self.base_delay.min(MAX_DELAY);
        }
        let factor = 1u32.checked_shl(retry.min(16)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(MAX_DELAY)
    }

    /// Runs `op` until it succeeds or attempts run out, returning the last error.
    pub async fn run<T, F, Fut>(&self, service: &'static str, mut op: F) -> Result<T, LookupError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LookupError>>,
    {
        let mut retry = 0;
        loop {
            match with_timeout(service, self.attempt_timeout, op()).await {
                Ok(value) => return Ok(value),
                Err(e) if retry < self.max_retries => {
                    let delay = self.delay_for(retry);
                    warn!(service, attempt = retry + 1, delay_ms = delay.as_millis() as u64, error = %e, "lookup failed, retrying");
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
