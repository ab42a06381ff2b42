//! Bounded exponential-backoff retry for unreliable external calls.
//!
//! The caller only retries; it never invents a result. Once the attempts are
//! spent the last error is returned and the caller decides on a fallback.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::RetrySettings;
use crate::error::CoachResult;

#[derive(Debug, Clone)]
pub struct RetryableCaller {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryableCaller {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(settings.max_attempts, settings.base_delay())
    }

    /// Delay slept after the failed attempt with index `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    pub async fn call<T, F, Fut>(&self, label: &str, mut operation: F) -> CoachResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CoachResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(label, attempts = attempt + 1, "call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt + 1 < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        label,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying external call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryableCaller {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}
