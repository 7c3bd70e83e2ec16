use std::future::Future;
use std::time::Duration;

use crate::error::AppResult;

/// Exponential backoff settings for a single API call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries, used by tests and fakes.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// delay = initial_delay * multiplier^attempt, capped at max_delay
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exp);
        let delay = Duration::from_millis(delay_ms.min(u64::MAX as f64) as u64);
        delay.min(self.max_delay)
    }
}

/// Runs `operation` until it succeeds, returns a non-retryable error, or
/// `max_attempts` is exhausted. The last error is returned in that case.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    what: &str,
    mut operation: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    log::info!("{what} succeeded after {} attempts", attempt + 1);
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                log::warn!(
                    "{what} failed (attempt {}/{}), retrying in {}ms: {}",
                    attempt + 1,
                    max_attempts,
                    delay.as_millis(),
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    log::error!("{what} failed after {max_attempts} attempts: {e}");
                }
                return Err(e);
            }
        }
    }
}
