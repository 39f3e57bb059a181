//! Request retry with exponential backoff
//!
//! **Algorithm:**
//! 1. Attempt operation
//! 2. If successful, return result
//! 3. If the error is retryable (network, timeout, 429, 5xx) and attempts remain:
//!    log, back off, retry
//! 4. Otherwise return the error (auth, not-found and invalid requests fail on
//!    the first attempt)
//!
//! **Backoff Strategy:**
//! - delay = min(base · 2^retry, max), plus up to 10% random jitter
//! - a server-provided `Retry-After` replaces the exponential delay (still capped)

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::services::ClientError;

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = no retries)
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Cap for any single delay
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms: max_delay_ms.max(base_delay_ms),
        }
    }

    /// Whether another attempt is allowed after `retry` retries have happened
    pub fn should_retry(&self, retry: u32, error: &ClientError) -> bool {
        retry < self.max_retries && error.is_retryable()
    }

    /// Delay before retry number `retry + 1`, without jitter
    pub fn base_delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let cap = Duration::from_millis(self.max_delay_ms);
        if let Some(hint) = retry_after {
            return hint.min(cap);
        }
        let exponential = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(retry));
        Duration::from_millis(exponential).min(cap)
    }

    /// Delay before retry number `retry + 1`, with up to 10% jitter, capped
    pub fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let base = self.base_delay_for(retry, retry_after);
        let jitter_span = (base.as_millis() as u64) / 10;
        let jitter = if jitter_span > 0 {
            rand::thread_rng().gen_range(0..=jitter_span)
        } else {
            0
        };
        (base + Duration::from_millis(jitter)).min(Duration::from_millis(self.max_delay_ms))
    }

    /// Run `operation` until it succeeds, fails permanently, or retries run out
    ///
    /// `on_retry` is invoked before each backoff sleep (used for metrics).
    /// Exhausting the retries on a retryable error yields
    /// [`ClientError::RetriesExhausted`] wrapping the last error.
    pub async fn execute<F, Fut, T, R>(
        &self,
        operation_name: &str,
        mut operation: F,
        mut on_retry: R,
    ) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
        R: FnMut(&ClientError),
    {
        let mut retry: u32 = 0;

        loop {
            match operation().await {
                Ok(value) => {
                    if retry > 0 {
                        tracing::debug!(
                            operation = operation_name,
                            attempt = retry + 1,
                            "Request succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !error.is_retryable() {
                        return Err(error);
                    }

                    if !self.should_retry(retry, &error) {
                        tracing::warn!(
                            operation = operation_name,
                            attempts = retry + 1,
                            error = %error,
                            "Request failed: retries exhausted"
                        );
                        return Err(ClientError::RetriesExhausted {
                            attempts: retry + 1,
                            last: Box::new(error),
                        });
                    }

                    let delay = self.delay_for(retry, error.retry_after());
                    tracing::warn!(
                        operation = operation_name,
                        attempt = retry + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient request failure, will retry after backoff"
                    );
                    on_retry(&error);

                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
            }
        }
    }
}
