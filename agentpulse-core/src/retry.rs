//! Retry execution with exponential backoff
//!
//! Transient delivery failures are retried on a doubling schedule:
//! `initial_delay * 2^(n-1)` before the n-th retry, capped at `max_delay`,
//! with no jitter. Permanent failures are never retried.

use std::time::Duration;

use crate::error::TransportError;

/// Backoff configuration for one category of operation.
///
/// `max_retries` counts retries after the initial attempt, so an
/// operation runs at most `max_retries + 1` times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry; doubles each retry after that
    pub initial_delay: Duration,

    /// Ceiling for the computed delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30000),
        }
    }
}

impl RetryPolicy {
    /// Delay before the `retry`-th retry (1-based).
    ///
    /// `min(initial_delay * 2^(retry-1), max_delay)`, with the exponent
    /// clamped so large retry counts cannot overflow.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(20);
        let multiplier = 2_u32.saturating_pow(exponent);
        let delay = self
            .initial_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay);
        std::cmp::min(delay, self.max_delay)
    }
}

impl From<&crate::config::CollectorConfig> for RetryPolicy {
    fn from(config: &crate::config::CollectorConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: config.initial_retry_delay(),
            max_delay: config.max_retry_delay(),
        }
    }
}

/// Stateless runner applying a [`RetryPolicy`] to async operations.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails permanently, or the retry
    /// budget is spent.
    pub async fn run<T, F, Fut>(&self, operation: F) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, TransportError>>,
    {
        self.run_with_observer(operation, |_, _| {}).await
    }

    /// Like [`run`](Self::run), invoking `on_retry(&error, attempt)` after
    /// each failed attempt that will be retried.
    ///
    /// `attempt` is the 1-based number of the attempt that just failed.
    /// The observer cannot alter control flow; it exists for logging and
    /// counting.
    pub async fn run_with_observer<T, F, Fut, O>(
        &self,
        mut operation: F,
        mut on_retry: O,
    ) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, TransportError>>,
        O: FnMut(&TransportError, u32),
    {
        let mut last_error: Option<TransportError> = None;

        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                let delay = self.delay_before_retry(attempt, last_error.as_ref());
                tracing::debug!(
                    attempt = attempt + 1,
                    total = self.policy.max_retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
            }

            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    if attempt >= self.policy.max_retries {
                        return Err(e);
                    }
                    tracing::warn!(error = %e, "Transient delivery failure");
                    on_retry(&e, attempt + 1);
                    last_error = Some(e);
                }
            }
        }

        // The final attempt always returns above; this satisfies the type.
        Err(last_error
            .unwrap_or_else(|| TransportError::network("retry budget exhausted")))
    }

    /// Rate-limit responses carry the server's own wait; use it verbatim
    /// when present, the backoff schedule otherwise.
    fn delay_before_retry(&self, retry: u32, error: Option<&TransportError>) -> Duration {
        if let Some(secs) = error.and_then(|e| e.retry_after_secs()) {
            return Duration::from_secs(secs);
        }
        self.policy.delay_for(retry)
    }
}
