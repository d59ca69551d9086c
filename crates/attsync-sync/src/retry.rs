//! Retry policy for remote calls
//!
//! Exponential backoff with optional jitter. Which errors are worth another
//! attempt is decided by the policy's `retryable` predicate, which defaults
//! to [`RemoteError::is_transient`]. When the server sends a `Retry-After`
//! hint, the wait is the larger of the hint and the computed backoff, still
//! capped at `max_delay`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use attsync_core::config::RetryConfig;
use attsync_core::ports::RemoteError;
use rand::Rng as _;
use thiserror::Error;
use tracing::warn;

type RetryablePredicate = Arc<dyn Fn(&RemoteError) -> bool + Send + Sync>;

/// The final error of a retried operation and how many attempts were made
#[derive(Debug, Clone, Error)]
#[error("{error} (after {attempts} attempt(s))")]
pub struct RetryError {
    pub attempts: u32,
    #[source]
    pub error: RemoteError,
}

/// Explicit retry policy passed to the executor and engine
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
    retryable: RetryablePredicate,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("multiplier", &self.multiplier)
            .field("jitter", &self.jitter)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            multiplier: config.multiplier,
            jitter: config.jitter,
            retryable: Arc::new(RemoteError::is_transient),
        }
    }

    /// Replace the predicate that decides whether an error is retried
    pub fn with_retryable<F>(mut self, retryable: F) -> Self
    where
        F: Fn(&RemoteError) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(retryable);
        self
    }

    pub fn is_retryable(&self, error: &RemoteError) -> bool {
        (self.retryable)(error)
    }

    /// Backoff before retry number `retry` (0 = delay after the first failure)
    ///
    /// `min(base * multiplier^retry, max_delay)`, plus up to the same amount
    /// again when jitter is enabled, with the total capped at `max_delay`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = self.multiplier.max(1.0).powi(retry.min(i32::MAX as u32) as i32);
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        if base_ms == 0.0 {
            return Duration::ZERO;
        }
        let capped_ms = (base_ms * exp).min(max_ms);

        let total_ms = if self.jitter && capped_ms >= 1.0 {
            let jitter = rand::rng().random_range(0.0..=capped_ms);
            (capped_ms + jitter).min(max_ms)
        } else {
            capped_ms
        };
        Duration::from_millis(total_ms as u64)
    }

    /// Wait before retry number `retry` after `error`, honoring `Retry-After`
    pub fn delay_for(&self, retry: u32, error: &RemoteError) -> Duration {
        let backoff = self.backoff(retry);
        match error.retry_after() {
            Some(hint) => hint.max(backoff).min(self.max_delay),
            None => backoff,
        }
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempt budget is spent
    pub async fn run<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T, RetryError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !self.is_retryable(&error) || attempt >= self.max_attempts {
                return Err(RetryError {
                    attempts: attempt,
                    error,
                });
            }

            let delay = self.delay_for(attempt - 1, &error);
            warn!(
                operation = operation_name,
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient error, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
