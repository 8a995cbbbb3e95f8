//! Retry with exponential backoff
//!
//! # Retry Logic
//!
//! | Condition | Action |
//! |-----------|--------|
//! | Transport failure | Retry with backoff |
//! | Timeout | Retry with backoff |
//! | HTTP status in `retry_statuses` | Retry with backoff |
//! | Any other HTTP status | Immediate failure |
//! | Parse failure | Immediate failure |
//!
//! The delay before attempt `n + 1` is `initial_delay * backoff_factor^(n - 1)`.

use crate::FetchError;
use std::future::Future;
use std::time::Duration;

/// How failed fetch attempts are retried
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first; 0 is treated as 1
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    pub initial_delay: Duration,

    /// Multiplier applied to the delay after every further failure
    pub backoff_factor: f64,

    /// HTTP statuses that count as transient
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            retry_statuses: Vec::new(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            initial_delay,
            backoff_factor,
            retry_statuses: Vec::new(),
        }
    }

    /// A policy that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    /// Marks HTTP statuses (e.g. 429, 503) as retryable
    pub fn with_retry_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retry_statuses = statuses.into_iter().collect();
        self
    }

    /// Returns true if another attempt may succeed after `error`
    pub fn is_retryable(&self, error: &FetchError) -> bool {
        match error {
            FetchError::Transport(_) | FetchError::Timeout(_) => true,
            FetchError::HttpStatus { status, .. } => self.retry_statuses.contains(status),
            FetchError::Parse(_)
            | FetchError::InvalidRequest(_)
            | FetchError::RetriesExhausted { .. } => false,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(self.initial_delay)
    }

    /// Runs `operation` until it succeeds, fails permanently, or attempts run out
    ///
    /// The operation receives the 1-based attempt number.
    ///
    /// # Returns
    ///
    /// * `Ok(T)` - An attempt succeeded
    /// * `Err(FetchError)` - A non-retryable failure, returned as is, or
    ///   `RetriesExhausted` wrapping the last retryable failure
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, FetchError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if !self.is_retryable(&err) => return Err(err),
                Err(err) if attempt >= max_attempts => {
                    return Err(FetchError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(err),
                    })
                }
                Err(err) => {
                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        "Attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt,
                        max_attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn transient() -> FetchError {
        FetchError::Transport("connection reset".to_string())
    }

    #[test]
    fn test_backoff_delays() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), 2.0);
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
    }

    #[test]
    fn test_retryable_classification() {
        let policy = RetryPolicy::default().with_retry_statuses([503]);
        assert!(policy.is_retryable(&transient()));
        assert!(policy.is_retryable(&FetchError::Timeout(Duration::from_secs(1))));
        assert!(policy.is_retryable(&FetchError::HttpStatus {
            status: 503,
            url: "https://example.com".to_string()
        }));
        assert!(!policy.is_retryable(&FetchError::HttpStatus {
            status: 404,
            url: "https://example.com".to_string()
        }));
        assert!(!policy.is_retryable(&FetchError::Parse("bad utf-8".to_string())));
        assert!(!policy.is_retryable(&FetchError::InvalidRequest("bad header".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_after_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), 2.0);
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<(), _> = policy
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s after the first failure, 2s after the second
        assert!(start.elapsed() >= Duration::from_secs(3));
        match result {
            Err(FetchError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(*last, transient());
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_is_not_retried() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), 2.0);
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<(), _> = policy
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(FetchError::HttpStatus {
                        status: 404,
                        url: "https://example.com/gone".to_string(),
                    })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(matches!(
            result,
            Err(FetchError::HttpStatus { status: 404, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failure() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), 2.0).with_retry_statuses([503]);

        let result = policy
            .execute(|attempt| async move {
                if attempt == 1 {
                    Err(FetchError::HttpStatus {
                        status: 503,
                        url: "https://example.com".to_string(),
                    })
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result, Ok(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_means_one() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1), 2.0);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(FetchError::RetriesExhausted { attempts: 1, .. })
        ));
    }
}
