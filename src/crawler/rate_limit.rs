//! Request rate limiting
//!
//! Every outbound request passes through [`RateLimiter::acquire`]. Callers on
//! the same channel are granted start times at least `1 / rate` apart, no
//! matter how many tasks call concurrently.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Longest spacing a limiter will enforce between two grants
const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Paced admission of requests, keyed by channel
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum spacing between grants; `None` disables throttling
    interval: Option<Duration>,

    /// Last grant time per channel
    last_grant: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    /// Creates a limiter admitting `requests_per_second` requests per channel
    ///
    /// A non-positive or non-finite rate disables throttling. Rates below one
    /// request per day are paced at one request per day.
    pub fn new(requests_per_second: f64) -> Self {
        let interval = if requests_per_second.is_finite() && requests_per_second > 0.0 {
            Some(
                Duration::try_from_secs_f64(1.0 / requests_per_second)
                    .map_or(MAX_INTERVAL, |interval| interval.min(MAX_INTERVAL)),
            )
        } else {
            None
        };

        Self {
            interval,
            last_grant: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a limiter that never waits
    pub fn unlimited() -> Self {
        Self::new(0.0)
    }

    /// Minimum spacing between two grants on one channel
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Waits until the caller may issue a request on `channel`
    ///
    /// The slot is reserved before sleeping, so concurrent callers queue up
    /// behind each other instead of waking together.
    pub async fn acquire(&self, channel: &str) {
        let Some(interval) = self.interval else {
            return;
        };

        let grant_at = {
            let mut last_grant = self
                .last_grant
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let grant_at = match last_grant.get(channel) {
                Some(&previous) => previous
                    .checked_add(interval)
                    .unwrap_or(now + MAX_INTERVAL)
                    .max(now),
                None => now,
            };
            last_grant.insert(channel.to_string(), grant_at);
            grant_at
        };

        if grant_at > Instant::now() {
            tracing::trace!(
                "Rate limit on '{}': waiting {:?}",
                channel,
                grant_at - Instant::now()
            );
            tokio::time::sleep_until(grant_at).await;
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_sequential_acquires_are_spaced() {
        let limiter = RateLimiter::new(10.0);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire("fetch").await;
        }
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_is_immediate() {
        let limiter = RateLimiter::new(0.5);
        let start = Instant::now();
        limiter.acquire("fetch").await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquires_are_spaced() {
        let limiter = Arc::new(RateLimiter::new(2.0));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire("fetch").await;
                Instant::now()
            }));
        }

        let mut grants = Vec::new();
        for handle in handles {
            grants.push(handle.await.unwrap());
        }
        grants.sort();

        for pair in grants.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500));
        }
        assert!(start.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_channels_are_independent() {
        let limiter = RateLimiter::new(1.0);
        let start = Instant::now();
        limiter.acquire("a").await;
        limiter.acquire("b").await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tiny_rate_is_capped() {
        let limiter = RateLimiter::new(1e-19);
        assert_eq!(limiter.interval(), Some(MAX_INTERVAL));

        let start = Instant::now();
        limiter.acquire("fetch").await;
        limiter.acquire("fetch").await;
        assert_eq!(start.elapsed(), MAX_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_positive_rate_disables_throttling() {
        for rate in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            let limiter = RateLimiter::new(rate);
            assert!(limiter.interval().is_none());
            let start = Instant::now();
            for _ in 0..10 {
                limiter.acquire("fetch").await;
            }
            assert_eq!(start.elapsed(), Duration::ZERO);
        }
    }
}
