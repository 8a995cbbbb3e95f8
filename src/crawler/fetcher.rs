//! Page fetcher
//!
//! This module turns a URL into a parsed [`Document`], including:
//! - Response cache lookups (a hit never touches the network or the rate limiter)
//! - Rate limiting of real requests
//! - Per-attempt timeouts and retry with backoff
//! - Status classification (non-2xx becomes a failure)
//!
//! Only successes are cached.

use super::rate_limit::RateLimiter;
use super::retry::RetryPolicy;
use super::transport::{Headers, Transport, TransportResponse};
use crate::cache::ResponseCache;
use crate::extract::Document;
use crate::FetchError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Rate limiter channel shared by every page request
const FETCH_CHANNEL: &str = "fetch";

/// Result of a fetch operation
#[derive(Debug, Clone)]
pub enum FetchResult {
    /// Successfully fetched and parsed the page
    Success {
        /// The parsed page; its URL is the final URL after redirects
        document: Arc<Document>,
        /// When the page was fetched from the network
        fetched_at: DateTime<Utc>,
    },

    /// The fetch failed after any retries
    Failure(FetchError),
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns the document of a successful fetch
    pub fn document(&self) -> Option<&Arc<Document>> {
        match self {
            Self::Success { document, .. } => Some(document),
            Self::Failure(_) => None,
        }
    }

    pub fn into_result(self) -> Result<Arc<Document>, FetchError> {
        match self {
            Self::Success { document, .. } => Ok(document),
            Self::Failure(err) => Err(err),
        }
    }
}

/// Fetches pages through a transport with caching, pacing and retries
///
/// A single fetcher is shared by every task of a crawl so that all requests
/// go through the same cache and rate limiter.
pub struct Fetcher<T> {
    transport: T,
    cache: ResponseCache,
    limiter: RateLimiter,
    retry: RetryPolicy,
    cache_ttl: Duration,
}

impl<T: Transport> Fetcher<T> {
    /// Creates a fetcher with an unbounded cache, one request per second
    /// and the default retry policy
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            cache: ResponseCache::new(),
            limiter: RateLimiter::default(),
            retry: RetryPolicy::default(),
            cache_ttl: Duration::from_secs(3600),
        }
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets how long successful fetches stay cached; zero disables caching
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Fetches a URL with full error handling and retry logic
    ///
    /// # Request Flow
    ///
    /// 1. Return the cached result for the URL, if any
    /// 2. Wait for the rate limiter
    /// 3. Issue the request, bounding each attempt by `timeout`, and retry
    ///    transient failures per the retry policy
    /// 4. Decode the body into a [`Document`] addressed by the final URL
    /// 5. Cache the success under the requested URL
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to fetch
    /// * `headers` - Extra request headers
    /// * `timeout` - Per-attempt timeout
    ///
    /// # Returns
    ///
    /// A FetchResult with the document or the failure
    pub async fn fetch(&self, url: &Url, headers: &Headers, timeout: Duration) -> FetchResult {
        if let Some(cached) = self.cache.get(url) {
            tracing::debug!("Cache hit for {}", url);
            return cached;
        }

        self.limiter.acquire(FETCH_CHANNEL).await;

        let outcome = self
            .retry
            .execute(|attempt| self.attempt(url, headers, timeout, attempt))
            .await;

        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!("Failed to fetch {}: {}", url, err);
                return FetchResult::Failure(err);
            }
        };

        let document = match Document::from_bytes(response.final_url, response.body) {
            Ok(document) => document,
            Err(err) => {
                tracing::warn!("Failed to decode {}: {}", url, err);
                return FetchResult::Failure(err);
            }
        };

        tracing::debug!("Fetched {} ({} bytes)", url, document.body().len());
        let result = FetchResult::Success {
            document: Arc::new(document),
            fetched_at: Utc::now(),
        };
        if !self.cache_ttl.is_zero() {
            self.cache.put(url, result.clone(), self.cache_ttl);
        }
        result
    }

    async fn attempt(
        &self,
        url: &Url,
        headers: &Headers,
        timeout: Duration,
        attempt: u32,
    ) -> Result<TransportResponse, FetchError> {
        tracing::debug!("GET {} (attempt {})", url, attempt);

        let response = match tokio::time::timeout(timeout, self.transport.get(url, headers, timeout))
            .await
        {
            Ok(result) => result?,
            Err(_) => return Err(FetchError::Timeout(timeout)),
        };

        if !(200..300).contains(&response.status) {
            return Err(FetchError::HttpStatus {
                status: response.status,
                url: response.final_url.to_string(),
            });
        }

        Ok(response)
    }
}
