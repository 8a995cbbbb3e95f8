//! Crawler module for page fetching and crawl orchestration
//!
//! This module contains the core crawling logic, including:
//! - HTTP transport abstraction and the reqwest-backed implementation
//! - Rate limiting, retry with backoff and response caching
//! - Pagination and list-detail crawl orchestration

mod engine;
mod fetcher;
mod rate_limit;
mod retry;
mod transport;

pub use engine::{
    CrawlEngine, EngineOptions, ListDetailReport, ListDetailRequest, PaginationReport,
    PaginationRequest, UrlPredicate,
};
pub use fetcher::{FetchResult, Fetcher};
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
pub use transport::{build_http_client, Headers, HttpTransport, Transport, TransportResponse};

use crate::cache::ResponseCache;
use crate::config::{Config, CrawlJob};
use crate::extract::Record;
use crate::state::{CrawlFailure, CrawlStatus};
use crate::HarvestError;
use tokio_util::sync::CancellationToken;

/// Outcome of a crawl job of either mode
#[derive(Debug, Clone)]
pub enum JobReport {
    Pagination(PaginationReport),
    ListDetail(ListDetailReport),
}

impl JobReport {
    pub fn records(&self) -> &[Record] {
        match self {
            Self::Pagination(report) => &report.records,
            Self::ListDetail(report) => &report.records,
        }
    }

    pub fn failures(&self) -> &[CrawlFailure] {
        match self {
            Self::Pagination(report) => &report.failures,
            Self::ListDetail(report) => &report.failures,
        }
    }

    pub fn status(&self) -> CrawlStatus {
        match self {
            Self::Pagination(report) => report.status,
            Self::ListDetail(report) => report.status,
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            Self::Pagination(_) => "pagination",
            Self::ListDetail(_) => "list-detail",
        }
    }
}

/// Builds a crawl engine from a job configuration
///
/// # Arguments
///
/// * `config` - The validated job configuration
///
/// # Returns
///
/// * `Ok(CrawlEngine)` - Engine backed by a reqwest client
/// * `Err(HarvestError)` - Failed to build the HTTP client
pub fn build_engine(config: &Config) -> Result<CrawlEngine<HttpTransport>, HarvestError> {
    let fetch = &config.fetch;
    let transport = HttpTransport::with_user_agent(&fetch.user_agent)?;

    let cache = match fetch.cache_capacity {
        Some(capacity) => ResponseCache::with_capacity(capacity),
        None => ResponseCache::new(),
    };
    let retry = RetryPolicy::new(fetch.max_attempts, fetch.initial_delay(), fetch.backoff_factor)
        .with_retry_statuses(fetch.retry_statuses.iter().copied());

    let fetcher = Fetcher::new(transport)
        .with_cache(cache)
        .with_cache_ttl(fetch.cache_ttl())
        .with_rate_limiter(RateLimiter::new(fetch.requests_per_second))
        .with_retry_policy(retry);

    let options = EngineOptions {
        concurrency: config.engine.concurrency,
        boundary: config.engine.crawl_boundary(),
        headers: fetch.headers.clone(),
        timeout: fetch.timeout(),
        annotate_source: config.engine.annotate_source,
    };

    Ok(CrawlEngine::new(fetcher, options))
}

/// Runs the crawl a job configuration describes
///
/// This is the main entry point for a configured crawl. It will:
/// 1. Compile the job's URLs and selectors
/// 2. Build the HTTP client and engine
/// 3. Run the crawl in the configured mode until it completes or `cancel` fires
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `cancel` - Cancels the crawl; partial results are still returned
///
/// # Returns
///
/// * `Ok(JobReport)` - The crawl ran (check its status for seed failures)
/// * `Err(HarvestError)` - The job could not be started
pub async fn run_job(config: &Config, cancel: &CancellationToken) -> Result<JobReport, HarvestError> {
    let job = config.crawl.to_job()?;
    let engine = build_engine(config)?;
    Ok(run_with_engine(&engine, job, cancel).await)
}

/// Runs a compiled job on an existing engine
pub async fn run_with_engine<T: Transport + 'static>(
    engine: &CrawlEngine<T>,
    job: CrawlJob,
    cancel: &CancellationToken,
) -> JobReport {
    match job {
        CrawlJob::Pagination(request) => {
            JobReport::Pagination(engine.crawl_pagination(request, cancel).await)
        }
        CrawlJob::ListDetail(request) => {
            JobReport::ListDetail(engine.crawl_list_detail(request, cancel).await)
        }
    }
}
