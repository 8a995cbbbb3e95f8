//! Harvest-Crawl: a polite structured-data harvester
//!
//! This crate turns a starting URL plus an extraction schema into a bounded
//! sequence of fetch, extract and follow-link cycles. Requests are rate
//! limited, retried with backoff and cached, and every partial failure is
//! reported back to the caller instead of aborting the crawl.

pub mod cache;
pub mod config;
pub mod crawler;
pub mod extract;
pub mod output;
pub mod state;
pub mod url;

use std::time::Duration;
use thiserror::Error;

/// Main error type for Harvest-Crawl operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid selector in config: {0}")]
    InvalidSelector(String),
}

/// URL-specific errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Failure of a single fetch, as seen by the crawl engine
///
/// Transport and timeout failures are retryable. HTTP status failures are
/// retryable only when the retry policy lists the status. Parse failures and
/// invalid requests never are.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("failed to parse response body: {0}")]
    Parse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<FetchError> },
}

/// Coarse classification of a [`FetchError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Transport,
    Timeout,
    HttpStatus,
    Parse,
    InvalidRequest,
    RetriesExhausted,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::HttpStatus => "http_status",
            Self::Parse => "parse",
            Self::InvalidRequest => "invalid_request",
            Self::RetriesExhausted => "retries_exhausted",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FetchError {
    /// Returns the classification of this failure
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transport(_) => FailureKind::Transport,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::HttpStatus { .. } => FailureKind::HttpStatus,
            Self::Parse(_) => FailureKind::Parse,
            Self::InvalidRequest(_) => FailureKind::InvalidRequest,
            Self::RetriesExhausted { .. } => FailureKind::RetriesExhausted,
        }
    }

    /// Returns the innermost failure, looking through `RetriesExhausted`
    pub fn root_cause(&self) -> &FetchError {
        match self {
            Self::RetriesExhausted { last, .. } => last.root_cause(),
            other => other,
        }
    }
}

/// Result type alias for Harvest-Crawl operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlEngine, FetchResult, Fetcher};
pub use extract::{extract, FieldSchema, FieldValue, Record};
pub use state::CrawlStatus;
pub use self::url::{extract_domain, normalize_url};
