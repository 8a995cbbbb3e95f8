/// Crawl outcome definitions
///
/// This module defines how a crawl ended and the failures it collected along
/// the way.
use crate::FetchError;
use serde::Serialize;
use std::fmt;
use url::Url;

/// Final status of one crawl invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    /// The crawl ran until a termination condition held
    Completed,

    /// The caller cancelled the crawl; results are partial
    Cancelled,

    /// The seed URL could not be fetched, so nothing could be crawled
    FatalSeedFailure,
}

impl CrawlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::FatalSeedFailure => "fatal_seed_failure",
        }
    }

    /// Returns true unless the seed fetch failed
    pub fn is_usable(&self) -> bool {
        !matches!(self, Self::FatalSeedFailure)
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a URL produced no records
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// The fetch failed (after any retries)
    Fetch(FetchError),

    /// The link leads outside the configured crawl boundary
    OutsideBoundary,

    /// The caller's URL predicate rejected the link
    Disallowed,

    /// The detail task ended without reporting a result
    Interrupted,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch(err) => err.kind().as_str(),
            Self::OutsideBoundary => "outside_boundary",
            Self::Disallowed => "disallowed",
            Self::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(err) => write!(f, "{}", err),
            Self::OutsideBoundary => f.write_str("link is outside the crawl boundary"),
            Self::Disallowed => f.write_str("link rejected by URL predicate"),
            Self::Interrupted => f.write_str("detail fetch ended without a result"),
        }
    }
}

/// A URL that was not turned into records, and why
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlFailure {
    pub url: Url,
    pub reason: FailureReason,
}

impl CrawlFailure {
    pub fn new(url: Url, reason: FailureReason) -> Self {
        Self { url, reason }
    }

    pub fn fetch(url: Url, error: FetchError) -> Self {
        Self::new(url, FailureReason::Fetch(error))
    }
}

impl fmt::Display for CrawlFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.url, self.reason)
    }
}

impl Serialize for CrawlFailure {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("CrawlFailure", 3)?;
        state.serialize_field("url", self.url.as_str())?;
        state.serialize_field("kind", self.reason.as_str())?;
        state.serialize_field("message", &self.reason.to_string())?;
        state.end()
    }
}
