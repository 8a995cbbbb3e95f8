//! URL handling module for Harvest-Crawl
//!
//! This module provides URL normalization (the dedup and cache key), link
//! resolution against a page URL, and the crawl boundary that decides which
//! discovered links may be followed.

mod domain;
mod normalize;

pub use domain::{extract_domain, DomainPattern};
pub use normalize::{normalize_parsed, normalize_url};

use url::Url;

/// Which hosts a crawl may continue onto
///
/// Cross-domain continuation is allowed unless the caller restricts it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CrawlBoundary {
    /// Follow links to any host
    #[default]
    Any,
    /// Only follow links on the seed URL's host
    SameDomain,
    /// Only follow links whose host matches one of the patterns
    Domains(Vec<DomainPattern>),
}

impl CrawlBoundary {
    /// Returns true if `candidate` may be followed from a crawl seeded at `seed`
    ///
    /// # Examples
    ///
    /// ```
    /// use harvest_crawl::url::CrawlBoundary;
    /// use url::Url;
    ///
    /// let seed = Url::parse("https://books.example.com/").unwrap();
    /// let other = Url::parse("https://ads.example.net/x").unwrap();
    /// assert!(CrawlBoundary::Any.allows(&seed, &other));
    /// assert!(!CrawlBoundary::SameDomain.allows(&seed, &other));
    /// ```
    pub fn allows(&self, seed: &Url, candidate: &Url) -> bool {
        match self {
            Self::Any => true,
            Self::SameDomain => extract_domain(seed) == extract_domain(candidate),
            Self::Domains(patterns) => match extract_domain(candidate) {
                Some(domain) => patterns.iter().any(|p| p.matches(&domain)),
                None => false,
            },
        }
    }
}

/// Resolves a link href against a base URL
///
/// Returns None if the link should not be followed:
/// - empty or fragment-only hrefs
/// - javascript:, mailto:, tel: and data: links
/// - hrefs that fail to resolve or resolve to a non-HTTP(S) URL
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute) if absolute.scheme() == "http" || absolute.scheme() == "https" => {
            Some(absolute)
        }
        Ok(_) => None,
        Err(e) => {
            tracing::trace!("Could not resolve link {} against {}: {}", href, base_url, e);
            None
        }
    }
}
