use url::Url;

/// Extracts the lowercase host of a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use harvest_crawl::url::extract_domain;
///
/// let url = Url::parse("https://Books.Example.COM/catalogue").unwrap();
/// assert_eq!(extract_domain(&url), Some("books.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// A domain pattern, either exact (`example.com`) or wildcard (`*.example.com`)
///
/// A wildcard pattern matches the bare domain and any subdomain of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainPattern {
    base: String,
    wildcard: bool,
}

impl DomainPattern {
    /// Parses a pattern; the input is lowercased
    pub fn parse(pattern: &str) -> Self {
        let pattern = pattern.trim().to_lowercase();
        match pattern.strip_prefix("*.") {
            Some(base) => Self {
                base: base.to_string(),
                wildcard: true,
            },
            None => Self {
                base: pattern,
                wildcard: false,
            },
        }
    }

    /// Returns true if `domain` (already lowercase) matches this pattern
    pub fn matches(&self, domain: &str) -> bool {
        if domain == self.base {
            return true;
        }
        self.wildcard
            && domain.len() > self.base.len()
            && domain.ends_with(&self.base)
            && domain.as_bytes()[domain.len() - self.base.len() - 1] == b'.'
    }
}

impl std::fmt::Display for DomainPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.wildcard {
            write!(f, "*.{}", self.base)
        } else {
            f.write_str(&self.base)
        }
    }
}
