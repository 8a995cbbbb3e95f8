use crate::UrlError;
use url::Url;

/// Query parameters that only carry tracking data and never change content
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid"];

/// Normalizes a URL into its dedup/cache key form
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject anything but `http` and `https`
/// 3. Lowercase the host (the `url` crate also drops default ports)
/// 4. Normalize path:
///    - Remove dot segments (. and ..)
///    - Collapse repeated slashes
///    - Remove trailing slash (except for root /)
/// 5. Remove fragment
/// 6. Remove tracking query parameters
/// 7. Sort remaining query parameters by key, then value
/// 8. Remove empty query string (trailing ?)
///
/// The result is idempotent: normalizing a normalized URL returns it unchanged.
///
/// # Examples
///
/// ```
/// use harvest_crawl::url::normalize_url;
///
/// let url = normalize_url("http://EXAMPLE.COM/page/?b=2&a=1#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/page?a=1&b=2");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize_parsed(url)
}

/// Normalizes an already parsed URL, see [`normalize_url`]
pub fn normalize_parsed(mut url: Url) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .map(|h| h.to_lowercase())
        .ok_or(UrlError::MissingDomain)?;
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort();
    params
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
