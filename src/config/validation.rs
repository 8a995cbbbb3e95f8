use crate::config::types::{
    compile_selector, parse_url, BoundaryMode, Config, CrawlConfig, EngineConfig, FetchConfig,
};
use crate::ConfigError;
use reqwest::header::{HeaderName, HeaderValue};

/// Upper bound on detail fetches in flight
const MAX_CONCURRENCY: usize = 100;

/// Slowest pacing a job may ask for (one request every 1000 seconds)
const MIN_REQUESTS_PER_SECOND: f64 = 0.001;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_fetch_config(&config.fetch)?;
    validate_engine_config(&config.engine)?;
    validate_crawl_config(&config.crawl)?;
    Ok(())
}

/// Validates request behavior
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if !config.requests_per_second.is_finite() || config.requests_per_second < 0.0 {
        return Err(ConfigError::Validation(format!(
            "requests_per_second must be a non-negative number, got {}",
            config.requests_per_second
        )));
    }

    if config.requests_per_second > 0.0 && config.requests_per_second < MIN_REQUESTS_PER_SECOND {
        return Err(ConfigError::Validation(format!(
            "requests_per_second must be 0 (unthrottled) or at least {}, got {}",
            MIN_REQUESTS_PER_SECOND, config.requests_per_second
        )));
    }

    if !config.timeout_secs.is_finite() || config.timeout_secs <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "timeout_secs must be positive, got {}",
            config.timeout_secs
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if !config.backoff_factor.is_finite() || config.backoff_factor < 1.0 {
        return Err(ConfigError::Validation(format!(
            "backoff_factor must be >= 1.0, got {}",
            config.backoff_factor
        )));
    }

    for status in &config.retry_statuses {
        if !(100..=599).contains(status) {
            return Err(ConfigError::Validation(format!(
                "retry_statuses contains invalid HTTP status {}",
                status
            )));
        }
    }

    if config.cache_capacity == Some(0) {
        return Err(ConfigError::Validation(
            "cache_capacity must be >= 1 when set".to_string(),
        ));
    }

    for (name, value) in &config.headers {
        HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            ConfigError::Validation(format!("Invalid header name '{}'", name))
        })?;
        HeaderValue::from_str(value).map_err(|_| {
            ConfigError::Validation(format!("Invalid value for header '{}'", name))
        })?;
    }

    Ok(())
}

/// Validates engine behavior
fn validate_engine_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > MAX_CONCURRENCY {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and {}, got {}",
            MAX_CONCURRENCY, config.concurrency
        )));
    }

    if config.boundary == BoundaryMode::Domains && config.allowed_domains.is_empty() {
        return Err(ConfigError::Validation(
            "boundary \"domains\" requires at least one allowed-domains entry".to_string(),
        ));
    }

    for pattern in &config.allowed_domains {
        validate_domain_pattern(pattern)?;
    }

    Ok(())
}

/// Validates the crawl definition and compiles its selectors
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    parse_url(config.seed_url())?;

    match config {
        CrawlConfig::Pagination {
            next_selector,
            max_pages,
            ..
        } => {
            if *max_pages < 1 {
                return Err(ConfigError::Validation(format!(
                    "max_pages must be >= 1, got {}",
                    max_pages
                )));
            }
            compile_selector(next_selector)?;
        }
        CrawlConfig::ListDetail {
            item_selector,
            link_selector,
            max_items,
            ..
        } => {
            if *max_items < 1 {
                return Err(ConfigError::Validation(format!(
                    "max_items must be >= 1, got {}",
                    max_items
                )));
            }
            compile_selector(item_selector)?;
            compile_selector(link_selector)?;
        }
    }

    config.schema().compile()?;
    Ok(())
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    match pattern.strip_prefix("*.") {
        Some(domain) => validate_domain_string(domain),
        None => validate_domain_string(pattern),
    }
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    Ok(())
}
