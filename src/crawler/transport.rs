//! HTTP transport
//!
//! The fetcher talks to the network through the [`Transport`] trait so that
//! the engine can be driven by an in-memory site in tests. [`HttpTransport`]
//! is the production implementation backed by `reqwest`.

use crate::FetchError;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Extra request headers, sent in key order
pub type Headers = BTreeMap<String, String>;

/// Maximum number of redirects followed for one request
const MAX_REDIRECTS: usize = 10;

/// A raw HTTP response
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,

    /// Response body bytes
    pub body: Vec<u8>,

    /// Final URL after redirects
    pub final_url: Url,
}

/// A single GET round trip
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issues one GET request
    ///
    /// Non-2xx statuses are returned as responses, not errors; only failures
    /// to complete the exchange are errors.
    async fn get(
        &self,
        url: &Url,
        headers: &Headers,
        timeout: Duration,
    ) -> Result<TransportResponse, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The User-Agent header sent with every request
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use harvest_crawl::crawler::build_http_client;
///
/// let client = build_http_client("harvest-crawl/0.1").unwrap();
/// ```
pub fn build_http_client(user_agent: &str) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Transport backed by a `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a transport with a fresh client for `user_agent`
    pub fn with_user_agent(user_agent: &str) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(user_agent)?))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(
        &self,
        url: &Url,
        headers: &Headers,
        timeout: Duration,
    ) -> Result<TransportResponse, FetchError> {
        let mut request = self.client.get(url.clone()).timeout(timeout);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify_error(e, timeout))?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify_error(e, timeout))?;

        Ok(TransportResponse {
            status,
            body: body.to_vec(),
            final_url,
        })
    }
}

fn classify_error(error: reqwest::Error, timeout: Duration) -> FetchError {
    if error.is_builder() {
        FetchError::InvalidRequest(error.to_string())
    } else if error.is_timeout() {
        FetchError::Timeout(timeout)
    } else if error.is_connect() {
        FetchError::Transport(format!("connection failed: {}", error))
    } else if error.is_redirect() {
        FetchError::Transport(format!("redirect error: {}", error))
    } else {
        FetchError::Transport(error.to_string())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_header_is_not_transient() {
        let transport = HttpTransport::with_user_agent("TestHarvester/1.0").unwrap();
        let mut headers = Headers::new();
        headers.insert("bad header".to_string(), "value".to_string());

        let result = transport
            .get(
                &Url::parse("http://127.0.0.1:9/").unwrap(),
                &headers,
                Duration::from_secs(1),
            )
            .await;

        match result {
            Err(err @ FetchError::InvalidRequest(_)) => {
                assert_eq!(err.kind().as_str(), "invalid_request")
            }
            other => panic!("expected invalid request, got {:?}", other),
        }
    }
}
