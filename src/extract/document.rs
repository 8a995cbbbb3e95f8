use crate::FetchError;
use scraper::Html;
use url::Url;

/// A fetched HTML document
///
/// Holds the decoded body and the URL it was finally served from (after
/// redirects), which is the base for resolving relative links. The markup is
/// parsed on demand so documents can be cached and shared across tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    url: Url,
    body: String,
}

impl Document {
    pub fn new(url: Url, body: impl Into<String>) -> Self {
        Self {
            url,
            body: body.into(),
        }
    }

    /// Decodes a raw response body
    ///
    /// # Returns
    ///
    /// * `Ok(Document)` - The body was valid UTF-8
    /// * `Err(FetchError::Parse)` - The body could not be decoded
    pub fn from_bytes(url: Url, bytes: Vec<u8>) -> Result<Self, FetchError> {
        let body = String::from_utf8(bytes)
            .map_err(|e| FetchError::Parse(format!("body of {} is not valid UTF-8: {}", url, e)))?;
        Ok(Self { url, body })
    }

    /// The URL this document was served from
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Parses the body into a queryable HTML tree
    pub fn html(&self) -> Html {
        Html::parse_document(&self.body)
    }
}
