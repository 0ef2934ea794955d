//! Document sources -- the network seam of the fetch engine.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, FetchError, Result};

/// Session cookies attached to every request
///
/// Loading them (from a browser export or similar) is the caller's concern;
/// the JSON form is a flat `{"name": "value"}` object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials {
    /// Cookie name to value
    pub cookies: BTreeMap<String, String>,
}

impl Credentials {
    /// Parse a flat JSON object of cookie names to values
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Value for a `Cookie` request header, or `None` when there are no cookies
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Abstraction over fetching raw document bytes, enabling testability
#[async_trait::async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetch the bytes stored at `url`
    async fn fetch(&self, url: &Url) -> std::result::Result<Vec<u8>, FetchError>;
}

/// Production [`DocumentSource`] over HTTP(S)
pub struct HttpDocumentSource {
    client: reqwest::Client,
}

impl HttpDocumentSource {
    /// Build a client that sends `credentials` with every request
    ///
    /// # Errors
    /// Returns [`Error::Config`] if a cookie cannot be encoded as a header value,
    /// or [`Error::Network`] if the client cannot be built.
    pub fn new(credentials: &Credentials, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = credentials.cookie_header() {
            let value = HeaderValue::from_str(&cookie)
                .map_err(|e| Error::config("credentials", format!("invalid cookie value: {e}")))?;
            headers.insert(COOKIE, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl DocumentSource for HttpDocumentSource {
    async fn fetch(&self, url: &Url) -> std::result::Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        Ok(body.to_vec())
    }
}
