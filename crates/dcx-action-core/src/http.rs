//! HTTP transport seam
//!
//! The fetcher and the poller talk to the network only through
//! [`HttpTransport`], so tests can substitute [`crate::fakes::FakeTransport`].

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{snippet, BootstrapError};
use crate::Result;

/// Maximum characters of a failing response body kept in errors.
pub const ERROR_SNIPPET_CHARS: usize = 200;

const USER_AGENT: &str = concat!("dcx-action/", env!("CARGO_PKG_VERSION"));

/// A fully buffered HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the body should be read as JSON.
    ///
    /// Trusts the content type when present; otherwise sniffs for an object.
    pub fn is_json(&self) -> bool {
        match &self.content_type {
            Some(ct) => ct.to_ascii_lowercase().contains("json"),
            None => self
                .body
                .iter()
                .find(|b| !b.is_ascii_whitespace())
                .is_some_and(|b| *b == b'{'),
        }
    }

    /// Turn a non-2xx response into [`BootstrapError::HttpStatus`].
    pub fn error_for_status(self, url: &str) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(BootstrapError::HttpStatus {
                url: url.to_string(),
                status: self.status,
                snippet: snippet(&self.body, ERROR_SNIPPET_CHARS),
            })
        }
    }
}

/// Minimal GET capability.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a GET and buffer the body. Non-2xx statuses are returned, not raised.
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse>;
}

/// `reqwest`-backed transport.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(ReqwestTransport { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let header = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(reqwest::header::CONTENT_TYPE);
        let content_disposition = header(reqwest::header::CONTENT_DISPOSITION);
        let body = response.bytes().await?.to_vec();

        debug!(url = %url, status, bytes = body.len(), "GET completed");
        Ok(HttpResponse {
            status,
            content_type,
            content_disposition,
            body,
        })
    }
}
