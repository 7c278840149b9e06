//! Tool resolver: release tag → download URL.

use std::fmt;

use reqwest::Url;

use crate::config::{vars, Config};
use crate::error::BootstrapError;
use crate::Result;

/// Built-in release service endpoint.
pub const DEFAULT_BASE_URL: &str = "https://releases.dqx.ai/dcx/download";

/// Query parameter carrying the release tag.
pub const TAG_PARAM: &str = "tag";

/// Build the download URL for `tag`.
///
/// Appends `tag=<tag>` to the base URL, keeping any query it already has.
/// Pure and deterministic.
pub fn resolve_download_url(base_url: Option<&str>, tag: &str) -> Result<String> {
    let base = base_url.unwrap_or(DEFAULT_BASE_URL);
    let mut url =
        Url::parse(base).map_err(|e| BootstrapError::invalid(vars::DCX_URL, base, e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(BootstrapError::invalid(
            vars::DCX_URL,
            base,
            "only http and https are supported",
        ));
    }

    url.query_pairs_mut().append_pair(TAG_PARAM, tag);
    Ok(url.into())
}

/// Resolved URL and request headers for the one release fetch.
#[derive(Clone, PartialEq, Eq)]
pub struct DownloadDescriptor {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl DownloadDescriptor {
    pub fn new(url: String, token: &str) -> Self {
        DownloadDescriptor {
            url,
            headers: vec![bearer(token)],
        }
    }

    /// Fails with [`BootstrapError::MissingConfig`] on a blank token, so a
    /// hand-built `Config` cannot reach the network without credentials.
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.token.trim().is_empty() {
            return Err(BootstrapError::MissingConfig {
                name: vars::GITHUB_TOKEN.to_string(),
            });
        }
        let url = resolve_download_url(config.base_url.as_deref(), &config.tag)?;
        Ok(Self::new(url, &config.token))
    }

    /// Whether `url` has the same scheme, host and port as the resolved URL.
    pub fn same_origin(&self, url: &str) -> bool {
        match (Url::parse(&self.url), Url::parse(url)) {
            (Ok(a), Ok(b)) => a.origin().is_tuple() && a.origin() == b.origin(),
            _ => false,
        }
    }
}

impl fmt::Debug for DownloadDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(k, v)| {
                if k.eq_ignore_ascii_case("authorization") {
                    (k.as_str(), "<redacted>")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect();
        f.debug_struct("DownloadDescriptor")
            .field("url", &self.url)
            .field("headers", &headers)
            .finish()
    }
}

pub(crate) fn bearer(token: &str) -> (String, String) {
    ("Authorization".to_string(), format!("Bearer {token}"))
}
