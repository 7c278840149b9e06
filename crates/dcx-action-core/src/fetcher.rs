//! Archive fetcher
//!
//! Downloads the dcx release artifact. The release service either answers
//! with the artifact itself or with a JSON envelope that points at it; in
//! the latter case exactly one follow-up GET retrieves the real payload.

use regex::Regex;
use reqwest::Url;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::BootstrapError;
use crate::http::{HttpResponse, HttpTransport};
use crate::resolver::DownloadDescriptor;
use crate::Result;

/// Name used when neither the response nor the URL names the file.
pub const FALLBACK_FILE_NAME: &str = "dcx-artifact.tar.gz";

const ARCHIVE_SUFFIXES: [&str; 4] = [".whl", ".tar.gz", ".tgz", ".zip"];

/// A downloaded release artifact, ready for installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// File name the installer will see
    pub file_name: String,
    /// URL the bytes were read from
    pub source_url: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    /// SHA-256 of the payload, lowercase hex.
    pub fn sha256(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        hex::encode(hasher.finalize())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// One entry of a release listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub browser_download_url: String,
}

/// JSON body pointing at the real artifact.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub asset_url: Option<String>,
    /// Release-listing shape: `{"assets": [{"browser_download_url": ...}]}`
    #[serde(default)]
    pub assets: Option<Vec<ReleaseAsset>>,
}

impl Envelope {
    pub fn parse(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| BootstrapError::BadEnvelope(e.to_string()))
    }

    /// Asset URL carried by the envelope.
    ///
    /// `asset_url` wins; a release listing is searched with `pattern`.
    pub fn asset_url(&self, pattern: &Regex) -> Result<String> {
        if let Some(url) = self.asset_url.as_deref().map(str::trim) {
            if url.is_empty() {
                return Err(BootstrapError::BadEnvelope(
                    "asset_url is empty".to_string(),
                ));
            }
            return Ok(url.to_string());
        }

        match &self.assets {
            Some(assets) => assets
                .iter()
                .map(|a| a.browser_download_url.as_str())
                .find(|u| pattern.is_match(u))
                .map(str::to_string)
                .ok_or_else(|| {
                    let available: Vec<&str> =
                        assets.iter().map(|a| a.browser_download_url.as_str()).collect();
                    BootstrapError::BadEnvelope(format!(
                        "no asset matched pattern {}; available: [{}]",
                        pattern.as_str(),
                        available.join(", ")
                    ))
                }),
            None => Err(BootstrapError::BadEnvelope(
                "envelope has no asset_url field".to_string(),
            )),
        }
    }
}

/// Shape of a successful release service response.
#[derive(Debug)]
pub enum FetchResult {
    Binary(HttpResponse),
    Envelope(Envelope),
}

impl FetchResult {
    pub fn classify(response: HttpResponse) -> Result<Self> {
        if response.is_json() {
            Ok(FetchResult::Envelope(Envelope::parse(&response.body)?))
        } else {
            Ok(FetchResult::Binary(response))
        }
    }
}

/// Fetches the artifact named by a [`DownloadDescriptor`].
pub struct ArchiveFetcher<'a> {
    transport: &'a dyn HttpTransport,
    asset_pattern: Regex,
}

impl<'a> ArchiveFetcher<'a> {
    pub fn new(transport: &'a dyn HttpTransport, asset_pattern: Regex) -> Self {
        ArchiveFetcher {
            transport,
            asset_pattern,
        }
    }

    /// Fetch the artifact. Consumes the descriptor; no retries.
    pub async fn fetch(&self, descriptor: DownloadDescriptor) -> Result<Artifact> {
        info!(url = %descriptor.url, "Fetching dcx release");
        let response = self
            .transport
            .get(&descriptor.url, &descriptor.headers)
            .await?
            .error_for_status(&descriptor.url)?;

        match FetchResult::classify(response)? {
            FetchResult::Binary(response) => Ok(artifact_from(&descriptor.url, response)),
            FetchResult::Envelope(envelope) => {
                let asset_url = envelope.asset_url(&self.asset_pattern)?;
                let asset_url = resolve_against(&descriptor.url, &asset_url)?;
                info!(asset_url = %asset_url, "Following envelope to release asset");

                // The service token only travels to the origin it was issued for.
                let headers = if descriptor.same_origin(&asset_url) {
                    descriptor.headers.clone()
                } else {
                    debug!("Asset is on a different origin, dropping credentials");
                    Vec::new()
                };

                let response = self
                    .transport
                    .get(&asset_url, &headers)
                    .await?
                    .error_for_status(&asset_url)?;
                Ok(artifact_from(&asset_url, response))
            }
        }
    }
}

fn resolve_against(base: &str, asset_url: &str) -> Result<String> {
    let joined = Url::parse(base)
        .and_then(|b| b.join(asset_url))
        .map_err(|e| {
            BootstrapError::BadEnvelope(format!("invalid asset_url {asset_url:?}: {e}"))
        })?;
    if !matches!(joined.scheme(), "http" | "https") {
        return Err(BootstrapError::BadEnvelope(format!(
            "asset_url must be http(s), got {asset_url:?}"
        )));
    }
    Ok(joined.into())
}

fn artifact_from(url: &str, response: HttpResponse) -> Artifact {
    let file_name = response
        .content_disposition
        .as_deref()
        .and_then(disposition_file_name)
        .or_else(|| url_file_name(url))
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());

    Artifact {
        file_name,
        source_url: url.to_string(),
        bytes: response.body,
    }
}

/// `attachment; filename="dcx-1.2.0-py3-none-any.whl"` → the file name.
fn disposition_file_name(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .and_then(|raw| sanitize_file_name(raw.trim_matches('"')))
}

/// Last path segment, if it looks like an installable archive.
fn url_file_name(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    if ARCHIVE_SUFFIXES.iter().any(|s| segment.ends_with(s)) {
        sanitize_file_name(segment)
    } else {
        None
    }
}

fn sanitize_file_name(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next()?.trim();
    if base.is_empty() || base == "." || base == ".." {
        None
    } else {
        Some(base.to_string())
    }
}
