//! Clip acquisition: resolving clip references into raw bytes.
//!
//! Capture storage hands out time-limited signed URLs, so a reference that
//! also carries its stable storage path is re-resolved through a
//! [`SignedUrlProvider`] before download. URL staleness is expected, not
//! exceptional.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use url::Url;

use crate::config::FetchConfig;
use crate::container;

/// Opaque locator for one captured clip. Immutable once captured.
#[derive(Debug, Clone)]
pub struct ClipReference {
    /// Presented download URL, possibly an expired signed URL.
    pub url: String,
    /// Stable storage path, when known; used to regenerate a fresh URL.
    pub storage_path: Option<String>,
    /// MIME type declared at capture time, when known.
    pub media_type: Option<String>,
}

impl ClipReference {
    /// Reference a clip by download URL alone.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            storage_path: None,
            media_type: None,
        }
    }

    /// Attach the stable storage path used for signed-URL regeneration.
    #[must_use]
    pub fn with_storage_path(mut self, path: impl Into<String>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Attach the MIME type declared at capture time.
    #[must_use]
    pub fn with_media_type(mut self, mime: impl Into<String>) -> Self {
        self.media_type = Some(mime.into());
        self
    }
}

/// Raw clip bytes as downloaded, before normalization.
#[derive(Debug, Clone)]
pub struct RawClipPayload {
    pub data: Bytes,
    pub mime: String,
}

/// Regenerates a fresh signed download URL from a stable storage path.
///
/// Implemented by the storage collaborator; the engine never parses or
/// refreshes signed URLs itself.
#[async_trait]
pub trait SignedUrlProvider: Send + Sync {
    /// Returns a currently valid download URL for the given storage path.
    async fn fresh_url(
        &self,
        storage_path: &str,
    ) -> Result<Url, Box<dyn std::error::Error + Send + Sync>>;
}

/// Errors that can occur while acquiring a clip or narration payload.
///
/// Each variant identifies the failing clip slot so remediation text can name
/// the exact shot to re-record.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Clip {index} not found (HTTP 404)")]
    NotFound { index: usize },

    #[error("Not authorized to download clip {index}")]
    Unauthorized { index: usize },

    #[error("Clip {index} is empty")]
    EmptyPayload { index: usize },

    #[error("Network error downloading clip {index}: {reason}")]
    Network { index: usize, reason: String },

    #[error("Could not refresh download URL for clip {index}: {reason}")]
    UrlRefreshFailed { index: usize, reason: String },

    #[error("Invalid download URL for clip {index}: {reason}")]
    InvalidUrl { index: usize, reason: String },
}

impl FetchError {
    /// Remediation text suitable for direct user display.
    pub fn user_message(&self) -> String {
        match self {
            FetchError::NotFound { index } => format!(
                "Shot {} could not be found in storage. Re-record and re-upload that shot.",
                index + 1
            ),
            FetchError::Unauthorized { index } => format!(
                "You are not authorized to download shot {}. Sign in again and retry.",
                index + 1
            ),
            FetchError::EmptyPayload { index } => format!(
                "Shot {} is missing or corrupted. Re-record that shot before combining.",
                index + 1
            ),
            FetchError::Network { index, .. } => format!(
                "Downloading shot {} failed. Check your connection and retry.",
                index + 1
            ),
            FetchError::UrlRefreshFailed { index, .. } => format!(
                "Could not get a fresh download link for shot {}. Retry in a moment.",
                index + 1
            ),
            FetchError::InvalidUrl { index, .. } => format!(
                "The download link for shot {} is invalid. Re-upload that shot.",
                index + 1
            ),
        }
    }

    /// Slot index of the clip this error refers to.
    pub fn clip_index(&self) -> usize {
        match self {
            FetchError::NotFound { index }
            | FetchError::Unauthorized { index }
            | FetchError::EmptyPayload { index }
            | FetchError::Network { index, .. }
            | FetchError::UrlRefreshFailed { index, .. }
            | FetchError::InvalidUrl { index, .. } => *index,
        }
    }
}

/// Downloads clips and narration payloads over HTTP.
pub struct ClipFetcher {
    client: reqwest::Client,
    config: FetchConfig,
    url_provider: Option<Arc<dyn SignedUrlProvider>>,
}

impl ClipFetcher {
    /// Create a fetcher without signed-URL regeneration.
    pub fn new(config: FetchConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            url_provider: None,
        }
    }

    /// Attach the storage collaborator used to refresh expiring signed URLs.
    #[must_use]
    pub fn with_url_provider(mut self, provider: Arc<dyn SignedUrlProvider>) -> Self {
        self.url_provider = Some(provider);
        self
    }

    /// Resolves a clip reference into raw bytes.
    ///
    /// When the reference carries a storage path and a provider is attached,
    /// a fresh URL is requested instead of trusting the presented one.
    ///
    /// # Errors
    ///
    /// - `FetchError::NotFound` - Storage returned HTTP 404
    /// - `FetchError::Unauthorized` - Storage returned HTTP 401/403
    /// - `FetchError::EmptyPayload` - Download succeeded but carried zero bytes
    /// - `FetchError::Network` - Transport failure or other non-success status
    pub async fn fetch_clip(
        &self,
        clip: &ClipReference,
        index: usize,
    ) -> Result<RawClipPayload, FetchError> {
        let url = self.resolve_url(clip, index).await?;
        tracing::debug!("Fetching clip {} from {}", index, url);

        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, self.config.user_agent)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| FetchError::Network {
                index,
                reason: e.to_string(),
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(FetchError::NotFound { index }),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(FetchError::Unauthorized { index });
            }
            status if !status.is_success() => {
                return Err(FetchError::Network {
                    index,
                    reason: format!("HTTP {status}"),
                });
            }
            _ => {}
        }

        let header_mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let data = response.bytes().await.map_err(|e| FetchError::Network {
            index,
            reason: e.to_string(),
        })?;

        if data.is_empty() {
            return Err(FetchError::EmptyPayload { index });
        }

        let mime = resolve_mime(header_mime, clip.media_type.as_deref(), &data);
        tracing::info!("Fetched clip {}: {} bytes ({})", index, data.len(), mime);
        Ok(RawClipPayload { data, mime })
    }

    async fn resolve_url(&self, clip: &ClipReference, index: usize) -> Result<Url, FetchError> {
        if let (Some(path), Some(provider)) = (&clip.storage_path, &self.url_provider) {
            return provider
                .fresh_url(path)
                .await
                .map_err(|e| FetchError::UrlRefreshFailed {
                    index,
                    reason: e.to_string(),
                });
        }
        Url::parse(&clip.url).map_err(|e| FetchError::InvalidUrl {
            index,
            reason: e.to_string(),
        })
    }
}

/// MIME resolution order: response header, declared capture type, magic-byte
/// sniff, mp4 guess.
fn resolve_mime(header: Option<String>, declared: Option<&str>, data: &[u8]) -> String {
    if let Some(mime) = header
        && mime.starts_with("video/")
    {
        return mime;
    }
    if let Some(mime) = declared {
        return mime.to_string();
    }
    match container::detect_container_format(data) {
        Ok(format) => container::mime_type(format).to_string(),
        Err(_) => mime_guess::mime::APPLICATION_OCTET_STREAM.to_string(),
    }
}
