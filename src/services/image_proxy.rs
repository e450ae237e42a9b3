// src/services/image_proxy.rs
//! Resolution and authenticated fetching of selected images.
//!
//! Raw picker references require a bearer credential the browser does not
//! hold, so every image the UI sees is rewritten through the local proxy
//! route. Fetches are streamed with a running byte count so oversized
//! payloads fail loudly instead of being truncated.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use log::debug;
use reqwest::Client;
use tokio::time::timeout;

use crate::config::LimitsConfig;
use crate::errors::RestyleError;
use crate::models::{Credential, SelectedMediaItem};

/// Sizing applied to a base reference, per consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageUse {
    /// Browser-facing preview.
    Preview,
    /// Analysis and generation inputs.
    Analysis,
}

impl ImageUse {
    fn dimensions(&self) -> (u32, u32) {
        match self {
            ImageUse::Preview => (512, 512),
            ImageUse::Analysis => (2048, 2048),
        }
    }
}

/// Timeout class for a fetch, per consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPurpose {
    /// Interactive preview loads; short timeout.
    Interactive,
    /// Analysis/generation pipeline inputs; longer timeout.
    Pipeline,
}

/// A base reference with sizing applied plus its locally-routable form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    /// Sized external URL, still requiring the bearer credential.
    pub external_url: String,
    /// Proxy path safe to hand to the browser.
    pub proxy_path: String,
}

/// Seam for fetching image bytes, mocked by orchestrator tests.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        credential: &Credential,
        purpose: FetchPurpose,
    ) -> Result<(Bytes, String), RestyleError>;
}

pub struct ImageFetchProxy {
    http: Client,
    limits: LimitsConfig,
}

impl ImageFetchProxy {
    pub fn new(limits: LimitsConfig) -> Self {
        Self {
            http: Client::new(),
            limits,
        }
    }

    /// Apply sizing parameters and rewrite into the proxy route.
    pub fn resolve_selection(item: &SelectedMediaItem, usage: ImageUse) -> ResolvedImage {
        let (w, h) = usage.dimensions();
        let external_url = format!("{}=w{}-h{}", item.base_reference, w, h);
        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("url", &external_url)
            .finish();
        ResolvedImage {
            proxy_path: format!("/api/v1/photos/proxy-image?{query}"),
            external_url,
        }
    }

    /// Fetch raw bytes plus content type from a resolved external URL.
    pub async fn fetch_bytes(
        &self,
        url: &str,
        credential: &Credential,
        purpose: FetchPurpose,
    ) -> Result<(Bytes, String), RestyleError> {
        if credential.is_empty() {
            return Err(RestyleError::Auth);
        }

        let budget = match purpose {
            FetchPurpose::Interactive => self.limits.interactive_fetch_timeout,
            FetchPurpose::Pipeline => self.limits.pipeline_fetch_timeout,
        };

        timeout(budget, self.fetch_inner(url, credential))
            .await
            .map_err(|_| RestyleError::FetchTimeout)?
    }

    async fn fetch_inner(
        &self,
        url: &str,
        credential: &Credential,
    ) -> Result<(Bytes, String), RestyleError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&credential.access_token)
            .send()
            .await
            .map_err(|e| {
                if e.status() == Some(reqwest::StatusCode::UNAUTHORIZED) {
                    RestyleError::Auth
                } else {
                    RestyleError::Fetch {
                        status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                    }
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(RestyleError::Auth);
        }
        if !status.is_success() {
            return Err(RestyleError::Fetch {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();

        let max = self.limits.max_image_bytes;
        let mut buf = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| RestyleError::Fetch {
                status: e.status().map(|s| s.as_u16()).unwrap_or(0),
            })?;
            if buf.len() + chunk.len() >= max {
                return Err(RestyleError::SizeLimit {
                    actual: buf.len() + chunk.len(),
                    max,
                });
            }
            buf.extend_from_slice(&chunk);
        }

        debug!("Fetched {} bytes ({})", buf.len(), content_type);
        Ok((buf.freeze(), content_type))
    }
}

#[async_trait]
impl ImageFetcher for ImageFetchProxy {
    async fn fetch(
        &self,
        url: &str,
        credential: &Credential,
        purpose: FetchPurpose,
    ) -> Result<(Bytes, String), RestyleError> {
        self.fetch_bytes(url, credential, purpose).await
    }
}
