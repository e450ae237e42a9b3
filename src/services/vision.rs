// src/services/vision.rs
//! Vision analysis collaborator: face detection, safe-search and label
//! annotation over raw image bytes.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use log::{debug, info};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tokio::time::timeout;

use crate::errors::RestyleError;
use crate::models::VisionAnalysis;

#[async_trait]
pub trait VisionApi: Send + Sync {
    async fn annotate(&self, image: &[u8]) -> Result<VisionAnalysis, RestyleError>;
}

pub struct GoogleVisionClient {
    http: Client,
    base_url: String,
    api_key: String,
    call_timeout: Duration,
}

impl GoogleVisionClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            call_timeout,
        }
    }
}

#[async_trait]
impl VisionApi for GoogleVisionClient {
    async fn annotate(&self, image: &[u8]) -> Result<VisionAnalysis, RestyleError> {
        let content = general_purpose::STANDARD.encode(image);
        debug!("Vision annotate request, {} image bytes", image.len());

        let body = json!({
            "requests": [{
                "image": { "content": content },
                "features": [
                    { "type": "FACE_DETECTION", "maxResults": 10 },
                    { "type": "SAFE_SEARCH_DETECTION" },
                    { "type": "LABEL_DETECTION", "maxResults": 10 },
                    { "type": "IMAGE_PROPERTIES" },
                ],
            }],
        });

        let request = self
            .http
            .post(format!("{}/images:annotate", self.base_url))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send();

        let response = timeout(self.call_timeout, request)
            .await
            .map_err(|_| RestyleError::VisionTimeout)?
            .map_err(|e| RestyleError::Vision(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RestyleError::Vision(format!("status {status}: {body}")));
        }

        #[derive(serde::Deserialize)]
        struct AnnotateResponse {
            #[serde(default)]
            responses: Vec<VisionAnalysis>,
        }

        let mut parsed: AnnotateResponse = response
            .json()
            .await
            .map_err(|e| RestyleError::Vision(format!("unexpected response shape: {e}")))?;

        if parsed.responses.is_empty() {
            return Err(RestyleError::Vision("empty annotate response".into()));
        }
        let analysis = parsed.responses.remove(0);
        info!(
            "Vision analysis: {} face(s), {} label(s)",
            analysis.face_annotations.len(),
            analysis.label_annotations.len()
        );
        Ok(analysis)
    }
}
