// src/services/generation.rs
//! Generative transformation collaborator.
//!
//! The model is asked to edit the supplied image per the instruction and
//! return the result inline. A well-formed response carrying only text is the
//! expected "no image produced" outcome, reported as `success: false` rather
//! than an error.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use log::{info, warn};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tokio::time::timeout;

use crate::errors::RestyleError;
use crate::models::GenerationOutcome;

#[async_trait]
pub trait GenerationApi: Send + Sync {
    async fn transform(
        &self,
        image: &[u8],
        instruction: &str,
    ) -> Result<GenerationOutcome, RestyleError>;
}

pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    call_timeout: Duration,
}

impl GeminiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            call_timeout,
        }
    }

    /// Pull inline image data out of a response part, tolerating both wire
    /// spellings of the key.
    fn inline_data(part: &serde_json::Value) -> Option<(String, String)> {
        let data = part
            .get("inline_data")
            .or_else(|| part.get("inlineData"))?;
        let mime = data["mime_type"]
            .as_str()
            .or_else(|| data["mimeType"].as_str())
            .unwrap_or("image/png");
        Some((data["data"].as_str()?.to_string(), mime.to_string()))
    }
}

#[async_trait]
impl GenerationApi for GeminiClient {
    async fn transform(
        &self,
        image: &[u8],
        instruction: &str,
    ) -> Result<GenerationOutcome, RestyleError> {
        let base64_image = general_purpose::STANDARD.encode(image);

        // Without this the model sometimes answers with questions instead of
        // an image.
        let prompt = format!(
            "{instruction}\n\nIMPORTANT: You MUST generate and return the modified image. \
             Do not ask questions or provide explanations without the image. \
             Generate the image now."
        );

        let body = json!({
            "contents": [{
                "parts": [
                    { "text": prompt },
                    { "inline_data": { "mime_type": "image/jpeg", "data": base64_image } },
                ],
            }],
            "generationConfig": {
                "temperature": 1.0,
                "topP": 0.95,
                "topK": 64,
                "maxOutputTokens": 8192,
                "candidateCount": 1,
                "response_modalities": ["IMAGE"],
            },
        });

        info!(
            "Generation request to {}, prompt length {}",
            self.model,
            prompt.len()
        );

        let request = self
            .http
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send();

        let response = timeout(self.call_timeout, request)
            .await
            .map_err(|_| RestyleError::GenerationTimeout)?
            .map_err(|e| RestyleError::Generation(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RestyleError::Generation(format!("status {status}: {body}")));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RestyleError::Generation(format!("unexpected response shape: {e}")))?;

        let parts = payload["candidates"][0]["content"]["parts"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        let mut image_data = None;
        let mut text = String::new();
        for part in &parts {
            if let Some((data, mime)) = Self::inline_data(part) {
                image_data = Some((data, mime));
            } else if let Some(t) = part["text"].as_str() {
                text.push_str(t);
            }
        }

        match image_data {
            Some((data, mime)) => Ok(GenerationOutcome {
                success: true,
                image_data_url: Some(format!("data:{mime};base64,{data}")),
                message: "Image successfully generated".to_string(),
                model: self.model.clone(),
                raw_text: None,
            }),
            None => {
                warn!("Generation returned no image data ({} part(s))", parts.len());
                Ok(GenerationOutcome {
                    success: false,
                    image_data_url: None,
                    message: "No image was generated. Model returned text only.".to_string(),
                    model: self.model.clone(),
                    raw_text: if text.is_empty() { None } else { Some(text) },
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_data_accepts_both_key_spellings() {
        let snake = serde_json::json!({
            "inline_data": { "mime_type": "image/png", "data": "AAAA" }
        });
        assert_eq!(
            GeminiClient::inline_data(&snake),
            Some(("AAAA".to_string(), "image/png".to_string()))
        );

        let camel = serde_json::json!({
            "inlineData": { "mimeType": "image/jpeg", "data": "BBBB" }
        });
        assert_eq!(
            GeminiClient::inline_data(&camel),
            Some(("BBBB".to_string(), "image/jpeg".to_string()))
        );

        let text_only = serde_json::json!({ "text": "cannot comply" });
        assert_eq!(GeminiClient::inline_data(&text_only), None);
    }
}
