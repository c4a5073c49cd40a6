//! fal-backed style generation client

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;

use avatar_config::ImageGenSettings;

use crate::storage::ObjectStore;
use crate::{ImageGenError, StyleGenerator, StyleOutput, StyleRequest};

// Fixed parameters for the text-conditioned edit model.
const EDIT_STRENGTH: f64 = 0.7;
const EDIT_STEPS: u32 = 28;
const EDIT_GUIDANCE: f64 = 3.5;
const EDIT_IMAGE_SIZE: &str = "square_hd";

/// Production style-generator client.
pub struct FalStyleClient {
    client: Client,
    settings: ImageGenSettings,
    storage: Arc<dyn ObjectStore>,
}

impl FalStyleClient {
    pub fn new(settings: ImageGenSettings, storage: Arc<dyn ObjectStore>) -> Self {
        Self {
            client: Client::new(),
            settings,
            storage,
        }
    }

    fn model_url(&self, model: &str) -> String {
        format!("{}/{}", self.settings.endpoint.trim_end_matches('/'), model)
    }

    /// Local-only source URLs are invisible to the provider; fetch the
    /// bytes and rehost them on the provider's own storage first.
    async fn resolve_source_url(&self, image_url: &str) -> Result<String, ImageGenError> {
        if !is_local_url(image_url) {
            return Ok(image_url.to_string());
        }

        let bytes = self
            .client
            .get(image_url)
            .send()
            .await
            .map_err(|e| ImageGenError::LocalFetchFailed(e.to_string()))?
            .error_for_status()
            .map_err(|e| ImageGenError::LocalFetchFailed(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| ImageGenError::LocalFetchFailed(e.to_string()))?;

        let upload_url = format!("{}/storage/upload", self.settings.endpoint.trim_end_matches('/'));
        let response = self
            .client
            .post(&upload_url)
            .header("Authorization", format!("Key {}", self.settings.api_key))
            .header("content-type", "image/jpeg")
            .body(bytes.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ImageGenError::Upstream(format!(
                "storage upload rejected: HTTP {}",
                response.status()
            )));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| ImageGenError::Upstream(e.to_string()))?;
        tracing::debug!(url = %uploaded.url, "rehosted local source image");
        Ok(uploaded.url)
    }

    async fn invoke_model(
        &self,
        model: &str,
        body: serde_json::Value,
    ) -> Result<String, ImageGenError> {
        let response = self
            .client
            .post(self.model_url(model))
            .header("Authorization", format!("Key {}", self.settings.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(ImageGenError::Upstream(format!("HTTP {status}: {detail}")));
        }

        let generated: GenerationResponse = response
            .json()
            .await
            .map_err(|e| ImageGenError::Upstream(e.to_string()))?;

        generated
            .images
            .into_iter()
            .next()
            .map(|image| image.url)
            .ok_or(ImageGenError::NoMediaReturned)
    }

    /// Copy the provider asset into persistent storage; on any failure the
    /// provider URL is kept.
    async fn persist_copy(&self, request: &StyleRequest, provider_url: &str) -> Option<String> {
        let bytes = match self.client.get(provider_url).send().await {
            Ok(response) if response.status().is_success() => match response.bytes().await {
                Ok(bytes) => bytes.to_vec(),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read generated asset, keeping provider URL");
                    return None;
                }
            },
            Ok(response) => {
                tracing::warn!(status = %response.status(), "generated asset fetch rejected");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "generated asset fetch failed");
                return None;
            }
        };

        let key = format!(
            "style-suggestions/{}/{}-{}.png",
            request.persona_id,
            request.session_id,
            chrono::Utc::now().timestamp_millis()
        );
        match self.storage.put(&key, bytes, "image/png").await {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(error = %e, "object-store copy failed, keeping provider URL");
                None
            }
        }
    }
}

#[async_trait]
impl StyleGenerator for FalStyleClient {
    async fn generate_style(&self, request: StyleRequest) -> Result<StyleOutput, ImageGenError> {
        let source_url = self.resolve_source_url(&request.image_url).await?;

        let (model, body) = if let Some(garment) = request.reference_image_urls.first() {
            (
                self.settings.tryon_model.as_str(),
                serde_json::json!({
                    "model_image": source_url,
                    "garment_image": garment,
                }),
            )
        } else {
            (
                self.settings.edit_model.as_str(),
                serde_json::json!({
                    "image_url": source_url,
                    "prompt": request.prompt,
                    "strength": EDIT_STRENGTH,
                    "num_inference_steps": EDIT_STEPS,
                    "guidance_scale": EDIT_GUIDANCE,
                    "image_size": EDIT_IMAGE_SIZE,
                }),
            )
        };

        tracing::info!(
            session_id = %request.session_id,
            persona_id = %request.persona_id,
            model = %model,
            "invoking style generator"
        );
        let provider_url = self.invoke_model(model, body).await?;
        let persistent_url = self.persist_copy(&request, &provider_url).await;

        Ok(StyleOutput {
            generated_url: persistent_url.unwrap_or_else(|| provider_url.clone()),
            provider_url,
            model_used: model.to_string(),
        })
    }
}

/// True for URLs that only resolve on this host.
fn is_local_url(url: &str) -> bool {
    let rest = url.split("://").nth(1).unwrap_or(url);
    let host = rest.split(['/', ':']).next().unwrap_or("");
    host.eq_ignore_ascii_case("localhost") || host == "127.0.0.1"
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    images: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    url: String,
}
