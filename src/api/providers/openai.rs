//! OpenAI image generation provider (gpt-image-1).

use crate::api::provider::ImageProvider;
use crate::api::types::{
    GeneratedImage, GenerationMetadata, GenerationRequest, ImageFormat, ProviderKind,
};
use crate::error::{parse_retry_after, sanitize_error_message, Result, WidefillError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const MODEL: &str = "gpt-image-1";
const QUALITY: &str = "high";

/// Builder for OpenAiImageProvider.
#[derive(Debug, Clone)]
pub struct OpenAiImageProviderBuilder {
    api_key: Option<String>,
    base_url: String,
}

impl Default for OpenAiImageProviderBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.into(),
        }
    }
}

impl OpenAiImageProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key (usually `OPENAI_API_KEY`).
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Overrides the API base URL (proxies, test servers).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Builds the provider.
    ///
    /// A missing key is not an error here; every `generate` call fails with
    /// [`WidefillError::Auth`] instead.
    pub fn build(self) -> Result<OpenAiImageProvider> {
        Ok(OpenAiImageProvider {
            client: reqwest::Client::new(),
            api_key: self.api_key.filter(|k| !k.trim().is_empty()),
            base_url: self.base_url,
        })
    }
}

/// OpenAI image generation provider.
pub struct OpenAiImageProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiImageProvider {
    /// Creates a new `OpenAiImageProviderBuilder`.
    pub fn builder() -> OpenAiImageProviderBuilder {
        OpenAiImageProviderBuilder::new()
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| WidefillError::Auth("OPENAI_API_KEY not set".into()))
    }

    fn generations_url(&self) -> String {
        format!("{}/images/generations", self.base_url)
    }

    fn parse_error(status: u16, text: &str, headers: &reqwest::header::HeaderMap) -> WidefillError {
        let text = sanitize_error_message(text);
        if status == 429 {
            let retry_after = parse_retry_after(headers).map(std::time::Duration::from_secs);
            return WidefillError::RateLimited { retry_after };
        }
        if status == 401 || status == 403 {
            return WidefillError::Auth(text);
        }
        let lower = text.to_lowercase();
        if lower.contains("safety") || lower.contains("content_policy") || lower.contains("moderation")
        {
            return WidefillError::ContentBlocked(text);
        }
        WidefillError::Api {
            status,
            message: text,
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(WidefillError::Api {
                status: response.status().as_u16(),
                message: "failed to download image from URL".into(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl ImageProvider for OpenAiImageProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage> {
        let api_key = self.api_key()?;
        let start = Instant::now();
        let body = OpenAiImageRequest::from_generation_request(request);

        let response = self
            .client
            .post(self.generations_url())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(Self::parse_error(status.as_u16(), &text, &headers));
        }

        let openai_response: OpenAiImageResponse = response.json().await?;

        let image_data = openai_response.data.into_iter().next().ok_or_else(|| {
            WidefillError::UnexpectedResponse("no images in OpenAI response".into())
        })?;

        let data = if let Some(b64) = image_data.b64_json {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD
                .decode(b64.trim())
                .map_err(|e| WidefillError::Decode(e.to_string()))?
        } else if let Some(url) = image_data.url {
            tracing::debug!(url = %url, "OpenAI returned a URL instead of base64");
            self.download(&url).await?
        } else {
            return Err(WidefillError::UnexpectedResponse(
                "OpenAI response contained no image data".into(),
            ));
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let format = ImageFormat::from_magic_bytes(&data).unwrap_or(ImageFormat::Png);

        Ok(GeneratedImage::new(
            data,
            format,
            ProviderKind::OpenAI,
            GenerationMetadata {
                model: Some(MODEL.to_string()),
                request_id: None,
                duration_ms: Some(duration_ms),
            },
        ))
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAI
    }
}

#[derive(Debug, Serialize)]
struct OpenAiImageRequest {
    model: String,
    prompt: String,
    n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<String>,
    quality: String,
}

impl OpenAiImageRequest {
    fn from_generation_request(req: &GenerationRequest) -> Self {
        Self {
            model: MODEL.to_string(),
            prompt: req.prompt.clone(),
            n: 1,
            size: req.size_string(),
            quality: QUALITY.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiImageResponse {
    data: Vec<OpenAiImageData>,
}

#[derive(Debug, Deserialize)]
struct OpenAiImageData {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::AspectRatio;

    #[test]
    fn test_builder_with_explicit_key() {
        let provider = OpenAiImageProviderBuilder::new().api_key("sk-test").build();
        assert!(provider.is_ok());
    }

    #[tokio::test]
    async fn test_generate_without_key_fails_per_call() {
        // Unroutable base URL: the call must fail before any request is sent.
        let provider = OpenAiImageProviderBuilder::new()
            .api_key("  ")
            .base_url("http://127.0.0.1:9")
            .build()
            .unwrap();
        let req = GenerationRequest::new("a cat").with_aspect_ratio(AspectRatio::Landscape);

        let err = provider.generate(&req).await.unwrap_err();
        assert!(matches!(err, WidefillError::Auth(ref msg) if msg.contains("OPENAI_API_KEY")));

        let provider = OpenAiImageProviderBuilder::new().build().unwrap();
        assert!(matches!(
            provider.generate(&req).await,
            Err(WidefillError::Auth(_))
        ));
    }

    #[test]
    fn test_builder_base_url_trailing_slash() {
        let provider = OpenAiImageProviderBuilder::new()
            .api_key("sk-test")
            .base_url("http://localhost:9000/v1/")
            .build()
            .unwrap();
        assert_eq!(
            provider.generations_url(),
            "http://localhost:9000/v1/images/generations"
        );
    }

    #[test]
    fn test_request_construction_landscape() {
        let req = GenerationRequest::new("A sunset").with_aspect_ratio(AspectRatio::Landscape);
        let openai_req =
            OpenAiImageRequest::from_generation_request(&req);

        let json = serde_json::to_value(&openai_req).unwrap();
        assert_eq!(json["model"], "gpt-image-1");
        assert_eq!(json["prompt"], "A sunset");
        assert_eq!(json["size"], "1536x1024");
        assert_eq!(json["quality"], "high");
        assert_eq!(json["n"], 1);
    }

    #[test]
    fn test_request_construction_portrait() {
        let req = GenerationRequest::new("A tower").with_aspect_ratio(AspectRatio::Portrait);
        let openai_req =
            OpenAiImageRequest::from_generation_request(&req);
        assert_eq!(openai_req.size.as_deref(), Some("1024x1536"));
    }

    #[test]
    fn test_request_serialization_skips_missing_size() {
        let req = GenerationRequest::new("A sunset");
        let openai_req =
            OpenAiImageRequest::from_generation_request(&req);
        let json = serde_json::to_value(&openai_req).unwrap();
        assert!(json.get("size").is_none());
    }

    #[test]
    fn test_response_deserialization_b64() {
        let json = r#"{"created": 1, "data": [{"b64_json": "AQID"}]}"#;
        let resp: OpenAiImageResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.data[0].b64_json.as_deref(), Some("AQID"));
        assert!(resp.data[0].url.is_none());
    }

    #[test]
    fn test_response_without_data_is_rejected() {
        let json = r#"{"created": 1}"#;
        assert!(serde_json::from_str::<OpenAiImageResponse>(json).is_err());
    }

    #[test]
    fn test_parse_error_mapping() {
        let headers = reqwest::header::HeaderMap::new();

        let err = OpenAiImageProvider::parse_error(401, "Incorrect API key sk-abc", &headers);
        match err {
            WidefillError::Auth(msg) => assert!(!msg.contains("sk-abc")),
            other => panic!("expected Auth, got {other:?}"),
        }

        let err = OpenAiImageProvider::parse_error(429, "slow down", &headers);
        assert!(matches!(err, WidefillError::RateLimited { retry_after: None }));

        let err = OpenAiImageProvider::parse_error(
            400,
            r#"{"error":{"code":"moderation_blocked"}}"#,
            &headers,
        );
        assert!(matches!(err, WidefillError::ContentBlocked(_)));

        let err = OpenAiImageProvider::parse_error(500, "boom", &headers);
        assert!(matches!(err, WidefillError::Api { status: 500, .. }));
    }
}
