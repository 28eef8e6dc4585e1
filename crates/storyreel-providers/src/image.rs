//! Image synthesis.

use std::path::Path;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::{Client, Request};
use serde::{Deserialize, Serialize};
use storyreel_models::CancelToken;
use tracing::{debug, info};

use crate::config::ImageConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::retry::{ensure_success, retry_async, send_with_retry, RetryPolicy};

/// Renders one still image per scene.
#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    /// Extension for files written by this synthesizer.
    fn extension(&self) -> &str {
        "png"
    }

    /// Render `prompt` to `output_path`, retrying per the image policy.
    async fn synthesize(&self, prompt: &str, output_path: &Path, cancel: &CancelToken) -> ProviderResult<()>;
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
    sequential_image_generation: &'a str,
    response_format: &'a str,
    size: &'a str,
    stream: bool,
    watermark: bool,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
    b64_json: Option<String>,
}

enum ImagePayload {
    Url(String),
    Inline(Vec<u8>),
}

/// [`ImageSynthesizer`] for Volcengine Ark image generation.
pub struct VolcengineImageClient {
    client: Client,
    config: ImageConfig,
    policy: RetryPolicy,
    download_policy: RetryPolicy,
}

impl VolcengineImageClient {
    pub fn new(client: Client, config: ImageConfig) -> ProviderResult<Self> {
        config.validate()?;
        Ok(Self {
            client,
            config,
            policy: RetryPolicy::image(),
            download_policy: RetryPolicy::general(),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_download_policy(mut self, policy: RetryPolicy) -> Self {
        self.download_policy = policy;
        self
    }

    fn build_request(&self, prompt: &str) -> ProviderResult<Request> {
        let body = ImageRequest {
            model: &self.config.model,
            prompt,
            seed: self.config.seed,
            sequential_image_generation: &self.config.sequential_image_generation,
            response_format: &self.config.response_format,
            size: &self.config.size,
            stream: false,
            watermark: self.config.watermark,
        };
        Ok(self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .build()?)
    }

    /// One generation attempt: send, check status, pick the first image.
    async fn request_payload(&self, request: &Request) -> ProviderResult<ImagePayload> {
        let attempt = request
            .try_clone()
            .ok_or_else(|| ProviderError::config("request body is not cloneable"))?;
        let response = ensure_success(self.client.execute(attempt).await?).await?;
        let parsed: ImageResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::malformed(format!("image payload: {}", e)))?;

        let first = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::empty_response("image data list is empty"))?;

        if self.config.response_format == "url" {
            first
                .url
                .filter(|u| !u.is_empty())
                .map(ImagePayload::Url)
                .ok_or_else(|| ProviderError::empty_response("image url is empty"))
        } else {
            let encoded = first
                .b64_json
                .filter(|b| !b.is_empty())
                .ok_or_else(|| ProviderError::empty_response("b64_json is empty"))?;
            BASE64
                .decode(encoded.trim())
                .map(ImagePayload::Inline)
                .map_err(|e| ProviderError::malformed(format!("b64_json: {}", e)))
        }
    }

    async fn download(&self, url: &str, cancel: &CancelToken) -> ProviderResult<Vec<u8>> {
        debug!(url, "Downloading generated image");
        let request = self.client.get(url).build()?;
        let response = send_with_retry(&self.client, &request, &self.download_policy, cancel).await?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ProviderError::empty_response("downloaded image is empty"));
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ImageSynthesizer for VolcengineImageClient {
    async fn synthesize(&self, prompt: &str, output_path: &Path, cancel: &CancelToken) -> ProviderResult<()> {
        debug!(prompt = %preview(prompt, 50), "Generating image");
        let request = self.build_request(prompt)?;
        let request = &request;

        let payload = retry_async(&self.policy, cancel, move |_| self.request_payload(request)).await?;
        let bytes = match payload {
            ImagePayload::Url(url) => self.download(&url, cancel).await?,
            ImagePayload::Inline(bytes) => bytes,
        };

        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output_path, &bytes).await?;

        info!(path = %output_path.display(), bytes = bytes.len(), "Image generated");
        Ok(())
    }
}

/// First `max_chars` characters of `text` for log lines.
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer, response_format: &str) -> ImageConfig {
        ImageConfig {
            api_key: "img-key".into(),
            endpoint: format!("{}/images/generations", server.uri()),
            response_format: response_format.into(),
            seed: Some(42),
            ..Default::default()
        }
    }

    fn client(config: ImageConfig) -> VolcengineImageClient {
        let fast = Duration::from_millis(1);
        VolcengineImageClient::new(Client::new(), config)
            .unwrap()
            .with_retry_policy(RetryPolicy::image().with_base_delay(fast))
            .with_download_policy(RetryPolicy::general().with_base_delay(fast))
    }

    #[tokio::test]
    async fn test_url_response_is_downloaded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .and(body_partial_json(json!({
                "prompt": "a lighthouse",
                "seed": 42,
                "response_format": "url",
                "size": "2K",
                "stream": false,
                "watermark": true,
                "sequential_image_generation": "disabled"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"url": format!("{}/files/1.png", server.uri())}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/1.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PNGDATA".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("scene_001.png");
        client(config(&server, "url"))
            .synthesize("a lighthouse", &out, &CancelToken::never())
            .await
            .unwrap();

        assert_eq!(std::fs::read(&out).unwrap(), b"PNGDATA");
    }

    #[tokio::test]
    async fn test_inline_base64_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"b64_json": BASE64.encode(b"inline image")}]
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("scene_002.png");
        client(config(&server, "b64_json"))
            .synthesize("prompt", &out, &CancelToken::never())
            .await
            .unwrap();

        assert_eq!(std::fs::read(&out).unwrap(), b"inline image");
    }

    #[tokio::test]
    async fn test_rate_limit_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"b64_json": BASE64.encode(b"ok")}]
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("scene_003.png");
        client(config(&server, "b64_json"))
            .synthesize("prompt", &out, &CancelToken::never())
            .await
            .unwrap();

        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_data_exhausts_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .expect(4)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = client(config(&server, "url"))
            .synthesize("prompt", &dir.path().join("x.png"), &CancelToken::never())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::EmptyResponse(_)));
    }

    #[test]
    fn test_seed_omitted_when_unset() {
        let body = ImageRequest {
            model: "m",
            prompt: "p",
            seed: None,
            sequential_image_generation: "disabled",
            response_format: "url",
            size: "2K",
            stream: false,
            watermark: false,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert!(value.get("seed").is_none());
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        assert_eq!(preview("月光下的城堡", 3), "月光下...");
        assert_eq!(preview("short", 50), "short");
    }
}
