//! Text generation over a responses-style API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use storyreel_models::CancelToken;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::retry::{send_with_retry, RetryPolicy};

/// Single-shot text generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        cancel: &CancelToken,
    ) -> ProviderResult<String>;
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: Vec<InputMessage>,
    thinking: Thinking,
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct InputMessage {
    role: &'static str,
    content: Vec<InputContent>,
}

#[derive(Debug, Serialize)]
struct InputContent {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
}

#[derive(Debug, Serialize)]
struct Thinking {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output: Vec<OutputMessage>,
}

#[derive(Debug, Deserialize)]
struct OutputMessage {
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

/// [`TextGenerator`] for Ark-style `/responses` endpoints.
///
/// The endpoint has no system role, so the system prompt is prepended to
/// the user text.
pub struct ResponsesClient {
    client: Client,
    config: LlmConfig,
    policy: RetryPolicy,
}

impl ResponsesClient {
    pub fn new(client: Client, config: LlmConfig) -> ProviderResult<Self> {
        config.validate()?;
        Ok(Self {
            client,
            config,
            policy: RetryPolicy::general(),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl TextGenerator for ResponsesClient {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        cancel: &CancelToken,
    ) -> ProviderResult<String> {
        let body = ResponsesRequest {
            model: &self.config.model,
            input: vec![InputMessage {
                role: "user",
                content: vec![InputContent {
                    kind: "input_text",
                    text: format!("{}\n\n{}", system_prompt, user_prompt),
                }],
            }],
            thinking: Thinking { kind: "disabled" },
            temperature: self.config.temperature,
            max_output_tokens: self.config.max_tokens,
        };

        let request = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .build()?;

        debug!(model = %self.config.model, "Sending text generation request");
        let response = send_with_retry(&self.client, &request, &self.policy, cancel).await?;
        let parsed: ResponsesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::malformed(format!("responses payload: {}", e)))?;

        let message = parsed
            .output
            .first()
            .ok_or_else(|| ProviderError::empty_response("no output messages"))?;

        let text = message
            .content
            .iter()
            .filter(|c| c.kind == "output_text")
            .filter_map(|c| c.text.as_deref())
            .find(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::empty_response("no output_text content"))?;

        debug!(chars = text.chars().count(), "Received text generation response");
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ResponsesClient {
        let config = LlmConfig {
            api_key: "test-key".into(),
            endpoint: format!("{}/api/v3/responses", server.uri()),
            ..Default::default()
        };
        ResponsesClient::new(Client::new(), config)
            .unwrap()
            .with_retry_policy(RetryPolicy::general().with_base_delay(Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn test_generate_combines_prompts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v3/responses"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output": [{
                    "type": "message",
                    "content": [
                        {"type": "reasoning", "text": "ignored"},
                        {"type": "output_text", "text": "{\"scenes\": []}"}
                    ]
                }]
            })))
            .mount(&server)
            .await;

        let text = client(&server)
            .generate("SYSTEM", "STORY", &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(text, "{\"scenes\": []}");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["input"][0]["role"], "user");
        assert_eq!(body["input"][0]["content"][0]["type"], "input_text");
        assert_eq!(body["input"][0]["content"][0]["text"], "SYSTEM\n\nSTORY");
        assert_eq!(body["thinking"]["type"], "disabled");
    }

    #[tokio::test]
    async fn test_empty_output_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "output": [] })))
            .mount(&server)
            .await;

        let err = client(&server)
            .generate("s", "u", &CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse(_)));
    }

    #[tokio::test]
    async fn test_server_errors_retried_linearly() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server)
            .generate("s", "u", &CancelToken::never())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_missing_key_rejected() {
        let result = ResponsesClient::new(Client::new(), LlmConfig::default());
        assert!(matches!(result, Err(ProviderError::Config(_))));
    }
}
