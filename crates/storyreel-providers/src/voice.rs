//! Voice synthesis.
//!
//! Both providers answer with JSON carrying the encoded audio inline:
//! MiniMax as hex, Volcengine as base64. Decoded bytes are written verbatim.

use std::path::Path;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::{Client, Request};
use serde::{Deserialize, Serialize};
use storyreel_models::CancelToken;
use tracing::{debug, error, info};

use crate::config::{MiniMaxConfig, VolcengineTtsConfig};
use crate::error::{ProviderError, ProviderResult};
use crate::image::preview;
use crate::retry::{send_with_retry, RetryPolicy};

/// Volcengine's success code.
const VOLC_SUCCESS: i64 = 3000;

/// Narrates one scene's text to an audio file.
#[async_trait]
pub trait VoiceSynthesizer: Send + Sync {
    /// Extension for files written by this synthesizer.
    fn extension(&self) -> &str;

    async fn synthesize(&self, text: &str, output_path: &Path, cancel: &CancelToken) -> ProviderResult<()>;
}

async fn write_audio(output_path: &Path, bytes: &[u8]) -> ProviderResult<()> {
    if let Some(parent) = output_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(output_path, bytes).await?;
    info!(path = %output_path.display(), bytes = bytes.len(), "Voice generated");
    Ok(())
}

async fn send_json<T: for<'de> Deserialize<'de>>(
    client: &Client,
    request: &Request,
    policy: &RetryPolicy,
    cancel: &CancelToken,
) -> ProviderResult<T> {
    let response = send_with_retry(client, request, policy, cancel).await?;
    response
        .json()
        .await
        .map_err(|e| ProviderError::malformed(format!("voice payload: {}", e)))
}

// MiniMax

#[derive(Debug, Serialize)]
struct MiniMaxRequest<'a> {
    model: &'a str,
    text: &'a str,
    stream: bool,
    voice_setting: VoiceSetting<'a>,
    audio_setting: AudioSetting<'a>,
    subtitle_enable: bool,
}

#[derive(Debug, Serialize)]
struct VoiceSetting<'a> {
    voice_id: &'a str,
    speed: f32,
    vol: f32,
    pitch: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    emotion: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct AudioSetting<'a> {
    sample_rate: u32,
    bitrate: u32,
    format: &'a str,
    channel: u8,
}

#[derive(Debug, Deserialize)]
struct MiniMaxResponse {
    base_resp: Option<BaseResp>,
    data: Option<MiniMaxAudio>,
}

#[derive(Debug, Deserialize)]
struct BaseResp {
    status_code: i64,
    #[serde(default)]
    status_msg: String,
}

#[derive(Debug, Deserialize)]
struct MiniMaxAudio {
    audio: Option<String>,
}

/// [`VoiceSynthesizer`] for MiniMax `t2a_v2`.
pub struct MiniMaxVoice {
    client: Client,
    config: MiniMaxConfig,
    policy: RetryPolicy,
}

impl MiniMaxVoice {
    pub fn new(client: Client, config: MiniMaxConfig) -> ProviderResult<Self> {
        config.validate()?;
        Ok(Self {
            client,
            config,
            policy: RetryPolicy::voice(),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn build_request(&self, text: &str) -> ProviderResult<Request> {
        let body = MiniMaxRequest {
            model: &self.config.model,
            text,
            stream: false,
            voice_setting: VoiceSetting {
                voice_id: &self.config.voice_id,
                speed: self.config.speed,
                vol: self.config.volume,
                pitch: self.config.pitch,
                emotion: self.config.emotion.as_deref(),
            },
            audio_setting: AudioSetting {
                sample_rate: self.config.sample_rate,
                bitrate: self.config.bitrate,
                format: &self.config.format,
                channel: self.config.channel,
            },
            subtitle_enable: false,
        };
        Ok(self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .build()?)
    }
}

#[async_trait]
impl VoiceSynthesizer for MiniMaxVoice {
    fn extension(&self) -> &str {
        &self.config.format
    }

    async fn synthesize(&self, text: &str, output_path: &Path, cancel: &CancelToken) -> ProviderResult<()> {
        debug!(text = %preview(text, 30), "Generating voice with MiniMax");
        let request = self.build_request(text)?;
        let parsed: MiniMaxResponse = send_json(&self.client, &request, &self.policy, cancel).await?;

        if let Some(base) = parsed.base_resp.filter(|b| b.status_code != 0) {
            error!(code = base.status_code, "MiniMax rejected the request: {}", base.status_msg);
            return Err(ProviderError::Api {
                code: base.status_code,
                message: base.status_msg,
            });
        }

        let audio = parsed
            .data
            .and_then(|d| d.audio)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| ProviderError::empty_response("MiniMax returned no audio"))?;

        let bytes = decode_hex(&audio)?;
        write_audio(output_path, &bytes).await
    }
}

/// Decode a hex string, either case.
fn decode_hex(raw: &str) -> ProviderResult<Vec<u8>> {
    hex::decode(raw.trim()).map_err(|e| ProviderError::malformed(format!("hex audio: {}", e)))
}

// Volcengine

#[derive(Debug, Serialize)]
struct VolcRequest<'a> {
    app: VolcApp<'a>,
    user: VolcUser<'a>,
    audio: VolcAudio<'a>,
    request: VolcRequestInfo<'a>,
}

#[derive(Debug, Serialize)]
struct VolcApp<'a> {
    appid: &'a str,
    /// Placeholder; the real token travels in the Authorization header.
    token: &'static str,
    cluster: &'a str,
}

#[derive(Debug, Serialize)]
struct VolcUser<'a> {
    uid: &'a str,
}

#[derive(Debug, Serialize)]
struct VolcAudio<'a> {
    voice_type: &'a str,
    encoding: &'a str,
    speed_ratio: f32,
    volume_ratio: f32,
    pitch_ratio: f32,
}

#[derive(Debug, Serialize)]
struct VolcRequestInfo<'a> {
    reqid: String,
    text: &'a str,
    text_type: &'static str,
    operation: &'static str,
    with_frontend: u8,
    frontend_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct VolcResponse {
    data: Option<String>,
    code: Option<i64>,
    message: Option<String>,
}

/// [`VoiceSynthesizer`] for the Volcengine HTTP TTS API.
pub struct VolcengineVoice {
    client: Client,
    config: VolcengineTtsConfig,
    policy: RetryPolicy,
}

impl VolcengineVoice {
    pub fn new(client: Client, config: VolcengineTtsConfig) -> ProviderResult<Self> {
        config.validate()?;
        Ok(Self {
            client,
            config,
            policy: RetryPolicy::voice(),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn build_request(&self, text: &str) -> ProviderResult<Request> {
        let body = VolcRequest {
            app: VolcApp {
                appid: &self.config.app_id,
                token: "access_token",
                cluster: &self.config.cluster,
            },
            user: VolcUser {
                uid: &self.config.user_id,
            },
            audio: VolcAudio {
                voice_type: &self.config.voice_type,
                encoding: &self.config.encoding,
                speed_ratio: self.config.speed_ratio,
                volume_ratio: self.config.volume_ratio,
                pitch_ratio: self.config.pitch_ratio,
            },
            request: VolcRequestInfo {
                reqid: uuid::Uuid::new_v4().to_string(),
                text,
                text_type: "plain",
                operation: "query",
                with_frontend: 1,
                frontend_type: "unitTson",
            },
        };
        Ok(self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .build()?)
    }
}

#[async_trait]
impl VoiceSynthesizer for VolcengineVoice {
    fn extension(&self) -> &str {
        &self.config.encoding
    }

    async fn synthesize(&self, text: &str, output_path: &Path, cancel: &CancelToken) -> ProviderResult<()> {
        debug!(text = %preview(text, 30), "Generating voice with Volcengine");
        let request = self.build_request(text)?;
        let parsed: VolcResponse = send_json(&self.client, &request, &self.policy, cancel).await?;

        let data = match parsed.data.filter(|d| !d.is_empty()) {
            Some(data) => data,
            None => {
                return Err(match parsed.code {
                    Some(code) if code != VOLC_SUCCESS => ProviderError::Api {
                        code,
                        message: parsed.message.unwrap_or_default(),
                    },
                    _ => ProviderError::empty_response("Volcengine returned no audio"),
                });
            }
        };

        let bytes = BASE64
            .decode(data.trim())
            .map_err(|e| ProviderError::malformed(format!("base64 audio: {}", e)))?;
        write_audio(output_path, &bytes).await
    }
}
