//! Provider configuration.
//!
//! Each struct has working defaults for everything except credentials and
//! is loaded from environment variables by `from_env()`.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, ProviderResult};

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_optional<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .and_then(|s| s.trim().parse().ok())
}

fn require(value: &str, name: &str) -> ProviderResult<()> {
    if value.trim().is_empty() {
        Err(ProviderError::config(format!("{} not set", name)))
    } else {
        Ok(())
    }
}

/// Text generation (responses-style API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "doubao-seed-1-6-251015".to_string(),
            endpoint: "https://ark.cn-beijing.volces.com/api/v3/responses".to_string(),
            temperature: 0.7,
            max_tokens: 4000,
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            api_key: env_string("LLM_API_KEY", &d.api_key),
            model: env_string("LLM_MODEL", &d.model),
            endpoint: env_string("LLM_ENDPOINT", &d.endpoint),
            temperature: env_parse("LLM_TEMPERATURE", d.temperature),
            max_tokens: env_parse("LLM_MAX_TOKENS", d.max_tokens),
        }
    }

    pub fn validate(&self) -> ProviderResult<()> {
        require(&self.api_key, "LLM_API_KEY")
    }
}

/// Image generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub seed: Option<i64>,
    /// Provider size token, e.g. "2K" or "1920x1080"
    pub size: String,
    /// `url` or `b64_json`
    pub response_format: String,
    pub watermark: bool,
    /// `disabled` or `auto`
    pub sequential_image_generation: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: "https://ark.cn-beijing.volces.com/api/v3/images/generations".to_string(),
            model: "doubao-seedream-4-5-251128".to_string(),
            seed: None,
            size: "2K".to_string(),
            response_format: "url".to_string(),
            watermark: true,
            sequential_image_generation: "disabled".to_string(),
        }
    }
}

impl ImageConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            api_key: env_string("IMAGE_API_KEY", &d.api_key),
            endpoint: env_string("IMAGE_ENDPOINT", &d.endpoint),
            model: env_string("IMAGE_MODEL", &d.model),
            seed: env_optional("IMAGE_SEED"),
            size: env_string("IMAGE_SIZE", &d.size),
            response_format: env_string("IMAGE_RESPONSE_FORMAT", &d.response_format),
            watermark: env_parse("IMAGE_WATERMARK", d.watermark),
            sequential_image_generation: env_string(
                "IMAGE_SEQUENTIAL_GENERATION",
                &d.sequential_image_generation,
            ),
        }
    }

    pub fn validate(&self) -> ProviderResult<()> {
        require(&self.api_key, "IMAGE_API_KEY")?;
        match self.response_format.as_str() {
            "url" | "b64_json" => Ok(()),
            other => Err(ProviderError::config(format!(
                "IMAGE_RESPONSE_FORMAT must be url or b64_json, got {}",
                other
            ))),
        }
    }
}

/// MiniMax text-to-speech.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiniMaxConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub voice_id: String,
    pub speed: f32,
    pub volume: f32,
    pub pitch: i32,
    pub emotion: Option<String>,
    pub sample_rate: u32,
    pub bitrate: u32,
    /// Audio container, also used as the file extension
    pub format: String,
    pub channel: u8,
}

impl Default for MiniMaxConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: "https://api.minimaxi.com/v1/t2a_v2".to_string(),
            model: "speech-2.6-hd".to_string(),
            voice_id: "male-qn-qingse".to_string(),
            speed: 1.0,
            volume: 1.0,
            pitch: 0,
            emotion: None,
            sample_rate: 32000,
            bitrate: 128000,
            format: "mp3".to_string(),
            channel: 1,
        }
    }
}

impl MiniMaxConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            api_key: env_string("MINIMAX_API_KEY", &d.api_key),
            endpoint: env_string("MINIMAX_ENDPOINT", &d.endpoint),
            model: env_string("MINIMAX_MODEL", &d.model),
            voice_id: env_string("MINIMAX_VOICE_ID", &d.voice_id),
            speed: env_parse("MINIMAX_SPEED", d.speed),
            volume: env_parse("MINIMAX_VOLUME", d.volume),
            pitch: env_parse("MINIMAX_PITCH", d.pitch),
            emotion: env_optional("MINIMAX_EMOTION"),
            sample_rate: env_parse("MINIMAX_SAMPLE_RATE", d.sample_rate),
            bitrate: env_parse("MINIMAX_BITRATE", d.bitrate),
            format: env_string("MINIMAX_FORMAT", &d.format),
            channel: env_parse("MINIMAX_CHANNEL", d.channel),
        }
    }

    pub fn validate(&self) -> ProviderResult<()> {
        require(&self.api_key, "MINIMAX_API_KEY")
    }
}

/// Volcengine text-to-speech.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolcengineTtsConfig {
    pub app_id: String,
    pub access_token: String,
    pub cluster: String,
    pub endpoint: String,
    pub voice_type: String,
    /// Audio encoding, also used as the file extension
    pub encoding: String,
    pub speed_ratio: f32,
    pub volume_ratio: f32,
    pub pitch_ratio: f32,
    pub user_id: String,
}

impl Default for VolcengineTtsConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            access_token: String::new(),
            cluster: "volcano_tts".to_string(),
            endpoint: "https://openspeech.bytedance.com/api/v1/tts".to_string(),
            voice_type: "zh_female_qingxin".to_string(),
            encoding: "mp3".to_string(),
            speed_ratio: 1.0,
            volume_ratio: 1.0,
            pitch_ratio: 1.0,
            user_id: "default_user".to_string(),
        }
    }
}

impl VolcengineTtsConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            app_id: env_string("VOLC_TTS_APP_ID", &d.app_id),
            access_token: env_string("VOLC_TTS_ACCESS_TOKEN", &d.access_token),
            cluster: env_string("VOLC_TTS_CLUSTER", &d.cluster),
            endpoint: env_string("VOLC_TTS_ENDPOINT", &d.endpoint),
            voice_type: env_string("VOLC_TTS_VOICE_TYPE", &d.voice_type),
            encoding: env_string("VOLC_TTS_ENCODING", &d.encoding),
            speed_ratio: env_parse("VOLC_TTS_SPEED_RATIO", d.speed_ratio),
            volume_ratio: env_parse("VOLC_TTS_VOLUME_RATIO", d.volume_ratio),
            pitch_ratio: env_parse("VOLC_TTS_PITCH_RATIO", d.pitch_ratio),
            user_id: env_string("VOLC_TTS_USER_ID", &d.user_id),
        }
    }

    pub fn validate(&self) -> ProviderResult<()> {
        require(&self.app_id, "VOLC_TTS_APP_ID")?;
        require(&self.access_token, "VOLC_TTS_ACCESS_TOKEN")?;
        require(&self.cluster, "VOLC_TTS_CLUSTER")
    }
}

/// Which voice provider narrates the scenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceProvider {
    #[default]
    MiniMax,
    Volcengine,
}

impl FromStr for VoiceProvider {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimax" => Ok(Self::MiniMax),
            "volcengine" | "volc" => Ok(Self::Volcengine),
            other => Err(ProviderError::config(format!("unknown VOICE_PROVIDER: {}", other))),
        }
    }
}

impl VoiceProvider {
    /// Read `VOICE_PROVIDER`, defaulting to MiniMax when unset.
    pub fn from_env() -> ProviderResult<Self> {
        match std::env::var("VOICE_PROVIDER") {
            Ok(value) if !value.trim().is_empty() => value.parse(),
            _ => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_need_credentials() {
        assert!(LlmConfig::default().validate().is_err());
        assert!(MiniMaxConfig::default().validate().is_err());
        assert!(VolcengineTtsConfig::default().validate().is_err());

        let image = ImageConfig {
            api_key: "key".into(),
            ..Default::default()
        };
        assert!(image.validate().is_ok());
    }

    #[test]
    fn test_image_response_format_checked() {
        let image = ImageConfig {
            api_key: "key".into(),
            response_format: "png".into(),
            ..Default::default()
        };
        assert!(matches!(image.validate(), Err(ProviderError::Config(_))));
    }

    #[test]
    fn test_voice_provider_parse() {
        assert_eq!("MiniMax".parse::<VoiceProvider>().unwrap(), VoiceProvider::MiniMax);
        assert_eq!(" volcengine ".parse::<VoiceProvider>().unwrap(), VoiceProvider::Volcengine);
        assert!("espeak".parse::<VoiceProvider>().is_err());
    }
}
