//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use storyreel_media::{FfmpegBinaries, FfmpegVideoComposer};
use storyreel_models::EncodingConfig;
use storyreel_providers::{ImageConfig, LlmConfig, MiniMaxConfig, VoiceProvider, VolcengineTtsConfig};

use crate::error::{WorkerError, WorkerResult};

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Pipeline-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Used when a project has no visual style of its own
    pub default_visual_style: String,
    /// Character sheet appended to every visual prompt; empty disables it
    pub character_prompt: String,
    /// Root for per-run composition scratch directories
    pub temp_dir: PathBuf,
    /// Root for per-project output directories
    pub output_dir: PathBuf,
    pub frame_rate: u32,
    pub crf: u8,
    /// Directory holding ffmpeg/ffprobe; `PATH` when unset
    pub ffmpeg_dir: Option<PathBuf>,
    /// Kill any single FFmpeg pass running longer than this; unset or 0 disables it
    pub ffmpeg_timeout_secs: Option<u64>,
    /// Maximum simultaneous image generation calls
    pub image_concurrency: usize,
    pub demo_title: String,
    pub demo_story: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_visual_style: "Cinematic, high quality, detailed, professional lighting".to_string(),
            character_prompt: String::new(),
            temp_dir: PathBuf::from("./temp"),
            output_dir: PathBuf::from("./output"),
            frame_rate: 24,
            crf: 23,
            ffmpeg_dir: None,
            ffmpeg_timeout_secs: None,
            image_concurrency: 3,
            demo_title: "Demo Project".to_string(),
            demo_story: "This is a demo story.".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            default_visual_style: env_string("PIPELINE_VISUAL_STYLE", &d.default_visual_style),
            character_prompt: env_string("PIPELINE_CHARACTER_PROMPT", &d.character_prompt),
            temp_dir: std::env::var("PIPELINE_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.temp_dir),
            output_dir: std::env::var("PIPELINE_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.output_dir),
            frame_rate: env_parse("PIPELINE_FRAME_RATE", d.frame_rate),
            crf: env_parse("PIPELINE_CRF", d.crf),
            ffmpeg_dir: std::env::var("FFMPEG_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            ffmpeg_timeout_secs: Some(env_parse("FFMPEG_TIMEOUT_SECS", 0u64))
                .filter(|&secs| secs > 0),
            image_concurrency: env_parse("PIPELINE_IMAGE_CONCURRENCY", d.image_concurrency),
            demo_title: env_string("DEMO_TITLE", &d.demo_title),
            demo_story: env_string("DEMO_STORY", &d.demo_story),
        }
    }

    pub fn validate(&self) -> WorkerResult<()> {
        if self.image_concurrency == 0 {
            return Err(WorkerError::config_error("PIPELINE_IMAGE_CONCURRENCY must be at least 1"));
        }
        if self.frame_rate == 0 {
            return Err(WorkerError::config_error("PIPELINE_FRAME_RATE must be at least 1"));
        }
        if self.crf > 51 {
            return Err(WorkerError::config_error("PIPELINE_CRF must be between 0 and 51"));
        }
        Ok(())
    }

    pub fn encoding(&self) -> EncodingConfig {
        EncodingConfig::default()
            .with_frame_rate(self.frame_rate)
            .with_crf(self.crf)
    }

    /// Composer writing scratch files under `temp_dir`.
    pub fn composer(&self, binaries: FfmpegBinaries) -> FfmpegVideoComposer {
        let composer = FfmpegVideoComposer::new(binaries, self.encoding(), &self.temp_dir);
        match self.ffmpeg_timeout_secs {
            Some(secs) => composer.with_timeout(secs),
            None => composer,
        }
    }
}

/// Everything the binary needs to wire a production run.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub pipeline: PipelineConfig,
    pub llm: LlmConfig,
    pub image: ImageConfig,
    pub voice_provider: VoiceProvider,
    pub minimax: MiniMaxConfig,
    pub volcengine_tts: VolcengineTtsConfig,
}

impl WorkerConfig {
    /// Load from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        Ok(Self {
            pipeline: PipelineConfig::from_env(),
            llm: LlmConfig::from_env(),
            image: ImageConfig::from_env(),
            voice_provider: VoiceProvider::from_env()?,
            minimax: MiniMaxConfig::from_env(),
            volcengine_tts: VolcengineTtsConfig::from_env(),
        })
    }

    /// Check the settings the selected providers depend on.
    pub fn validate(&self) -> WorkerResult<()> {
        self.pipeline.validate()?;
        self.llm.validate()?;
        self.image.validate()?;
        match self.voice_provider {
            VoiceProvider::MiniMax => self.minimax.validate()?,
            VoiceProvider::Volcengine => self.volcengine_tts.validate()?,
        }
        Ok(())
    }
}
