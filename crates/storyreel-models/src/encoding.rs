//! Video encoding configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default CRF (Constant Rate Factor)
pub const DEFAULT_CRF: u8 = 23;
/// Default output frame rate
pub const DEFAULT_FRAME_RATE: u32 = 24;
/// Default pixel format
pub const DEFAULT_PIXEL_FORMAT: &str = "yuv420p";

/// Canonical output resolution; every segment is letterboxed to this.
pub const CANVAS_WIDTH: u32 = 1920;
pub const CANVAS_HEIGHT: u32 = 1080;

/// Burned-in subtitle style (ASS `force_style` syntax).
pub const DEFAULT_SUBTITLE_STYLE: &str =
    "FontSize=24,PrimaryColour=&HFFFFFF,OutlineColour=&H000000,Outline=2";

/// Video encoding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// Video codec (e.g., "libx264")
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Audio codec
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Constant Rate Factor (quality, 0-51, lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    /// Output frame rate
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    /// Style applied when burning captions
    #[serde(default = "default_subtitle_style")]
    pub subtitle_style: String,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}
fn default_frame_rate() -> u32 {
    DEFAULT_FRAME_RATE
}
fn default_pixel_format() -> String {
    DEFAULT_PIXEL_FORMAT.to_string()
}
fn default_width() -> u32 {
    CANVAS_WIDTH
}
fn default_height() -> u32 {
    CANVAS_HEIGHT
}
fn default_subtitle_style() -> String {
    DEFAULT_SUBTITLE_STYLE.to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: default_video_codec(),
            audio_codec: default_audio_codec(),
            crf: DEFAULT_CRF,
            frame_rate: DEFAULT_FRAME_RATE,
            pixel_format: default_pixel_format(),
            width: CANVAS_WIDTH,
            height: CANVAS_HEIGHT,
            subtitle_style: default_subtitle_style(),
        }
    }
}

impl EncodingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new config with updated CRF.
    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = crf.min(51);
        self
    }

    /// Returns a new config with updated frame rate.
    pub fn with_frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = frame_rate.max(1);
        self
    }

    /// Scale-then-pad filter that letterboxes any source image onto the canvas.
    pub fn letterbox_filter(&self) -> String {
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1",
            w = self.width,
            h = self.height
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_filter() {
        let config = EncodingConfig::default();
        assert_eq!(
            config.letterbox_filter(),
            "scale=1920:1080:force_original_aspect_ratio=decrease,pad=1920:1080:(ow-iw)/2:(oh-ih)/2,setsar=1"
        );
    }

    #[test]
    fn test_builders_clamp() {
        let config = EncodingConfig::new().with_crf(80).with_frame_rate(0);
        assert_eq!(config.crf, 51);
        assert_eq!(config.frame_rate, 1);
    }
}
