//! FFprobe duration probing.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use storyreel_models::CancelToken;
use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Measures the exact playtime of a generated audio file.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    async fn audio_duration(&self, path: &Path, cancel: &CancelToken) -> MediaResult<Duration>;
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    duration: Option<String>,
}

/// [`DurationProbe`] backed by the `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeDurationProbe {
    ffprobe: PathBuf,
}

impl FfprobeDurationProbe {
    pub fn new(ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }

    /// Container duration of any media file.
    pub async fn media_duration(&self, path: &Path, cancel: &CancelToken) -> MediaResult<Duration> {
        let probe = self.probe(path, cancel).await?;
        probe
            .format
            .duration
            .as_deref()
            .and_then(parse_duration_secs)
            .ok_or_else(|| MediaError::invalid_media(format!("no duration for {}", path.display())))
    }

    async fn probe(&self, path: &Path, cancel: &CancelToken) -> MediaResult<FfprobeOutput> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }

        let mut command = Command::new(&self.ffprobe);
        command
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = cancel
            .run_until_cancelled(command.output())
            .await
            .ok_or(MediaError::Cancelled)?
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => MediaError::FfprobeNotFound,
                _ => MediaError::Io(e),
            })?;

        if !output.status.success() {
            return Err(MediaError::ffprobe_failed(
                format!("FFprobe failed for {}", path.display()),
                Some(String::from_utf8_lossy(&output.stderr).to_string()),
            ));
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

#[async_trait]
impl DurationProbe for FfprobeDurationProbe {
    async fn audio_duration(&self, path: &Path, cancel: &CancelToken) -> MediaResult<Duration> {
        let probe = self.probe(path, cancel).await?;

        // Prefer the audio stream's own duration; containers may pad.
        let duration = probe
            .streams
            .iter()
            .filter(|s| s.codec_type == "audio")
            .find_map(|s| s.duration.as_deref().and_then(parse_duration_secs))
            .or_else(|| probe.format.duration.as_deref().and_then(parse_duration_secs))
            .ok_or_else(|| {
                MediaError::invalid_media(format!("no audio duration for {}", path.display()))
            })?;

        debug!(path = %path.display(), duration_ms = duration.as_millis() as u64, "Probed audio duration");
        Ok(duration)
    }
}

/// Parse FFprobe's decimal seconds (`"2.500000"`) exactly, down to nanoseconds.
fn parse_duration_secs(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let secs: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let nanos = frac
        .bytes()
        .take(9)
        .chain(std::iter::repeat(b'0'))
        .take(9)
        .fold(0u32, |acc, b| acc * 10 + u32::from(b - b'0'));

    Some(Duration::new(secs, nanos))
}
