//! Final video assembly.
//!
//! Three FFmpeg passes, all inside a per-run temp directory:
//! 1. one MPEG-TS segment per scene, the still image held for exactly the
//!    probed audio duration and letterboxed onto the canvas
//! 2. concat-demuxer join of the segments in scene order, stream copy only
//! 3. one re-encode of the joined file that burns in the caption track
//!
//! The temp directory is removed on every exit path. If the compose future
//! is dropped mid-run, `TempDir`'s destructor removes it instead.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use storyreel_models::{sort_by_scene_index, CancelToken, EncodingConfig, GeneratedAsset};
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

use crate::command::{FfmpegBinaries, FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::move_file;
use crate::probe::FfprobeDurationProbe;

/// Assembles ordered assets and a caption file into one video.
#[async_trait]
pub trait VideoComposer: Send + Sync {
    /// Returns the path of the written video.
    async fn compose(
        &self,
        assets: &[GeneratedAsset],
        subtitle_path: &Path,
        output_path: &Path,
        cancel: &CancelToken,
    ) -> MediaResult<PathBuf>;
}

/// [`VideoComposer`] driving the FFmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegVideoComposer {
    binaries: FfmpegBinaries,
    encoding: EncodingConfig,
    temp_root: PathBuf,
    timeout_secs: Option<u64>,
}

impl FfmpegVideoComposer {
    pub fn new(binaries: FfmpegBinaries, encoding: EncodingConfig, temp_root: impl Into<PathBuf>) -> Self {
        Self {
            binaries,
            encoding,
            temp_root: temp_root.into(),
            timeout_secs: None,
        }
    }

    /// Kill any single FFmpeg pass that runs longer than `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn encoding(&self) -> &EncodingConfig {
        &self.encoding
    }

    pub fn timeout_secs(&self) -> Option<u64> {
        self.timeout_secs
    }

    fn runner(&self, cancel: &CancelToken) -> FfmpegRunner {
        let runner = FfmpegRunner::new(&self.binaries.ffmpeg).with_cancel(cancel.clone());
        match self.timeout_secs {
            Some(secs) => runner.with_timeout(secs),
            None => runner,
        }
    }

    /// Segment for one scene: image held for `audio_duration`, audio attached.
    pub fn segment_command(&self, asset: &GeneratedAsset, segment_path: &Path) -> FfmpegCommand {
        let enc = &self.encoding;
        FfmpegCommand::new(segment_path)
            .looped_image(&asset.image_path, asset.audio_duration)
            .input(&asset.audio_path)
            .map("0:v:0")
            .map("1:a:0")
            .video_filter(enc.letterbox_filter())
            .video_codec(&enc.codec)
            .audio_codec(&enc.audio_codec)
            .frame_rate(enc.frame_rate)
            .crf(enc.crf)
            .pixel_format(&enc.pixel_format)
            .shortest()
            .format("mpegts")
    }

    /// Join segments listed in `list_path` without re-encoding.
    pub fn concat_command(&self, list_path: &Path, merged_path: &Path) -> FfmpegCommand {
        FfmpegCommand::new(merged_path)
            .concat_list(list_path)
            .codec_copy()
            .faststart()
    }

    /// Single re-encode that burns the captions into the picture.
    pub fn burn_command(&self, merged_path: &Path, subtitle_path: &Path, output_path: &Path) -> FfmpegCommand {
        let enc = &self.encoding;
        FfmpegCommand::new(output_path)
            .input(merged_path)
            .video_filter(subtitle_filter(subtitle_path, &enc.subtitle_style))
            .video_codec(&enc.codec)
            .audio_codec(&enc.audio_codec)
            .crf(enc.crf)
            .pixel_format(&enc.pixel_format)
            .faststart()
    }

    async fn compose_in(
        &self,
        work_dir: &Path,
        assets: &[GeneratedAsset],
        subtitle_path: &Path,
        output_path: &Path,
        cancel: &CancelToken,
    ) -> MediaResult<PathBuf> {
        let runner = self.runner(cancel);
        let mut segments = Vec::with_capacity(assets.len());

        for (i, asset) in assets.iter().enumerate() {
            let segment_path = work_dir.join(format!("segment_{:03}.ts", asset.scene_index));
            debug!(
                scene_index = asset.scene_index,
                duration_ms = asset.audio_duration.as_millis() as u64,
                "Rendering segment {}/{}",
                i + 1,
                assets.len()
            );

            runner
                .run(&self.segment_command(asset, &segment_path))
                .await
                .map_err(|e| composition_error(&format!("segment for scene {}", asset.scene_index), e))?;
            segments.push(segment_path);
        }
        info!(segments = segments.len(), "Segments rendered");

        let list_path = work_dir.join("concat_list.txt");
        tokio::fs::write(&list_path, concat_list(&segments)).await?;

        let merged_path = work_dir.join("merged.mp4");
        runner
            .run(&self.concat_command(&list_path, &merged_path))
            .await
            .map_err(|e| composition_error("concat", e))?;
        info!("Segments concatenated");

        let total: Duration = assets.iter().map(|a| a.audio_duration).sum();
        let final_path = work_dir.join("final.mp4");
        runner
            .run_with_progress(
                &self.burn_command(&merged_path, subtitle_path, &final_path),
                move |p| {
                    if p.is_complete || p.frame % 240 == 0 {
                        debug!(speed = p.speed, "Subtitle burn {:.0}%", p.fraction_of(total) * 100.0);
                    }
                },
            )
            .await
            .map_err(|e| composition_error("subtitle burn", e))?;

        move_file(&final_path, output_path).await?;
        Ok(output_path.to_path_buf())
    }

    async fn log_final_duration(&self, output_path: &Path, expected: Duration, cancel: &CancelToken) {
        let probe = FfprobeDurationProbe::new(&self.binaries.ffprobe);
        match probe.media_duration(output_path, cancel).await {
            Ok(actual) => info!(
                expected_ms = expected.as_millis() as u64,
                actual_ms = actual.as_millis() as u64,
                "Final video duration"
            ),
            Err(e) => warn!("Could not probe final video duration: {}", e),
        }
    }
}

#[async_trait]
impl VideoComposer for FfmpegVideoComposer {
    async fn compose(
        &self,
        assets: &[GeneratedAsset],
        subtitle_path: &Path,
        output_path: &Path,
        cancel: &CancelToken,
    ) -> MediaResult<PathBuf> {
        if assets.is_empty() {
            return Err(MediaError::composition_failed("no assets to compose"));
        }

        let mut ordered = assets.to_vec();
        sort_by_scene_index(&mut ordered);

        for path in ordered
            .iter()
            .flat_map(|a| [&a.image_path, &a.audio_path])
            .map(PathBuf::as_path)
            .chain(std::iter::once(subtitle_path))
        {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Err(MediaError::FileNotFound(path.to_path_buf()));
            }
        }

        // FFmpeg resolves concat entries relative to the list file and the
        // subtitle filter relative to its own cwd; absolute paths avoid both.
        let subtitle_path = tokio::fs::canonicalize(subtitle_path).await?;

        tokio::fs::create_dir_all(&self.temp_root).await?;
        let temp_dir = tempfile::Builder::new()
            .prefix("storyreel-")
            .tempdir_in(&self.temp_root)?;
        let work_dir = tokio::fs::canonicalize(temp_dir.path()).await?;

        let started = Instant::now();
        info!(
            scenes = ordered.len(),
            work_dir = %work_dir.display(),
            "Composing video"
        );

        let result = self
            .compose_in(&work_dir, &ordered, &subtitle_path, output_path, cancel)
            .await;

        cleanup(temp_dir);

        match &result {
            Ok(path) => {
                info!(
                    output = %path.display(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Video composed"
                );
                let expected = ordered.iter().map(|a| a.audio_duration).sum();
                self.log_final_duration(path, expected, cancel).await;
            }
            Err(MediaError::Cancelled) => info!("Composition cancelled"),
            Err(e) => error!("Composition failed: {}", e),
        }

        result
    }
}

fn cleanup(temp_dir: TempDir) {
    let path = temp_dir.path().to_path_buf();
    match temp_dir.close() {
        Ok(()) => debug!(path = %path.display(), "Temp directory removed"),
        Err(e) => warn!(path = %path.display(), "Failed to remove temp directory: {}", e),
    }
}

/// Wrap a failed pass as a composition failure, keeping cancellation and
/// missing media distinguishable.
fn composition_error(step: &str, err: MediaError) -> MediaError {
    match err {
        MediaError::Cancelled | MediaError::FileNotFound(_) | MediaError::FfmpegNotFound => err,
        MediaError::FfmpegFailed {
            message,
            stderr,
            exit_code,
        } => {
            if let Some(stderr) = &stderr {
                error!(step, exit_code, "FFmpeg stderr:\n{}", stderr);
            }
            MediaError::composition_failed(format!("{} failed: {}", step, message))
        }
        other => MediaError::composition_failed(format!("{} failed: {}", step, other)),
    }
}

/// Path text with Windows separators turned into `/`; other platforms keep it as is.
fn forward_slashed(path: &Path) -> String {
    let text = path.to_string_lossy();
    if cfg!(windows) {
        text.replace('\\', "/")
    } else {
        text.into_owned()
    }
}

/// Concat-demuxer list, one `file '<path>'` line per segment.
fn concat_list(segments: &[PathBuf]) -> String {
    segments
        .iter()
        .map(|p| format!("file '{}'\n", forward_slashed(p).replace('\'', r"'\''")))
        .collect()
}

/// Escape a path for use inside the `subtitles` filter's quoted argument.
fn escape_filter_path(path: &Path) -> String {
    forward_slashed(path)
        .replace(':', r"\:")
        .replace('\'', r"'\''")
}

fn subtitle_filter(subtitle_path: &Path, style: &str) -> String {
    format!(
        "subtitles='{}':force_style='{}'",
        escape_filter_path(subtitle_path),
        style
    )
}
