//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use storyreel_models::CancelToken;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::{parse_progress_line, FfmpegProgress};

/// Number of non-progress stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Resolved encoder binaries.
///
/// Resolved once at startup and handed to every component that spawns
/// FFmpeg or FFprobe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegBinaries {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl FfmpegBinaries {
    /// Resolve binaries from `dir` when given, otherwise from `PATH`.
    pub fn resolve(dir: Option<&Path>) -> MediaResult<Self> {
        if let Some(dir) = dir {
            let ffmpeg = dir.join(executable_name("ffmpeg"));
            let ffprobe = dir.join(executable_name("ffprobe"));
            if ffmpeg.is_file() && ffprobe.is_file() {
                info!(dir = %dir.display(), "Using FFmpeg binaries from configured directory");
                return Ok(Self { ffmpeg, ffprobe });
            }
            warn!(
                dir = %dir.display(),
                "Configured FFmpeg directory does not contain ffmpeg/ffprobe, falling back to PATH"
            );
        }

        let ffmpeg = which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;
        let ffprobe = which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;
        Ok(Self { ffmpeg, ffprobe })
    }

    /// Use explicit binary paths without checking them.
    pub fn from_paths(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }
}

fn executable_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

/// Format a duration for `-t`/`-ss` with microsecond precision.
///
/// Formatted from integer parts so the value FFmpeg sees is exactly the
/// probed duration, with no float round trip.
pub fn format_ffmpeg_duration(duration: Duration) -> String {
    format!("{}.{:06}", duration.as_secs(), duration.subsec_micros())
}

#[derive(Debug, Clone)]
struct Input {
    args: Vec<String>,
    path: PathBuf,
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Inputs in `-i` order, each with its own leading options
    inputs: Vec<Input>,
    /// Output file path
    output: PathBuf,
    /// Output arguments (after the last -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
}

impl FfmpegCommand {
    /// Create a command writing to `output`. Add inputs with [`Self::input`].
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
        }
    }

    /// Add a plain input.
    pub fn input(self, path: impl AsRef<Path>) -> Self {
        self.input_with_args(path, Vec::<String>::new())
    }

    /// Add an input preceded by its own options.
    pub fn input_with_args<I, S>(mut self, path: impl AsRef<Path>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.push(Input {
            args: args.into_iter().map(Into::into).collect(),
            path: path.as_ref().to_path_buf(),
        });
        self
    }

    /// Add a still image held for exactly `duration`.
    pub fn looped_image(self, path: impl AsRef<Path>, duration: Duration) -> Self {
        self.input_with_args(
            path,
            ["-loop".to_string(), "1".to_string(), "-t".to_string(), format_ffmpeg_duration(duration)],
        )
    }

    /// Add a concat-demuxer list file as input.
    pub fn concat_list(self, path: impl AsRef<Path>) -> Self {
        self.input_with_args(path, ["-f", "concat", "-safe", "0"])
    }

    /// Add an output argument.
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Select a stream for the output.
    pub fn map(self, spec: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(spec)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Copy all streams without re-encoding.
    pub fn codec_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Set CRF (quality).
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Set output frame rate.
    pub fn frame_rate(self, fps: u32) -> Self {
        self.output_arg("-r").output_arg(fps.to_string())
    }

    pub fn pixel_format(self, format: impl Into<String>) -> Self {
        self.output_arg("-pix_fmt").output_arg(format)
    }

    /// Force output container format.
    pub fn format(self, format: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(format)
    }

    /// Stop at the end of the shortest input.
    pub fn shortest(self) -> Self {
        self.output_arg("-shortest")
    }

    /// Move the MP4 index to the front of the file.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push("error".to_string());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());
        args.push("-nostats".to_string());

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().to_string());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with progress tracking and cancellation.
pub struct FfmpegRunner {
    binary: PathBuf,
    cancel: Option<CancelToken>,
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    Cancelled,
    TimedOut,
}

impl FfmpegRunner {
    /// Create a runner for the given `ffmpeg` binary.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            cancel: None,
            timeout_secs: None,
        }
    }

    /// Kill the process when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run an FFmpeg command with progress callback.
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, progress_callback: F) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(MediaError::Cancelled);
        }

        let args = cmd.build_args();
        debug!("Running FFmpeg: {} {}", self.binary.display(), args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => MediaError::FfmpegNotFound,
                _ => MediaError::Io(e),
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("FFmpeg stderr not captured", None, None))?;
        let mut reader = BufReader::new(stderr).lines();

        // Progress lines are key=value; anything else is diagnostic output.
        let stderr_handle = tokio::spawn(async move {
            let mut current = FfmpegProgress::default();
            let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

            while let Ok(Some(line)) = reader.next_line().await {
                if line.contains('=') && !line.contains(' ') {
                    if let Some(progress) = parse_progress_line(&line, &mut current) {
                        progress_callback(progress);
                    }
                    continue;
                }
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }

            tail.into_iter().collect::<Vec<_>>().join("\n")
        });

        let outcome = self.wait_for_completion(&mut child).await;

        match outcome {
            Outcome::Exited(status) => {
                let status = status?;
                let stderr_tail = stderr_handle.await.unwrap_or_default();
                if status.success() {
                    Ok(())
                } else {
                    Err(MediaError::ffmpeg_failed(
                        format!("FFmpeg exited with {}", status),
                        (!stderr_tail.is_empty()).then_some(stderr_tail),
                        status.code(),
                    ))
                }
            }
            Outcome::Cancelled => {
                info!("FFmpeg cancelled, killing process");
                kill(&mut child).await;
                stderr_handle.abort();
                Err(MediaError::Cancelled)
            }
            Outcome::TimedOut => {
                let secs = self.timeout_secs.unwrap_or_default();
                warn!("FFmpeg timed out after {} seconds, killing process", secs);
                kill(&mut child).await;
                stderr_handle.abort();
                Err(MediaError::Timeout(secs))
            }
        }
    }

    async fn wait_for_completion(&self, child: &mut Child) -> Outcome {
        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let timed_out = async {
            match self.timeout_secs {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            _ = cancelled => Outcome::Cancelled,
            _ = timed_out => Outcome::TimedOut,
        }
    }
}

async fn kill(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill FFmpeg process: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_input_command() {
        let cmd = FfmpegCommand::new("segment_001.ts")
            .looped_image("scene_001.png", Duration::from_millis(2500))
            .input("scene_001.mp3")
            .video_codec("libx264")
            .crf(23)
            .format("mpegts");

        let args = cmd.build_args();
        let image = args.iter().position(|a| a == "scene_001.png").unwrap();
        let audio = args.iter().position(|a| a == "scene_001.mp3").unwrap();

        assert!(image < audio);
        assert_eq!(
            &args[image - 5..image],
            &["-loop", "1", "-t", "2.500000", "-i"]
        );
        assert_eq!(args[audio - 1], "-i");
        assert_eq!(args.last().map(String::as_str), Some("segment_001.ts"));
        assert!(args.windows(2).any(|w| w == ["-f", "mpegts"]));
    }

    #[test]
    fn test_concat_input() {
        let cmd = FfmpegCommand::new("merged.mp4")
            .concat_list("concat_list.txt")
            .codec_copy()
            .faststart();

        let args = cmd.build_args();
        let list = args.iter().position(|a| a == "concat_list.txt").unwrap();
        assert_eq!(&args[list - 5..list], &["-f", "concat", "-safe", "0", "-i"]);
        assert!(args.windows(2).any(|w| w == ["-c", "copy"]));
        assert!(args.windows(2).any(|w| w == ["-movflags", "+faststart"]));
    }

    #[test]
    fn test_format_ffmpeg_duration() {
        assert_eq!(format_ffmpeg_duration(Duration::from_secs(3)), "3.000000");
        assert_eq!(format_ffmpeg_duration(Duration::from_micros(2_500_001)), "2.500001");
        assert_eq!(format_ffmpeg_duration(Duration::from_nanos(999)), "0.000000");
    }

    #[test]
    fn test_resolve_falls_back_when_dir_missing() {
        let dir = tempfile::tempdir().unwrap();
        let result = FfmpegBinaries::resolve(Some(dir.path()));
        // Either PATH has ffmpeg or we get a not-found error; never the empty dir.
        if let Ok(bins) = result {
            assert!(!bins.ffmpeg.starts_with(dir.path()));
        }
    }

    #[tokio::test]
    async fn test_run_cancelled_before_spawn() {
        let source = storyreel_models::CancelSource::new();
        source.cancel();
        let runner = FfmpegRunner::new("ffmpeg").with_cancel(source.token());
        let cmd = FfmpegCommand::new("out.mp4").input("in.mp4");

        let err = runner.run(&cmd).await.unwrap_err();
        assert!(matches!(err, MediaError::Cancelled));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_kills_process_after_timeout() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("ffmpeg");
        std::fs::write(&binary, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

        let runner = FfmpegRunner::new(&binary).with_timeout(1);
        let cmd = FfmpegCommand::new("out.mp4").input("in.mp4");

        let started = std::time::Instant::now();
        let err = runner.run(&cmd).await.unwrap_err();
        assert!(matches!(err, MediaError::Timeout(1)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
