//! FFmpeg CLI wrapper for the production pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with multiple inputs
//! - Progress parsing from `-progress pipe:2`
//! - Cancellation support via [`storyreel_models::CancelToken`]
//! - Audio duration probing through FFprobe
//! - The caption timeline and SRT writer
//! - Segment, concat and subtitle-burn composition

pub mod command;
pub mod compose;
pub mod error;
pub mod fs_utils;
pub mod placeholder;
pub mod probe;
pub mod progress;
pub mod subtitles;

pub use command::{FfmpegBinaries, FfmpegCommand, FfmpegRunner};
pub use compose::{FfmpegVideoComposer, VideoComposer};
pub use error::{MediaError, MediaResult};
pub use placeholder::{write_placeholder_image, PLACEHOLDER_PNG};
pub use probe::{DurationProbe, FfprobeDurationProbe};
pub use progress::FfmpegProgress;
pub use subtitles::{build_timeline, render_srt, split_sentences, CaptionBuilder, SrtCaptionBuilder};
