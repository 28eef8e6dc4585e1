//! Production orchestrator for narrated story videos.
//!
//! Turns raw story text into a finished video in four stages:
//! storyboard breakdown, per-scene image and voice synthesis, the caption
//! timeline, and FFmpeg composition.

pub mod assets;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod progress;

pub use assets::AssetSynthesisOrchestrator;
pub use config::{PipelineConfig, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use logging::RunLogger;
pub use orchestrator::{ProductionOrchestrator, SUBTITLE_FILE_NAME};
pub use progress::ProgressSink;
