//! Shared data models for the StoryReel production pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Projects, storyboards and scenes
//! - Generated per-scene assets
//! - Caption entries and SRT timestamps
//! - Encoding configuration
//! - Production progress events
//! - Cooperative cancellation tokens

pub mod asset;
pub mod cancel;
pub mod caption;
pub mod encoding;
pub mod progress;
pub mod project;
pub mod scene;
pub mod utils;

// Re-export common types
pub use asset::{sort_by_scene_index, GeneratedAsset};
pub use cancel::{CancelSource, CancelToken};
pub use caption::{format_srt_time, CaptionEntry};
pub use encoding::EncodingConfig;
pub use progress::{ProductionProgress, ProductionStage};
pub use project::{ProjectId, VideoProject};
pub use scene::{Scene, Storyboard};
pub use utils::{sanitize_file_name, scene_file_name};
