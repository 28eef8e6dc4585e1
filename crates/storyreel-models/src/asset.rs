//! Generated per-scene assets.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The image+audio pair and measured duration for one scene.
///
/// `audio_duration` is the probed playtime of `audio_path` and is the
/// single timing source for both captions and video segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedAsset {
    pub scene_index: u32,
    pub image_path: PathBuf,
    pub audio_path: PathBuf,
    pub audio_duration: Duration,
    pub speech_text: String,
}

/// Sort assets into ascending scene order.
///
/// Synthesis completes in arbitrary order; every downstream consumer
/// must go through this before reading the list.
pub fn sort_by_scene_index(assets: &mut [GeneratedAsset]) {
    assets.sort_by_key(|a| a.scene_index);
}
