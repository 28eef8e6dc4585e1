//! Production progress events.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of a production run.
///
/// Runs move strictly forward `Parse -> GenerateAssets -> GenerateSubtitles
/// -> ComposeVideo -> Done`; `Failed` is reachable from any stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProductionStage {
    Parse,
    GenerateAssets,
    GenerateSubtitles,
    ComposeVideo,
    Done,
    Failed,
}

impl ProductionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductionStage::Parse => "parse",
            ProductionStage::GenerateAssets => "generate_assets",
            ProductionStage::GenerateSubtitles => "generate_subtitles",
            ProductionStage::ComposeVideo => "compose_video",
            ProductionStage::Done => "done",
            ProductionStage::Failed => "failed",
        }
    }

    /// Progress percentage reported on entering the stage.
    pub fn entry_percentage(&self) -> u8 {
        match self {
            ProductionStage::Parse => 5,
            ProductionStage::GenerateAssets => 10,
            ProductionStage::GenerateSubtitles => 80,
            ProductionStage::ComposeVideo => 85,
            ProductionStage::Done => 100,
            ProductionStage::Failed => 0,
        }
    }

    /// The stage that follows this one, if any.
    pub fn next(&self) -> Option<ProductionStage> {
        match self {
            ProductionStage::Parse => Some(ProductionStage::GenerateAssets),
            ProductionStage::GenerateAssets => Some(ProductionStage::GenerateSubtitles),
            ProductionStage::GenerateSubtitles => Some(ProductionStage::ComposeVideo),
            ProductionStage::ComposeVideo => Some(ProductionStage::Done),
            ProductionStage::Done | ProductionStage::Failed => None,
        }
    }
}

impl fmt::Display for ProductionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A progress record published by the orchestrator.
///
/// `current_scene` and `total_scenes` are only set during asset generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductionProgress {
    pub stage: ProductionStage,
    pub step: String,
    pub percentage: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_scene: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_scenes: Option<usize>,
}

impl ProductionProgress {
    /// Progress record for entering a stage.
    pub fn stage_entry(stage: ProductionStage, step: impl Into<String>) -> Self {
        Self {
            stage,
            step: step.into(),
            percentage: stage.entry_percentage(),
            current_scene: None,
            total_scenes: None,
        }
    }

    /// Progress record for a completed scene during asset generation.
    ///
    /// Percentage is `10 + floor(70 * completed / total)`.
    pub fn scene_completed(completed: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            80
        } else {
            10 + (70 * completed.min(total) / total) as u8
        };
        Self {
            stage: ProductionStage::GenerateAssets,
            step: format!("Generated scene {}/{}", completed, total),
            percentage,
            current_scene: Some(completed),
            total_scenes: Some(total),
        }
    }

    pub fn with_total_scenes(mut self, total: usize) -> Self {
        self.total_scenes = Some(total);
        self
    }
}
