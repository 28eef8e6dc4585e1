//! Scenes and storyboards.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One narrative beat with its own speech text and visual description.
///
/// `index` is 1-based and contiguous within a storyboard. `visual_prompt`
/// already carries the global style and the optional character descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub index: u32,
    pub speech_text: String,
    pub visual_prompt: String,
}

impl Scene {
    pub fn new(index: u32, speech_text: impl Into<String>, visual_prompt: impl Into<String>) -> Self {
        Self {
            index,
            speech_text: speech_text.into(),
            visual_prompt: visual_prompt.into(),
        }
    }

    /// Contents of the per-scene prompt dump written next to the assets.
    pub fn prompt_dump(&self) -> String {
        format!(
            "[Visual Prompt]\n{}\n\n[Speech Text]\n{}",
            self.visual_prompt, self.speech_text
        )
    }
}

/// Ordered list of scenes plus the global visual style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Storyboard {
    pub base_visual_style: String,
    pub scenes: Vec<Scene>,
}

impl Storyboard {
    pub fn new(base_visual_style: impl Into<String>, scenes: Vec<Scene>) -> Self {
        Self {
            base_visual_style: base_visual_style.into(),
            scenes,
        }
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_dump_layout() {
        let scene = Scene::new(1, "Hello world.", "Cinematic, a quiet street");
        assert_eq!(
            scene.prompt_dump(),
            "[Visual Prompt]\nCinematic, a quiet street\n\n[Speech Text]\nHello world."
        );
    }

    #[test]
    fn test_scene_serializes_camel_case() {
        let scene = Scene::new(2, "a", "b");
        let json = serde_json::to_value(&scene).unwrap();
        assert_eq!(json["speechText"], "a");
        assert_eq!(json["visualPrompt"], "b");
    }
}
