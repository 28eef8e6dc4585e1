//! Story text to storyboard.

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use storyreel_models::{CancelToken, Scene, Storyboard};
use tracing::{error, info};

use crate::error::{ProviderError, ProviderResult};
use crate::llm::TextGenerator;

/// Splits raw story text into an ordered storyboard.
#[async_trait]
pub trait ScriptBreakdown: Send + Sync {
    /// `base_visual_style` overrides the configured default style.
    async fn break_down(
        &self,
        raw_text: &str,
        base_visual_style: Option<&str>,
        cancel: &CancelToken,
    ) -> ProviderResult<Storyboard>;
}

/// Shape the model must answer with.
#[derive(Debug, Deserialize, JsonSchema)]
struct BreakdownResponse {
    #[serde(alias = "Scenes")]
    scenes: Vec<SceneDraft>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct SceneDraft {
    /// Narration for this scene, spoken by the voice track
    #[serde(alias = "SpeechText", alias = "speech_text")]
    speech_text: String,
    /// What the scene looks like, without the global style or character sheet
    #[serde(alias = "VisualPrompt", alias = "visual_prompt")]
    visual_prompt: String,
}

/// [`ScriptBreakdown`] backed by a [`TextGenerator`].
pub struct LlmScriptBreakdown {
    generator: Arc<dyn TextGenerator>,
    default_style: String,
    character_prompt: String,
}

impl LlmScriptBreakdown {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        default_style: impl Into<String>,
        character_prompt: impl Into<String>,
    ) -> Self {
        Self {
            generator,
            default_style: default_style.into(),
            character_prompt: character_prompt.into(),
        }
    }

    fn system_prompt(&self, style: &str) -> String {
        let character = if self.character_prompt.is_empty() {
            String::new()
        } else {
            format!("\nMain character sheet: {}\n", self.character_prompt)
        };
        let schema = serde_json::to_string_pretty(&schemars::schema_for!(BreakdownResponse))
            .unwrap_or_default();

        format!(
            r#"You are a professional video script writer. Break the user's story into scenes.
Global visual style: {style}{character}
For each scene provide:
1. speechText: the narration or dialogue for this scene, natural when read aloud
2. visualPrompt: a concrete, vivid description of the image for this scene

Rules:
- Describe a recurring character's appearance the same way every time.
- If a character sheet is given, include the character's key traits in visualPrompt whenever the character appears, phrased to fit the action. Do not paste the sheet verbatim; it is appended automatically.
- Keep each scene's narration moderate, roughly 30 to 100 words or characters.
- Visual descriptions should cover setting, action, lighting and mood.
- Scenes must follow each other logically.

Respond with JSON only, no other text, in exactly this shape:
{{
    "scenes": [
        {{
            "speechText": "narration",
            "visualPrompt": "visual description without the global style or character sheet"
        }}
    ]
}}

JSON Schema:
{schema}"#
        )
    }

    /// `"{style}, {character}, {visual}"`, skipping an empty character sheet.
    fn compose_visual_prompt(&self, style: &str, visual: &str) -> String {
        let mut prompt = style.to_string();
        if !self.character_prompt.is_empty() {
            prompt.push_str(", ");
            prompt.push_str(&self.character_prompt);
        }
        prompt.push_str(", ");
        prompt.push_str(visual.trim());
        prompt
    }
}

#[async_trait]
impl ScriptBreakdown for LlmScriptBreakdown {
    async fn break_down(
        &self,
        raw_text: &str,
        base_visual_style: Option<&str>,
        cancel: &CancelToken,
    ) -> ProviderResult<Storyboard> {
        let style = base_visual_style
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.default_style);
        info!(style, "Breaking story into scenes");
        if !self.character_prompt.is_empty() {
            info!(character = %self.character_prompt, "Using character sheet");
        }

        let response = self
            .generator
            .generate(&self.system_prompt(style), raw_text, cancel)
            .await?;

        let parsed: BreakdownResponse = serde_json::from_str(strip_code_fence(&response))
            .map_err(|e| {
                error!("Storyboard JSON did not parse: {}", e);
                ProviderError::malformed(format!("storyboard JSON: {}", e))
            })?;

        if parsed.scenes.is_empty() {
            return Err(ProviderError::empty_response("model returned no scenes"));
        }

        let scenes: Vec<Scene> = parsed
            .scenes
            .into_iter()
            .enumerate()
            .map(|(i, draft)| {
                Scene::new(
                    i as u32 + 1,
                    draft.speech_text.trim(),
                    self.compose_visual_prompt(style, &draft.visual_prompt),
                )
            })
            .collect();

        info!(scenes = scenes.len(), "Storyboard ready");
        Ok(Storyboard::new(style, scenes))
    }
}

/// Remove a surrounding ```json / ``` fence if present.
fn strip_code_fence(content: &str) -> &str {
    let content = content.trim();
    let content = content
        .strip_prefix("```json")
        .or_else(|| content.strip_prefix("```"))
        .unwrap_or(content);
    content.strip_suffix("```").unwrap_or(content).trim()
}
