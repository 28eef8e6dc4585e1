//! Video project input.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Unique identifier for a production run's project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl ProjectId {
    /// Generate a new random project ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied input to a production run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoProject {
    pub project_id: ProjectId,
    pub title: String,
    pub output_directory: PathBuf,
    pub raw_story_text: String,
    #[serde(default)]
    pub base_visual_style: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl VideoProject {
    /// Create a project with a fresh ID and the current timestamp.
    pub fn new(
        title: impl Into<String>,
        output_directory: impl Into<PathBuf>,
        raw_story_text: impl Into<String>,
    ) -> Self {
        Self {
            project_id: ProjectId::new(),
            title: title.into(),
            output_directory: output_directory.into(),
            raw_story_text: raw_story_text.into(),
            base_visual_style: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_visual_style(mut self, style: impl Into<String>) -> Self {
        self.base_visual_style = Some(style.into());
        self
    }
}
