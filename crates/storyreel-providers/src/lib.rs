//! External collaborators of the production pipeline.
//!
//! Every provider sits behind a capability trait so the orchestrator can be
//! wired with real HTTP clients in the binary and with fakes in tests:
//! - [`TextGenerator`] and [`ScriptBreakdown`] turn story text into a storyboard
//! - [`ImageSynthesizer`] renders one still per scene
//! - [`VoiceSynthesizer`] narrates one scene, with MiniMax and Volcengine variants
//!
//! All HTTP calls go through [`retry::send_with_retry`].

pub mod breakdown;
pub mod config;
pub mod error;
pub mod image;
pub mod llm;
pub mod retry;
pub mod voice;

pub use breakdown::{LlmScriptBreakdown, ScriptBreakdown};
pub use config::{ImageConfig, LlmConfig, MiniMaxConfig, VoiceProvider, VolcengineTtsConfig};
pub use error::{ProviderError, ProviderResult};
pub use image::{ImageSynthesizer, VolcengineImageClient};
pub use llm::{ResponsesClient, TextGenerator};
pub use retry::{Backoff, RetryPolicy};
pub use voice::{MiniMaxVoice, VoiceSynthesizer, VolcengineVoice};
