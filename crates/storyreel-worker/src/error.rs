//! Worker error types.

use storyreel_media::MediaError;
use storyreel_models::ProductionStage;
use storyreel_providers::ProviderError;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// A pipeline stage aborted; `source` is the original failure.
    #[error("Stage {stage} failed: {source}")]
    StageFailed {
        stage: ProductionStage,
        source: Box<WorkerError>,
    },

    #[error("Production cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Attach stage context, keeping the innermost stage if already set.
    pub fn in_stage(self, stage: ProductionStage) -> Self {
        match self {
            Self::StageFailed { .. } => self,
            other => Self::StageFailed {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage the error was raised in, if known.
    pub fn stage(&self) -> Option<ProductionStage> {
        match self {
            Self::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The error without stage context.
    pub fn root(&self) -> &WorkerError {
        match self {
            Self::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// True for cancellation at any layer.
    pub fn is_cancelled(&self) -> bool {
        match self.root() {
            Self::Cancelled => true,
            Self::Media(MediaError::Cancelled) => true,
            Self::Provider(e) => e.is_cancelled(),
            _ => false,
        }
    }

    /// True when an expected media file was absent.
    pub fn is_missing_media(&self) -> bool {
        matches!(self.root(), Self::Media(e) if e.is_missing_media())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_stage_context_wraps_once() {
        let err = WorkerError::from(ProviderError::empty_response("no scenes"))
            .in_stage(ProductionStage::Parse)
            .in_stage(ProductionStage::GenerateAssets);

        assert_eq!(err.stage(), Some(ProductionStage::Parse));
        assert!(matches!(err.root(), WorkerError::Provider(ProviderError::EmptyResponse(_))));
        assert!(err.to_string().starts_with("Stage parse failed"));
    }

    #[test]
    fn test_cancellation_detected_through_layers() {
        assert!(WorkerError::Cancelled.is_cancelled());
        assert!(WorkerError::from(MediaError::Cancelled)
            .in_stage(ProductionStage::ComposeVideo)
            .is_cancelled());
        assert!(WorkerError::from(ProviderError::Cancelled).is_cancelled());
        assert!(!WorkerError::config_error("x").is_cancelled());
    }

    #[test]
    fn test_missing_media() {
        let err = WorkerError::from(MediaError::FileNotFound(PathBuf::from("scene_001.mp3")))
            .in_stage(ProductionStage::GenerateAssets);
        assert!(err.is_missing_media());
    }
}
