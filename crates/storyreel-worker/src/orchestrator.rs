//! Production run: storyboard, assets, captions, composition.
//!
//! Stages run strictly in order. Any failure aborts the run with the stage
//! attached; there is no resume, a failed run starts again from parsing.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use storyreel_media::{
    CaptionBuilder, FfmpegBinaries, FfprobeDurationProbe, SrtCaptionBuilder,
    VideoComposer,
};
use storyreel_models::{
    sanitize_file_name, CancelToken, ProductionProgress, ProductionStage, VideoProject,
};
use storyreel_providers::{
    LlmScriptBreakdown, MiniMaxVoice, ResponsesClient, ScriptBreakdown, VoiceProvider,
    VoiceSynthesizer, VolcengineImageClient, VolcengineVoice,
};
use tracing::{info, Instrument};

use crate::assets::AssetSynthesisOrchestrator;
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::RunLogger;
use crate::progress::ProgressSink;

/// Caption file written next to the scene assets.
pub const SUBTITLE_FILE_NAME: &str = "subtitles.srt";

/// Per-request ceiling for provider HTTP calls; image generation is slow.
const HTTP_TIMEOUT: Duration = Duration::from_secs(180);

fn staged<E: Into<WorkerError>>(stage: ProductionStage) -> impl FnOnce(E) -> WorkerError {
    move |e| e.into().in_stage(stage)
}

fn ensure_active(cancel: &CancelToken, stage: ProductionStage) -> WorkerResult<()> {
    if cancel.is_cancelled() {
        Err(WorkerError::Cancelled.in_stage(stage))
    } else {
        Ok(())
    }
}

/// Top-level pipeline.
pub struct ProductionOrchestrator {
    breakdown: Arc<dyn ScriptBreakdown>,
    assets: AssetSynthesisOrchestrator,
    captions: Arc<dyn CaptionBuilder>,
    composer: Arc<dyn VideoComposer>,
}

impl ProductionOrchestrator {
    pub fn new(
        breakdown: Arc<dyn ScriptBreakdown>,
        assets: AssetSynthesisOrchestrator,
        captions: Arc<dyn CaptionBuilder>,
        composer: Arc<dyn VideoComposer>,
    ) -> Self {
        Self {
            breakdown,
            assets,
            captions,
            composer,
        }
    }

    /// Wire the production implementations selected by `config`.
    pub fn from_config(config: &WorkerConfig) -> WorkerResult<Self> {
        let pipeline = &config.pipeline;
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build().map_err(
            |e| WorkerError::config_error(format!("failed to build HTTP client: {}", e)),
        )?;

        let binaries = FfmpegBinaries::resolve(pipeline.ffmpeg_dir.as_deref())?;
        info!(
            ffmpeg = %binaries.ffmpeg.display(),
            ffprobe = %binaries.ffprobe.display(),
            "Resolved encoder binaries"
        );

        let generator = ResponsesClient::new(client.clone(), config.llm.clone())?;
        let breakdown = LlmScriptBreakdown::new(
            Arc::new(generator),
            pipeline.default_visual_style.clone(),
            pipeline.character_prompt.clone(),
        );

        let images = VolcengineImageClient::new(client.clone(), config.image.clone())?;
        let voice: Arc<dyn VoiceSynthesizer> = match config.voice_provider {
            VoiceProvider::MiniMax => Arc::new(MiniMaxVoice::new(client, config.minimax.clone())?),
            VoiceProvider::Volcengine => {
                Arc::new(VolcengineVoice::new(client, config.volcengine_tts.clone())?)
            }
        };
        info!(provider = ?config.voice_provider, "Voice provider selected");

        let assets = AssetSynthesisOrchestrator::new(
            Arc::new(images),
            voice,
            Arc::new(FfprobeDurationProbe::new(binaries.ffprobe.clone())),
            pipeline.image_concurrency,
        );
        let composer = pipeline.composer(binaries);

        Ok(Self::new(
            Arc::new(breakdown),
            assets,
            Arc::new(SrtCaptionBuilder::new()),
            Arc::new(composer),
        ))
    }

    /// Produce `project`'s video and return its path.
    ///
    /// Scene files, the caption file and the video all land in the project's
    /// output directory.
    pub async fn produce(
        &self,
        project: &VideoProject,
        progress: &ProgressSink,
        cancel: &CancelToken,
    ) -> WorkerResult<PathBuf> {
        let logger = RunLogger::new(&project.project_id, "produce");
        let span = logger.create_span();

        async {
            let started = Instant::now();
            logger.log_start(&format!(
                "{} -> {}",
                project.title,
                project.output_directory.display()
            ));

            let result = self.run_stages(project, progress, cancel, &logger).await;
            let elapsed = started.elapsed();

            match &result {
                Ok(path) => {
                    progress.report(ProductionProgress::stage_entry(
                        ProductionStage::Done,
                        "Video ready",
                    ));
                    metrics::counter!("storyreel_runs_total", "status" => "done").increment(1);
                    logger.log_completion(&format!(
                        "{} in {:.1}s",
                        path.display(),
                        elapsed.as_secs_f64()
                    ));
                }
                Err(e) => {
                    progress.report(ProductionProgress::stage_entry(
                        ProductionStage::Failed,
                        e.to_string(),
                    ));
                    let status = if e.is_cancelled() { "cancelled" } else { "failed" };
                    metrics::counter!("storyreel_runs_total", "status" => status).increment(1);
                    logger.log_error(&format!("{} after {:.1}s", e, elapsed.as_secs_f64()));
                }
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn run_stages(
        &self,
        project: &VideoProject,
        progress: &ProgressSink,
        cancel: &CancelToken,
        logger: &RunLogger,
    ) -> WorkerResult<PathBuf> {
        let run_dir = &project.output_directory;

        // Parse
        ensure_active(cancel, ProductionStage::Parse)?;
        progress.report(ProductionProgress::stage_entry(
            ProductionStage::Parse,
            "Parsing storyboard",
        ));
        logger.log_progress("Stage 1/4: parsing storyboard");
        tokio::fs::create_dir_all(run_dir)
            .await
            .map_err(staged(ProductionStage::Parse))?;

        let storyboard = self
            .breakdown
            .break_down(
                &project.raw_story_text,
                project.base_visual_style.as_deref(),
                cancel,
            )
            .await
            .map_err(staged(ProductionStage::Parse))?;
        info!(scenes = storyboard.len(), style = %storyboard.base_visual_style, "Storyboard parsed");

        // GenerateAssets
        ensure_active(cancel, ProductionStage::GenerateAssets)?;
        progress.report(
            ProductionProgress::stage_entry(ProductionStage::GenerateAssets, "Generating assets")
                .with_total_scenes(storyboard.len()),
        );
        logger.log_progress("Stage 2/4: generating assets");

        let assets = self
            .assets
            .synthesize(&storyboard, run_dir, progress, cancel)
            .await
            .map_err(staged(ProductionStage::GenerateAssets))?;
        info!(assets = assets.len(), "Assets generated");

        // GenerateSubtitles
        ensure_active(cancel, ProductionStage::GenerateSubtitles)?;
        progress.report(ProductionProgress::stage_entry(
            ProductionStage::GenerateSubtitles,
            "Generating subtitles",
        ));
        logger.log_progress("Stage 3/4: generating subtitles");

        let subtitle_path = run_dir.join(SUBTITLE_FILE_NAME);
        self.captions
            .write_captions(&assets, &subtitle_path, cancel)
            .await
            .map_err(staged(ProductionStage::GenerateSubtitles))?;

        // ComposeVideo
        ensure_active(cancel, ProductionStage::ComposeVideo)?;
        progress.report(ProductionProgress::stage_entry(
            ProductionStage::ComposeVideo,
            "Composing video",
        ));
        logger.log_progress("Stage 4/4: composing video");

        let output_path = run_dir.join(format!("{}.mp4", sanitize_file_name(&project.title)));
        self.composer
            .compose(&assets, &subtitle_path, &output_path, cancel)
            .await
            .map_err(staged(ProductionStage::ComposeVideo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;
    use storyreel_media::{DurationProbe, MediaError, MediaResult};
    use storyreel_models::{CancelSource, GeneratedAsset, Scene, Storyboard};
    use storyreel_providers::{ImageSynthesizer, ProviderError, ProviderResult};

    /// Splits the story on `|`, one scene per piece.
    struct PipeBreakdown;

    #[async_trait]
    impl ScriptBreakdown for PipeBreakdown {
        async fn break_down(
            &self,
            raw_text: &str,
            style: Option<&str>,
            _: &CancelToken,
        ) -> ProviderResult<Storyboard> {
            if raw_text.is_empty() {
                return Err(ProviderError::empty_response("model returned no scenes"));
            }
            let style = style.unwrap_or("default");
            let scenes: Vec<Scene> = raw_text
                .split('|')
                .enumerate()
                .map(|(i, text)| Scene::new(i as u32 + 1, text, format!("{}, picture {}", style, i + 1)))
                .collect();
            Ok(Storyboard::new(style, scenes))
        }
    }

    struct FileImages;

    #[async_trait]
    impl ImageSynthesizer for FileImages {
        async fn synthesize(&self, prompt: &str, path: &Path, _: &CancelToken) -> ProviderResult<()> {
            tokio::fs::write(path, prompt).await?;
            Ok(())
        }
    }

    struct FileVoice;

    #[async_trait]
    impl VoiceSynthesizer for FileVoice {
        fn extension(&self) -> &str {
            "mp3"
        }

        async fn synthesize(&self, text: &str, path: &Path, _: &CancelToken) -> ProviderResult<()> {
            tokio::fs::write(path, text).await?;
            Ok(())
        }
    }

    /// Known narration lines have fixed durations; anything else lasts 1s.
    struct ScriptedProbe;

    #[async_trait]
    impl DurationProbe for ScriptedProbe {
        async fn audio_duration(&self, path: &Path, _: &CancelToken) -> MediaResult<Duration> {
            let ms = match tokio::fs::read_to_string(path).await?.as_str() {
                "Hello world." => 3000,
                "Goodbye now!" => 2500,
                _ => 1000,
            };
            Ok(Duration::from_millis(ms))
        }
    }

    /// Records the assets it was handed and writes an empty video.
    #[derive(Default)]
    struct RecordingComposer {
        seen: Mutex<Vec<GeneratedAsset>>,
        fail: bool,
    }

    #[async_trait]
    impl VideoComposer for RecordingComposer {
        async fn compose(
            &self,
            assets: &[GeneratedAsset],
            subtitle_path: &Path,
            output_path: &Path,
            _: &CancelToken,
        ) -> MediaResult<PathBuf> {
            if self.fail {
                return Err(MediaError::composition_failed("concat failed"));
            }
            assert!(subtitle_path.exists());
            *self.seen.lock().unwrap() = assets.to_vec();
            tokio::fs::write(output_path, b"").await?;
            Ok(output_path.to_path_buf())
        }
    }

    fn orchestrator(composer: Arc<RecordingComposer>) -> ProductionOrchestrator {
        let assets = AssetSynthesisOrchestrator::new(
            Arc::new(FileImages),
            Arc::new(FileVoice),
            Arc::new(ScriptedProbe),
            3,
        );
        ProductionOrchestrator::new(
            Arc::new(PipeBreakdown),
            assets,
            Arc::new(SrtCaptionBuilder::new()),
            composer,
        )
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ProductionProgress>) -> Vec<ProductionProgress> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[tokio::test]
    async fn test_two_scene_production() {
        let dir = tempfile::tempdir().unwrap();
        let composer = Arc::new(RecordingComposer::default());
        let project = VideoProject::new(
            "My: Story?",
            dir.path().join("run"),
            "Hello world.|Goodbye now!",
        );
        let (sink, mut rx) = ProgressSink::channel();

        let output = orchestrator(composer.clone())
            .produce(&project, &sink, &CancelToken::never())
            .await
            .unwrap();

        assert_eq!(output, dir.path().join("run").join("My Story.mp4"));

        let seen = composer.seen.lock().unwrap();
        let total: Duration = seen.iter().map(|a| a.audio_duration).sum();
        assert_eq!(total, Duration::from_millis(5500));
        assert_eq!(seen.iter().map(|a| a.scene_index).collect::<Vec<_>>(), vec![1, 2]);

        let srt = std::fs::read_to_string(dir.path().join("run").join(SUBTITLE_FILE_NAME)).unwrap();
        assert_eq!(
            srt,
            "\u{FEFF}1\n00:00:00,000 --> 00:00:03,000\nHello world.\n\n\
             2\n00:00:03,000 --> 00:00:05,500\nGoodbye now!\n\n"
        );

        let events = drain(&mut rx);
        let stages: Vec<ProductionStage> = events.iter().map(|e| e.stage).collect();
        assert_eq!(stages.first(), Some(&ProductionStage::Parse));
        assert_eq!(stages.last(), Some(&ProductionStage::Done));
        assert!(events.windows(2).all(|w| w[0].percentage <= w[1].percentage));
        assert_eq!(
            events.iter().map(|e| e.percentage).collect::<Vec<_>>(),
            vec![5, 10, 45, 80, 80, 85, 100]
        );
    }

    #[tokio::test]
    async fn test_parse_failure_carries_stage() {
        let dir = tempfile::tempdir().unwrap();
        let project = VideoProject::new("t", dir.path(), "");
        let (sink, mut rx) = ProgressSink::channel();

        let err = orchestrator(Arc::new(RecordingComposer::default()))
            .produce(&project, &sink, &CancelToken::never())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(ProductionStage::Parse));
        assert!(matches!(err.root(), WorkerError::Provider(ProviderError::EmptyResponse(_))));
        assert_eq!(drain(&mut rx).last().unwrap().stage, ProductionStage::Failed);
    }

    #[tokio::test]
    async fn test_compose_failure_carries_stage() {
        let dir = tempfile::tempdir().unwrap();
        let project = VideoProject::new("t", dir.path(), "Only scene.");
        let composer = Arc::new(RecordingComposer {
            fail: true,
            ..Default::default()
        });

        let err = orchestrator(composer)
            .produce(&project, &ProgressSink::disabled(), &CancelToken::never())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(ProductionStage::ComposeVideo));
        assert!(matches!(err.root(), WorkerError::Media(MediaError::CompositionFailed(_))));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let project = VideoProject::new("t", dir.path(), "Text.");
        let source = CancelSource::new();
        source.cancel();

        let err = orchestrator(Arc::new(RecordingComposer::default()))
            .produce(&project, &ProgressSink::disabled(), &source.token())
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(err.stage(), Some(ProductionStage::Parse));
    }
}
