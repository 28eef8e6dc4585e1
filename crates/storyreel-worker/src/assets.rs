//! Per-scene asset synthesis.
//!
//! Every scene runs at once. Within a scene the image and voice legs run
//! concurrently, then the voice track is probed for its exact duration.
//! Only the image leg is throttled, by a semaphore shared across scenes.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::try_join_all;
use storyreel_media::{write_placeholder_image, DurationProbe};
use storyreel_models::{
    scene_file_name, sort_by_scene_index, CancelToken, GeneratedAsset, ProductionProgress, Scene,
    Storyboard,
};
use storyreel_providers::{ImageSynthesizer, VoiceSynthesizer};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::{WorkerError, WorkerResult};
use crate::progress::ProgressSink;

/// Produces one [`GeneratedAsset`] per storyboard scene.
pub struct AssetSynthesisOrchestrator {
    images: Arc<dyn ImageSynthesizer>,
    voice: Arc<dyn VoiceSynthesizer>,
    probe: Arc<dyn DurationProbe>,
    image_limiter: Semaphore,
    image_concurrency: usize,
}

impl AssetSynthesisOrchestrator {
    pub fn new(
        images: Arc<dyn ImageSynthesizer>,
        voice: Arc<dyn VoiceSynthesizer>,
        probe: Arc<dyn DurationProbe>,
        image_concurrency: usize,
    ) -> Self {
        let image_concurrency = image_concurrency.max(1);
        Self {
            images,
            voice,
            probe,
            image_limiter: Semaphore::new(image_concurrency),
            image_concurrency,
        }
    }

    /// Synthesize every scene into `work_dir`, returning assets in scene order.
    ///
    /// Fails on the first scene whose voice leg or duration probe fails; the
    /// remaining scenes are dropped.
    pub async fn synthesize(
        &self,
        storyboard: &Storyboard,
        work_dir: &Path,
        progress: &ProgressSink,
        cancel: &CancelToken,
    ) -> WorkerResult<Vec<GeneratedAsset>> {
        let total = storyboard.len();
        let completed = AtomicUsize::new(0);
        let completed = &completed;

        tokio::fs::create_dir_all(work_dir).await?;
        info!(
            scenes = total,
            image_concurrency = self.image_concurrency,
            "Synthesizing scene assets"
        );

        let tasks = storyboard.scenes.iter().map(|scene| async move {
            let asset = self.synthesize_scene(scene, total, work_dir, cancel).await?;
            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            progress.report(ProductionProgress::scene_completed(done, total));
            Ok::<_, WorkerError>(asset)
        });

        let mut assets = try_join_all(tasks).await?;
        sort_by_scene_index(&mut assets);
        Ok(assets)
    }

    async fn synthesize_scene(
        &self,
        scene: &Scene,
        total: usize,
        work_dir: &Path,
        cancel: &CancelToken,
    ) -> WorkerResult<GeneratedAsset> {
        let image_path = work_dir.join(scene_file_name(scene.index, self.images.extension()));
        let audio_path = work_dir.join(scene_file_name(scene.index, self.voice.extension()));
        let prompt_path = work_dir.join(scene_file_name(scene.index, "txt"));

        debug!(scene_index = scene.index, total, "Starting scene");
        tokio::fs::write(&prompt_path, scene.prompt_dump()).await?;

        tokio::try_join!(
            self.image_with_fallback(scene, &image_path, cancel),
            async {
                self.voice
                    .synthesize(&scene.speech_text, &audio_path, cancel)
                    .await
                    .map_err(WorkerError::from)
            }
        )?;

        let audio_duration = self.probe.audio_duration(&audio_path, cancel).await?;

        info!(
            scene_index = scene.index,
            total,
            duration_ms = audio_duration.as_millis() as u64,
            "Scene assets ready"
        );

        Ok(GeneratedAsset {
            scene_index: scene.index,
            image_path,
            audio_path,
            audio_duration,
            speech_text: scene.speech_text.clone(),
        })
    }

    /// Image leg. A failure after the provider's retries becomes a placeholder.
    async fn image_with_fallback(
        &self,
        scene: &Scene,
        image_path: &Path,
        cancel: &CancelToken,
    ) -> WorkerResult<()> {
        let _permit = cancel
            .run_until_cancelled(self.image_limiter.acquire())
            .await
            .ok_or(WorkerError::Cancelled)?
            .map_err(|_| WorkerError::Cancelled)?;

        match self.images.synthesize(&scene.visual_prompt, image_path, cancel).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => Err(WorkerError::Cancelled),
            Err(e) => {
                warn!(
                    scene_index = scene.index,
                    "Image generation failed, using placeholder: {}", e
                );
                metrics::counter!("storyreel_image_fallbacks_total").increment(1);
                write_placeholder_image(image_path).await?;
                Ok(())
            }
        }
    }
}
