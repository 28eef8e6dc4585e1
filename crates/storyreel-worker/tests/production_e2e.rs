//! End-to-end production against the real providers and FFmpeg.

use storyreel_models::{CancelToken, VideoProject};
use storyreel_worker::{ProductionOrchestrator, ProgressSink, WorkerConfig, SUBTITLE_FILE_NAME};

#[tokio::test]
#[ignore = "requires provider credentials and ffmpeg/ffprobe"]
async fn test_short_story_produces_video() {
    let _ = rustls::crypto::ring::default_provider().install_default();
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env().expect("Failed to load config");
    config.validate().expect("Incomplete provider configuration");
    let orchestrator = ProductionOrchestrator::from_config(&config).expect("Failed to wire pipeline");

    let dir = tempfile::tempdir().unwrap();
    let project = VideoProject::new(
        "E2E Story",
        dir.path(),
        "A lighthouse keeper lights the lamp at dusk. A ship passes safely in the night.",
    );
    let (sink, mut events) = ProgressSink::channel();

    let output = orchestrator
        .produce(&project, &sink, &CancelToken::never())
        .await
        .expect("Production failed");

    assert!(output.exists());
    assert!(dir.path().join(SUBTITLE_FILE_NAME).exists());
    assert!(dir.path().join("scene_001.txt").exists());

    drop(sink);
    let mut last = 0;
    while let Some(p) = events.recv().await {
        assert!(p.percentage >= last);
        last = p.percentage;
    }
    assert_eq!(last, 100);
}
