//! Production worker binary.

use std::path::Path;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storyreel_models::{CancelSource, VideoProject};
use storyreel_worker::{PipelineConfig, ProductionOrchestrator, ProgressSink, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting storyreel-worker");

    let config = WorkerConfig::from_env().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    info!("Pipeline config: {:?}", config.pipeline);

    let orchestrator = ProductionOrchestrator::from_config(&config)?;
    let project = load_project(&config.pipeline).await?;
    info!(
        project_id = %project.project_id,
        title = %project.title,
        output = %project.output_directory.display(),
        "Project loaded"
    );

    let (sink, mut events) = ProgressSink::channel();
    let printer = tokio::spawn(async move {
        while let Some(p) = events.recv().await {
            info!(stage = %p.stage, "[{:>3}%] {}", p.percentage, p.step);
        }
    });

    let source = CancelSource::new();
    let token = source.token();
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received shutdown signal, cancelling production");
            source.cancel();
        }
    });

    let result = orchestrator.produce(&project, &sink, &token).await;

    drop(sink);
    printer.await.ok();
    signal.abort();

    match result {
        Ok(path) => {
            info!(output = %path.display(), "Video produced");
            Ok(())
        }
        Err(e) => {
            error!("Production failed: {}", e);
            Err(e.into())
        }
    }
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`.
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("storyreel=info,storyreel_worker=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// The story in `STORY_FILE`, or the configured demo project.
async fn load_project(pipeline: &PipelineConfig) -> anyhow::Result<VideoProject> {
    let (title, story) = match std::env::var("STORY_FILE") {
        Ok(path) if !path.trim().is_empty() => {
            let path = Path::new(&path);
            let story = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read story file {}", path.display()))?;
            let title = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| pipeline.demo_title.clone());
            (title, story)
        }
        _ => (pipeline.demo_title.clone(), pipeline.demo_story.clone()),
    };

    if story.trim().is_empty() {
        anyhow::bail!("story text is empty");
    }

    let mut project = VideoProject::new(title, &pipeline.output_dir, story);
    project.output_directory = pipeline.output_dir.join(project.project_id.as_str());
    Ok(project)
}
