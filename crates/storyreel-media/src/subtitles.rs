//! Caption timeline and SRT output.
//!
//! Captions are timed from the probed audio durations alone. A single
//! clock advances by each scene's full `audio_duration`; inside a scene,
//! sentences share that duration in proportion to their character count
//! and the last sentence takes whatever remains, so every scene closes on
//! exactly the same instant the video segment does.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use storyreel_models::{format_srt_time, sort_by_scene_index, CancelToken, CaptionEntry, GeneratedAsset};
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};

/// UTF-8 byte-order mark; some subtitle renderers need it to detect encoding.
const UTF8_BOM: &str = "\u{FEFF}";

/// Writes the caption track for an ordered asset list.
#[async_trait]
pub trait CaptionBuilder: Send + Sync {
    async fn write_captions(
        &self,
        assets: &[GeneratedAsset],
        output_path: &Path,
        cancel: &CancelToken,
    ) -> MediaResult<Vec<CaptionEntry>>;
}

/// [`CaptionBuilder`] producing an SRT file.
#[derive(Debug, Clone, Default)]
pub struct SrtCaptionBuilder;

impl SrtCaptionBuilder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CaptionBuilder for SrtCaptionBuilder {
    async fn write_captions(
        &self,
        assets: &[GeneratedAsset],
        output_path: &Path,
        cancel: &CancelToken,
    ) -> MediaResult<Vec<CaptionEntry>> {
        if cancel.is_cancelled() {
            return Err(MediaError::Cancelled);
        }

        info!(scenes = assets.len(), "Building caption timeline");
        let entries = build_timeline(assets);

        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut content = String::from(UTF8_BOM);
        content.push_str(&render_srt(&entries));

        cancel
            .run_until_cancelled(tokio::fs::write(output_path, content))
            .await
            .ok_or(MediaError::Cancelled)??;

        let total = entries.last().map(|e| e.end).unwrap_or_default();
        info!(
            path = %output_path.display(),
            entries = entries.len(),
            total = %format_srt_time(total),
            "Captions written"
        );

        Ok(entries)
    }
}

/// Build the caption timeline for `assets`, in scene order.
pub fn build_timeline(assets: &[GeneratedAsset]) -> Vec<CaptionEntry> {
    let mut ordered = assets.to_vec();
    sort_by_scene_index(&mut ordered);

    let mut entries = Vec::new();
    let mut scene_start = Duration::ZERO;

    for asset in &ordered {
        let scene_end = scene_start + asset.audio_duration;
        let mut sentences = split_sentences(&asset.speech_text);

        // Blank narration still occupies its slot on the timeline.
        if sentences.is_empty() {
            sentences.push(String::new());
        }

        let total_chars: u128 = sentences.iter().map(|s| s.chars().count() as u128).sum();
        let audio_nanos = asset.audio_duration.as_nanos();
        let last = sentences.len() - 1;
        let mut cursor = scene_start;

        for (i, sentence) in sentences.into_iter().enumerate() {
            let end = if i == last || total_chars == 0 {
                scene_end
            } else {
                let share = audio_nanos * sentence.chars().count() as u128 / total_chars;
                cursor + nanos_to_duration(share)
            };

            let entry = CaptionEntry {
                index: entries.len() + 1,
                start: cursor,
                end,
                text: sentence,
            };
            debug!(
                scene_index = asset.scene_index,
                "Caption {}: {} --> {} | {}",
                entry.index,
                format_srt_time(entry.start),
                format_srt_time(entry.end),
                entry.text
            );
            entries.push(entry);
            cursor = end;
        }

        scene_start = scene_end;
    }

    entries
}

/// Render entries as SRT text (without BOM).
pub fn render_srt(entries: &[CaptionEntry]) -> String {
    entries.iter().map(CaptionEntry::to_srt_block).collect()
}

fn nanos_to_duration(nanos: u128) -> Duration {
    Duration::new(
        (nanos / 1_000_000_000) as u64,
        (nanos % 1_000_000_000) as u32,
    )
}

fn is_boundary(c: char) -> bool {
    matches!(
        c,
        '。' | '？' | '！' | '，' | '；' | '：' | '.' | '?' | '!' | ',' | ';' | ':' | '\n' | '\r'
    )
}

fn is_closing(c: char) -> bool {
    matches!(c, '”' | '’' | '"' | '\'' | ')' | '）' | '》')
}

/// Split narration into caption sentences.
///
/// Boundary punctuation stays with the sentence it ends. Closing quotes or
/// brackets right after a boundary, and any further boundary characters,
/// are folded into the same sentence. Sentences are trimmed and empty ones
/// dropped; text with no boundary comes back whole.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if !is_boundary(c) {
            continue;
        }
        while let Some(&next) = chars.peek() {
            if is_closing(next) || (is_boundary(next) && !next.is_whitespace()) {
                current.push(next);
                chars.next();
            } else {
                break;
            }
        }
        push_trimmed(&mut sentences, &current);
        current.clear();
    }
    push_trimmed(&mut sentences, &current);

    sentences
}

fn push_trimmed(sentences: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
}
