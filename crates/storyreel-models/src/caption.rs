//! Caption entries and SRT timestamp formatting.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One timed subtitle line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionEntry {
    /// 1-based global index
    pub index: usize,
    pub start: Duration,
    pub end: Duration,
    pub text: String,
}

impl CaptionEntry {
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }

    /// Render as an SRT block, including the trailing blank separator line.
    pub fn to_srt_block(&self) -> String {
        format!(
            "{}\n{} --> {}\n{}\n\n",
            self.index,
            format_srt_time(self.start),
            format_srt_time(self.end),
            self.text
        )
    }
}

/// Format a timestamp as `HH:MM:SS,mmm`.
///
/// Sub-millisecond precision is truncated, not rounded.
pub fn format_srt_time(ts: Duration) -> String {
    let total_ms = ts.as_millis();
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let seconds = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}
