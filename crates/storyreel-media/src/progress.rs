//! Parsing of FFmpeg's `-progress` key=value stream.

use std::time::Duration;

use serde::Serialize;

/// Snapshot emitted at the end of each `-progress` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FfmpegProgress {
    pub frame: u64,
    /// Output timestamp reached so far
    pub out_time: Duration,
    /// Realtime multiple; 0 until FFmpeg reports one
    pub speed: f64,
    /// Set by the final `progress=end` block
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Share of `total` encoded so far, in `0.0..=1.0`.
    pub fn fraction_of(&self, total: Duration) -> f64 {
        if total.is_zero() {
            return 0.0;
        }
        (self.out_time.as_secs_f64() / total.as_secs_f64()).min(1.0)
    }
}

/// Fold one `-progress` line into `current`.
///
/// Returns a snapshot on each `progress=` line, which closes a block.
pub fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let (key, value) = line.trim().split_once('=')?;
    let value = value.trim();

    match key {
        // out_time_ms is microseconds too, despite its name.
        "out_time_us" | "out_time_ms" => {
            if let Ok(us) = value.parse::<u64>() {
                current.out_time = Duration::from_micros(us);
            }
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "speed" => {
            if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            current.is_complete = value == "end";
            return Some(current.clone());
        }
        _ => {}
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_produces_snapshot() {
        let mut current = FfmpegProgress::default();
        let block = ["frame=120", "out_time_us=5000000", "speed=1.5x", "progress=continue"];

        let snapshots: Vec<_> = block
            .iter()
            .filter_map(|line| parse_progress_line(line, &mut current))
            .collect();

        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].frame, 120);
        assert_eq!(snapshots[0].out_time, Duration::from_secs(5));
        assert!(!snapshots[0].is_complete);
        assert!((snapshots[0].fraction_of(Duration::from_secs(10)) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_unparseable_values_keep_previous() {
        let mut current = FfmpegProgress::default();
        parse_progress_line("speed=2.0x", &mut current);
        parse_progress_line("speed=N/A", &mut current);
        parse_progress_line("out_time_us=N/A", &mut current);

        assert!((current.speed - 2.0).abs() < 1e-9);
        assert_eq!(current.out_time, Duration::ZERO);
        assert!(parse_progress_line("not a progress line", &mut current).is_none());
    }

    #[test]
    fn test_end_marks_complete() {
        let mut current = FfmpegProgress::default();
        let last = parse_progress_line("progress=end", &mut current).unwrap();
        assert!(last.is_complete);
        assert_eq!(last.fraction_of(Duration::ZERO), 0.0);
    }
}
