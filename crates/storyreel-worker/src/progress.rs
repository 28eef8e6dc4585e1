//! Progress publishing.
//!
//! The orchestrator publishes [`ProductionProgress`] events into an unbounded
//! channel; the host drains the receiver on its own schedule. Percentages
//! never go backwards, even when scenes finish out of order.

use std::sync::Mutex;

use storyreel_models::ProductionProgress;
use tokio::sync::mpsc;
use tracing::debug;

/// Publishing half of a progress channel.
#[derive(Debug)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ProductionProgress>>,
    /// Highest percentage published so far.
    last: Mutex<u8>,
}

impl ProgressSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProductionProgress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(tx),
                last: Mutex::new(0),
            },
            rx,
        )
    }

    /// A sink that drops every event.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            last: Mutex::new(0),
        }
    }

    /// Publish `progress`, raising its percentage to the last one sent if lower.
    pub fn report(&self, mut progress: ProductionProgress) {
        // Held across send so concurrent reporters publish in percentage order.
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        progress.percentage = progress.percentage.clamp(*last, 100);
        *last = progress.percentage;

        debug!(
            stage = %progress.stage,
            percentage = progress.percentage,
            "{}", progress.step
        );

        if let Some(tx) = &self.tx {
            // Receiver gone means nobody is listening; not an error.
            let _ = tx.send(progress);
        }
    }

    pub fn last_percentage(&self) -> u8 {
        *self.last.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ProgressSink {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyreel_models::ProductionStage;

    #[test]
    fn test_percentage_never_decreases() {
        let (sink, mut rx) = ProgressSink::channel();

        sink.report(ProductionProgress::scene_completed(2, 3));
        sink.report(ProductionProgress::scene_completed(1, 3));
        sink.report(ProductionProgress::stage_entry(ProductionStage::Failed, "Failed"));

        let seen: Vec<u8> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|p| p.percentage)
            .collect();
        assert_eq!(seen, vec![56, 56, 56]);
        assert_eq!(sink.last_percentage(), 56);
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (sink, rx) = ProgressSink::channel();
        drop(rx);
        sink.report(ProductionProgress::stage_entry(ProductionStage::Parse, "Parsing"));
        assert_eq!(sink.last_percentage(), 5);
    }
}
