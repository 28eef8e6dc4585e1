//! Cooperative cancellation.
//!
//! A [`CancelSource`] is owned by whoever drives a run; every stage and
//! every external call receives a cloned [`CancelToken`] and checks it at
//! its suspension points.

use std::future::Future;

use tokio::sync::watch;

/// Owning side of a cancellation signal.
#[derive(Debug)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSource {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Hand out a token observing this source.
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Signal cancellation to every token. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Observing side of a cancellation signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is signalled.
    ///
    /// Never resolves if the source is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Drive `fut` to completion unless cancellation wins first.
    ///
    /// Returns `None` when cancelled; `fut` is dropped at that point, which
    /// releases anything it held (semaphore permits, child processes).
    pub async fn run_until_cancelled<F>(&self, fut: F) -> Option<F::Output>
    where
        F: Future,
    {
        if self.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => None,
            output = fut => Some(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready};

    #[test]
    fn test_cancel_wakes_waiter() {
        let source = CancelSource::new();
        let token = source.token();

        let mut waiter = tokio_test::task::spawn(token.cancelled());
        assert_pending!(waiter.poll());

        source.cancel();
        assert!(waiter.is_woken());
        assert_ready!(waiter.poll());
        assert!(token.is_cancelled());
        assert!(source.is_cancelled());
    }

    #[test]
    fn test_never_token_stays_pending() {
        let token = CancelToken::never();
        let mut waiter = tokio_test::task::spawn(token.cancelled());
        assert_pending!(waiter.poll());
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_run_until_cancelled() {
        let source = CancelSource::new();
        let token = source.token();

        assert_eq!(token.run_until_cancelled(async { 7 }).await, Some(7));

        source.cancel();
        let result = token
            .run_until_cancelled(std::future::pending::<u32>())
            .await;
        assert_eq!(result, None);
    }
}
