//! Cooperative cancellation signal threaded through the orchestrator and its
//! spawned stage tasks (spec §5).
//!
//! A cancellation aborts whichever stage is in flight and the orchestrator
//! reports `overall_verdict = cancelled` rather than an error or a partial
//! finding -- cancellation is a first-class outcome, not a failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once [`CancellationToken::cancel`] has been called. Returns
    /// immediately if already cancelled.
    ///
    /// Registers interest in the next `notify_waiters()` call *before*
    /// checking the flag: `Notify` only wakes waiters registered at the
    /// moment `notify_waiters()` runs, so checking the flag first and only
    /// then awaiting `notified()` leaves a window where a `cancel()` on
    /// another task is missed for good.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled() {
        assert!(!CancellationToken::new().is_cancelled());
    }

    #[tokio::test]
    async fn cancel_resolves_pending_waiters() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        token.cancel();
        handle.await.unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_returns_immediately_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        tokio::time::timeout(std::time::Duration::from_millis(50), token.cancelled())
            .await
            .expect("cancelled() must not block once already cancelled");
    }
}
