//! Cooperative shutdown: one coordinator, many cloned signals.
//!
//! Built on `tokio::sync::watch`. Every blocking operation in the pipeline
//! takes a [`CancelSignal`] and races [`CancelSignal::cancelled`] with its own
//! wait, so no suspension point outlives a shutdown request.
//!
//! Dropping the [`ShutdownCoordinator`] also counts as cancellation.

use tokio::sync::watch;

/// Owner of the cancellation flag.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    tx: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// A signal observed by one component. Clone freely.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Request shutdown. Idempotent.
    pub fn cancel(&self) {
        // send_replace works even when no receiver is alive
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Read side of the cancellation flag.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once shutdown has been requested (immediately if it already was).
    ///
    /// Cancel-safe: dropping the future has no side effect, so it can sit in
    /// any `tokio::select!` branch.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // Err は coordinator が drop された場合。これも停止扱い
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn signal_starts_uncancelled() {
        let coordinator = ShutdownCoordinator::new();
        let signal = coordinator.signal();
        assert!(!signal.is_cancelled());

        let waited = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn cancel_wakes_every_waiter() {
        let coordinator = ShutdownCoordinator::new();
        let a = coordinator.signal();
        let b = a.clone();

        let wa = tokio::spawn(async move { a.cancelled().await });
        let wb = tokio::spawn(async move { b.cancelled().await });

        coordinator.cancel();
        coordinator.cancel();

        wa.await.unwrap();
        wb.await.unwrap();
        assert!(coordinator.is_cancelled());
    }

    #[tokio::test]
    async fn already_cancelled_resolves_immediately() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.cancel();

        let signal = coordinator.signal();
        assert!(signal.is_cancelled());
        signal.cancelled().await;
    }

    #[tokio::test]
    async fn dropping_the_coordinator_cancels() {
        let coordinator = ShutdownCoordinator::new();
        let signal = coordinator.signal();
        drop(coordinator);

        assert!(signal.is_cancelled());
        signal.cancelled().await;
    }
}
