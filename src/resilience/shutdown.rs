//! Single hierarchical cancellation signal.
//!
//! One `ShutdownSignal` is created per crawl run and cloned into every
//! worker, background loop and prober. Cancellation is level-triggered:
//! `cancelled()` resolves immediately once the signal has fired.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<ShutdownInner>,
}

struct ShutdownInner {
    flag: AtomicBool,
    notify: Notify,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ShutdownInner {
                flag: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Trip the signal. Idempotent.
    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Suspend until the signal fires.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        // Re-check after registering to avoid a lost wakeup between the
        // flag read and notified().await.
        let notified = self.inner.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// Run `fut` unless cancellation fires first. Returns `None` when
    /// cancelled.
    pub async fn guard<F, T>(&self, fut: F) -> Option<T>
    where
        F: std::future::Future<Output = T>,
    {
        tokio::select! {
            _ = self.cancelled() => None,
            value = fut => Some(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let signal = ShutdownSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
            true
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.cancel();
        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_guard_returns_none_on_cancel() {
        let signal = ShutdownSignal::new();
        signal.cancel();
        let result = signal
            .guard(tokio::time::sleep(Duration::from_secs(60)))
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_guard_passes_value_through() {
        let signal = ShutdownSignal::new();
        let result = signal.guard(async { 42 }).await;
        assert_eq!(result, Some(42));
    }
}
