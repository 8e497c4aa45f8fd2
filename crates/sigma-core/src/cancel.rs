//! Cooperative cancellation for long-lived handlers.

use std::sync::Arc;
use tokio::sync::watch;

/// Create a linked canceller/signal pair.
pub fn cancellation() -> (Canceller, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    let canceller = Canceller { tx: Arc::new(tx) };
    let signal = CancelSignal {
        rx,
        _keepalive: None,
    };
    (canceller, signal)
}

/// Owning side of a cancellation pair. Cloning shares the same signal.
#[derive(Debug, Clone)]
pub struct Canceller {
    tx: Arc<watch::Sender<bool>>,
}

impl Canceller {
    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// A new observer of this canceller.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
            _keepalive: None,
        }
    }

    /// Derive a pair that is cancelled on its own or whenever `self` is.
    ///
    /// Must be called inside a Tokio runtime; the link is a small task that
    /// exits as soon as either side fires or the child is dropped.
    pub fn child(&self) -> (Canceller, CancelSignal) {
        let (child, signal) = cancellation();
        let parent = self.signal();
        let link = Arc::downgrade(&child.tx);
        let child_closed = child.signal();
        tokio::spawn(async move {
            tokio::select! {
                _ = parent.cancelled() => {
                    if let Some(tx) = link.upgrade() {
                        tx.send_replace(true);
                    }
                }
                _ = child_closed.cancelled() => {}
            }
        });
        (child, signal)
    }
}

/// Observing side of a cancellation pair.
///
/// Dropping every [`Canceller`] for a signal counts as cancellation: the
/// owner of the request lifecycle is gone.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once the signal fires.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            // Err means every sender is gone, which is cancellation as well.
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::never()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiter() {
        let (canceller, signal) = cancellation();
        assert!(!signal.is_cancelled());

        let waiter = tokio::spawn({
            let signal = signal.clone();
            async move { signal.cancelled().await }
        });

        canceller.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(signal.is_cancelled());
        assert!(canceller.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_canceller_counts_as_cancelled() {
        let (canceller, signal) = cancellation();
        drop(canceller);
        assert!(signal.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
            .await
            .expect("dropped canceller should resolve");
    }

    #[tokio::test]
    async fn test_never_does_not_fire() {
        let signal = CancelSignal::never();
        assert!(!signal.is_cancelled());
        let fired = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(fired.is_err());
    }

    #[tokio::test]
    async fn test_child_follows_parent() {
        let (parent, _parent_signal) = cancellation();
        let (child, child_signal) = parent.child();

        parent.cancel();
        tokio::time::timeout(Duration::from_secs(1), child_signal.cancelled())
            .await
            .expect("child should be cancelled with parent");
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn test_child_cancel_does_not_reach_parent() {
        let (parent, parent_signal) = cancellation();
        let (child, child_signal) = parent.child();

        child.cancel();
        child_signal.cancelled().await;
        tokio::task::yield_now().await;
        assert!(!parent_signal.is_cancelled());
    }
}
