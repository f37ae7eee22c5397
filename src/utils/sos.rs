//! Signal-of-Stop: cooperative cancellation primitive.
//!
//! A clonable, async-aware token shared by the dispatcher, the transport
//! event pump and the background schedulers. Cancelling any clone wakes
//! every waiter.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A cooperative cancellation token.
///
/// Clones share the same underlying state, so cancelling any clone
/// notifies all waiters.
#[derive(Debug, Default)]
pub struct SignalOfStop {
    internal: Arc<SharedState>,
}

#[derive(Debug, Default)]
struct SharedState {
    closing: AtomicBool,
    notify: Notify,
}

impl SignalOfStop {
    /// Create a new, uncancelled signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation to all waiters.
    ///
    /// After this call, `cancelled()` returns `true` and all pending
    /// `wait()` futures complete.
    pub fn cancel(&self) {
        self.internal.closing.store(true, Ordering::Release);
        self.internal.notify.notify_waiters();
    }

    /// Check if cancellation has been signaled.
    pub fn cancelled(&self) -> bool {
        self.internal.closing.load(Ordering::Acquire)
    }

    /// Wait for cancellation to be signaled.
    ///
    /// Returns immediately if already cancelled.
    pub async fn wait(&self) {
        loop {
            // Register interest before the check so a cancel that lands
            // between the two cannot be missed.
            let notified = self.internal.notify.notified();
            if self.cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Race a future against cancellation.
    ///
    /// Returns `Ok(T)` if the future completes first,
    /// `Err(())` if cancellation is signaled first.
    pub async fn select<F, T>(&self, fut: F) -> Result<T, ()>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            res = fut => Ok(res),
            _ = self.wait() => Err(()),
        }
    }
}

impl Clone for SignalOfStop {
    fn clone(&self) -> Self {
        Self {
            internal: Arc::clone(&self.internal),
        }
    }
}
