//! Request cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
    aborted: AtomicBool,
    notify: Notify,
}

/// Cloneable cancellation flag shared between a caller and its requests.
///
/// Once aborted it stays aborted. Every clone observes the same state.
#[derive(Clone, Default)]
pub struct AbortSignal {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal that is already aborted.
    pub fn aborted_signal() -> Self {
        let signal = Self::new();
        signal.abort();
        signal
    }

    pub fn abort(&self) {
        if !self.inner.aborted.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// Resolves once the signal is aborted. Never resolves otherwise.
    pub async fn aborted(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking so an abort in between is not missed
            notified.as_mut().enable();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}
