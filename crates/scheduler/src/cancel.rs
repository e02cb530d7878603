//! Cancellation token for cooperative page loading
//!
//! One token is issued per file identity. Every loader checks it before and
//! after each expensive step; once cancelled, in-flight work is discarded and
//! nothing further is published for that file.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::Notify;

/// Returned by [`CancellationToken::check`] once the token is cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Shared cancellation flag
///
/// Clones observe the same state. Besides polling with `is_cancelled()`,
/// async code can wait on [`CancellationToken::cancelled`].
///
/// # Example
///
/// ```
/// use page_editor_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let loader_token = token.clone();
///
/// token.cancel();
/// assert!(loader_token.check().is_err());
/// ```
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    /// Create a token in the non-cancelled state
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel this token and every clone of it
    ///
    /// Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once cancelled, for use with `?`
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve once the token is cancelled
    pub async fn cancelled(&self) {
        loop {
            // Registered before the flag is read, so a cancel in between
            // still wakes us
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// True when both handles share the same underlying flag
    pub fn same_as(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
