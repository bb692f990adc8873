//! Cooperative cancellation for workflows.
//!
//! Cancellation is non-preemptive: it flips a flag the scheduling loop
//! checks between rounds. In-flight agent calls are never aborted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Thread-safe cancellation token.
///
/// Tokens are cheaply cloneable; every clone shares the same state, so a
/// token handed to a scheduling loop observes a cancel issued anywhere.
///
/// # Example
///
/// ```ignore
/// let source = CancellationTokenSource::new();
/// let token = source.token();
///
/// tokio::select! {
///     _ = token.cancelled() => { /* stop scheduling */ }
///     result = run_round() => { /* continue */ }
/// }
/// ```
#[derive(Clone, Debug)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    pub(crate) fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Returns true once the token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Completes when the token is cancelled.
    ///
    /// Returns immediately if cancellation already happened.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        let notified = self.notify.notified();
        // Re-check after registering: a cancel between the first check and
        // registration would otherwise be missed.
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// Owner of a cancellation token.
///
/// The source hands out tokens and triggers cancellation; cancelling is
/// idempotent and wakes every waiter.
#[derive(Clone)]
pub struct CancellationTokenSource {
    token: CancellationToken,
}

impl CancellationTokenSource {
    /// Creates a new source with a fresh, non-cancelled token.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Returns a token sharing this source's state.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancels the token, waking all waiters. Idempotent.
    pub fn cancel(&self) {
        self.token.cancelled.store(true, Ordering::SeqCst);
        self.token.notify.notify_waiters();
    }
}

impl Default for CancellationTokenSource {
    fn default() -> Self {
        Self::new()
    }
}
