//! Cooperative cancellation and progress reporting for batch operations.
//!
//! Batch update checks poll a [`CancellationToken`] between extensions and
//! report each finished extension to a [`ProgressSink`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cancellation token for cooperative cancellation of async operations.
///
/// This token can be cloned and shared across tasks. When `cancel()` is called
/// on any clone, all clones will observe the cancellation.
///
/// # Example
///
/// ```
/// use extsync_core::cancel::CancellationToken;
///
/// let token = CancellationToken::new();
/// let token_clone = token.clone();
///
/// token_clone.cancel();
/// assert!(token.is_requested());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new cancellation token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation has been requested.
    pub fn is_requested(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the cancellation state so the token can drive another batch.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Return `Err(SyncError::Cancelled)` if cancellation was requested.
    pub fn check(&self) -> crate::Result<()> {
        if self.is_requested() {
            Err(crate::SyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Receives one notification per processed item of a batch.
pub trait ProgressSink: Send + Sync {
    /// Called after `id` has been processed, whether it succeeded or not.
    fn advance(&self, id: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn advance(&self, id: &str) {
        self(id)
    }
}

/// A sink that drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn advance(&self, _id: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_new_token_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_requested());
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_clone_shares_state() {
        let token1 = CancellationToken::new();
        let token2 = token1.clone();

        token1.cancel();

        assert!(token2.is_requested());
        assert!(matches!(token2.check(), Err(crate::SyncError::Cancelled)));
    }

    #[test]
    fn test_reset() {
        let token = CancellationToken::default();
        token.cancel();
        token.reset();
        assert!(!token.is_requested());
    }

    #[test]
    fn test_closure_progress_sink() {
        let seen = Mutex::new(Vec::new());
        let sink = |id: &str| seen.lock().unwrap().push(id.to_string());
        sink.advance("a");
        sink.advance("b");
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
    }
}
