//! Cooperative cancellation for suspending store calls.
//!
//! Dropping a future is always a valid way to cancel it. The token exists for
//! callers that want to cancel from elsewhere (a shutdown signal, a request
//! deadline) without owning the future.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::DomainError;

/// Clonable cancellation signal. All clones observe the same state.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    /// Creates a token that is not yet cancelled.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Cancels every operation observing this token.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Returns whether `cancel` has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so this cannot observe a close.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `fut` unless `token` is cancelled first.
///
/// # Errors
///
/// `DomainError::Cancelled` if the token fires before `fut` completes,
/// otherwise whatever `fut` returns.
pub async fn run_cancellable<F, T>(token: &CancellationToken, fut: F) -> Result<T, DomainError>
where
    F: Future<Output = Result<T, DomainError>>,
{
    if token.is_cancelled() {
        return Err(DomainError::Cancelled);
    }
    tokio::select! {
        biased;
        () = token.cancelled() => Err(DomainError::Cancelled),
        result = fut => result,
    }
}
