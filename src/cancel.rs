//! Cooperative cancellation handles for streams and long-running operations.

use tokio_util::sync::CancellationToken;

/// A handle that can be used to request cancellation of an in-flight agent call.
///
/// Cloning shares the same underlying token: cancelling any clone cancels all of them.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Derive a child handle. Cancelling the parent cancels the child; cancelling the
    /// child does not cancel the parent. Used to scope a single step's tool workers
    /// under the call's overall cancellation.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}
