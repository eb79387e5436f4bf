//! Cooperative cancellation for long-running transition loops.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Hot loops poll the token once every this many iterations.
pub const CANCEL_CHECK_INTERVAL: usize = 32;

/// Returned when a computation observed its token being cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("state transition cancelled")]
pub struct Cancelled;

/// A shared flag that a caller can raise to abort a stale computation.
///
/// Loops observe the flag only at batch boundaries, so a cancelled computation never leaves a
/// half-written element behind. Whatever it had built so far is dropped by the `?` that
/// propagates [`Cancelled`].
#[derive(Default, Clone, Debug)]
pub struct CancelToken(Arc<AtomicBool>);

// === impl CancelToken ===

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. All clones observe it.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns true if the job was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Unconditional check, for call sites outside hot loops.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            return Err(Cancelled);
        }
        Ok(())
    }

    /// Check once per [`CANCEL_CHECK_INTERVAL`] iterations.
    #[inline]
    pub fn checkpoint(&self, iteration: usize) -> Result<(), Cancelled> {
        if iteration % CANCEL_CHECK_INTERVAL == 0 {
            self.check()?;
        }
        Ok(())
    }

    /// Returns a guard that cancels this token when dropped.
    pub fn drop_guard(&self) -> CancelOnDrop {
        CancelOnDrop(self.clone())
    }
}

/// A marker that cancels its token when dropped, tying a computation to the lifetime of
/// whoever is waiting for it.
#[derive(Debug)]
pub struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}
