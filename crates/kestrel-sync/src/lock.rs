use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::trace;

/// Session-wide flag that suppresses background ticks.
///
/// Counted rather than boolean: overlapping foreground operations (a send
/// and a conversation switch, say) each hold it, and it reads as free only
/// once the last of them is done.
#[derive(Debug, Default)]
pub struct RefreshLock {
    holders: AtomicUsize,
}

impl RefreshLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self) -> bool {
        self.holders.load(Ordering::Acquire) > 0
    }

    /// Hold the lock until the returned guard is dropped.
    pub fn acquire(self: &Arc<Self>, reason: &'static str) -> RefreshGuard {
        let holders = self.holders.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(reason, holders, "refresh lock acquired");
        RefreshGuard {
            lock: Arc::clone(self),
            reason,
        }
    }
}

#[must_use = "the refresh lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct RefreshGuard {
    lock: Arc<RefreshLock>,
    reason: &'static str,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        let holders = self.lock.holders.fetch_sub(1, Ordering::AcqRel) - 1;
        trace!(reason = self.reason, holders, "refresh lock released");
    }
}
