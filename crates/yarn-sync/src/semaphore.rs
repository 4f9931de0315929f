//! Counting semaphore.
//!
//! The count lives in one word so takers can park on it directly: a
//! blocked `take` waits for the word to leave zero, and every `give`
//! wakes at most one parked taker. The count is unbounded above; no
//! ceiling is enforced.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tracing::trace;

use crate::error::TimeoutExpired;
use crate::raw::SPIN_LIMIT;
use crate::wait::{self, Deadline, WaitOutcome};

/// A futex-backed counting semaphore.
///
/// Like [`Lock`](crate::Lock), takers spin briefly before parking, and
/// no fairness is promised among concurrent takers.
pub struct Semaphore {
    count: AtomicU32,
    waiters: AtomicU32,
}

impl Semaphore {
    /// Creates a semaphore holding `initial` units.
    #[must_use]
    pub const fn new(initial: u32) -> Self {
        Self {
            count: AtomicU32::new(initial),
            waiters: AtomicU32::new(0),
        }
    }

    /// Attempts to take one unit without blocking.
    ///
    /// Returns `false` exactly when the count is zero; failure changes
    /// nothing. Concurrent decrements are absorbed by the internal
    /// read-recompute-retry loop.
    pub fn try_take(&self) -> bool {
        self.count
            .fetch_update(Ordering::Acquire, Ordering::Relaxed, |count| {
                count.checked_sub(1)
            })
            .is_ok()
    }

    /// Takes one unit, blocking until one is available.
    pub fn take(&self) {
        loop {
            if self.spin_take() {
                return;
            }
            trace!(word = self.count.as_ptr() as usize, "semaphore empty; parking");
            self.waiters.fetch_add(1, Ordering::AcqRel);
            let _ = wait::block(&self.count, 0, None);
            self.waiters.fetch_sub(1, Ordering::Release);
        }
    }

    /// Takes one unit, giving up once `timeout` has fully elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`TimeoutExpired`] if no unit became available within the
    /// budget; never before the budget has elapsed, possibly somewhat
    /// after.
    pub fn take_timeout(&self, timeout: Duration) -> Result<(), TimeoutExpired> {
        let deadline = Deadline::after(timeout);
        loop {
            if self.spin_take() {
                return Ok(());
            }
            let Some(left) = deadline.remaining() else {
                return Err(TimeoutExpired::new("Semaphore::take_timeout", timeout));
            };
            self.waiters.fetch_add(1, Ordering::AcqRel);
            let outcome = wait::block(&self.count, 0, Some(left));
            self.waiters.fetch_sub(1, Ordering::Release);
            if outcome == WaitOutcome::TimedOut {
                return Err(TimeoutExpired::new("Semaphore::take_timeout", timeout));
            }
        }
    }

    /// Returns one unit. Never blocks, never fails.
    pub fn give(&self) {
        self.count.fetch_add(1, Ordering::Release);
        if self.waiters.load(Ordering::Acquire) != 0 {
            wait::wake(&self.count, 1);
        }
    }

    /// A snapshot of the current count.
    ///
    /// Stale the moment it is returned; useful for diagnostics only.
    #[must_use]
    pub fn available(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    fn spin_take(&self) -> bool {
        for _ in 0..SPIN_LIMIT {
            if self.count.load(Ordering::Relaxed) > 0 && self.try_take() {
                return true;
            }
            std::hint::spin_loop();
        }
        false
    }
}
