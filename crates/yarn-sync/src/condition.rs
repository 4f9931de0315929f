//! Condition variable paired with a caller-supplied [`Lock`].
//!
//! A generation counter is the futex word. Each waiter bumps it and
//! parks on its own post-increment value; each notification bumps it
//! again before waking. The notify-side bump is what closes the window
//! between a waiter releasing its lock and reaching the kernel: a
//! notification landing in that window changes the word, so the late
//! park fails the value check and the waiter retries instead of
//! sleeping through it.
//!
//! The condition never evaluates predicates; it only multiplexes wake
//! signals. Callers hold the paired lock around both the predicate check
//! and the notification, and re-check after every return from [`wait`]
//! because spurious wakeups are always possible:
//!
//! ```ignore
//! lock.lock();
//! while !ready {
//!     cond.wait(&lock);
//! }
//! // ... ready, lock held ...
//! lock.unlock();
//! ```
//!
//! [`wait`]: Condition::wait

use std::sync::atomic::{AtomicU32, Ordering};

use crate::lock::Lock;
use crate::wait;

/// A futex-backed condition variable.
///
/// All waiters on one `Condition` must pair it with the same [`Lock`],
/// and that lock must be held when calling [`wait`](Condition::wait).
/// Notifications pick waiters arbitrarily; no arrival order is
/// promised.
pub struct Condition {
    generation: AtomicU32,
    waiters: AtomicU32,
}

impl Condition {
    /// Creates a new condition variable.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            generation: AtomicU32::new(0),
            waiters: AtomicU32::new(0),
        }
    }

    /// Releases `lock`, waits for a notification, re-acquires `lock`.
    ///
    /// The caller must hold `lock`. May return spuriously; the caller
    /// re-checks its predicate in a loop. On return the lock is held
    /// again: there is no window in which this waiter has returned but
    /// does not own the lock.
    pub fn wait(&self, lock: &Lock) {
        self.waiters.fetch_add(1, Ordering::AcqRel);
        // Park on the value the word holds after our own bump; any later
        // increment (another waiter arriving or any notification) makes
        // the park a no-op instead of a missed wake.
        let g = self
            .generation
            .fetch_add(1, Ordering::AcqRel)
            .wrapping_add(1);
        lock.unlock();
        let _ = wait::block(&self.generation, g, None);
        self.waiters.fetch_sub(1, Ordering::Release);
        lock.lock();
    }

    /// Wakes one waiter, if any are blocked.
    pub fn notify_one(&self) {
        self.generation.fetch_add(1, Ordering::Release);
        if self.waiters.load(Ordering::Acquire) != 0 {
            wait::wake(&self.generation, 1);
        }
    }

    /// Wakes every blocked waiter.
    pub fn notify_all(&self) {
        self.generation.fetch_add(1, Ordering::Release);
        if self.waiters.load(Ordering::Acquire) != 0 {
            wait::wake(&self.generation, u32::MAX);
        }
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self::new()
    }
}
