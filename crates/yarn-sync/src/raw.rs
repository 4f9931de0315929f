//! One-word lock substrate shared by [`Lock`](crate::Lock) and
//! [`Monitor`](crate::Monitor).
//!
//! The word holds 0 (unlocked) or 1 (locked). Contended acquires spin
//! read-only for a short budget before parking on the word, and a
//! separate waiter counter lets the release path skip the wake syscall
//! when nobody can be parked. The counter is a hint: it may lag reality,
//! but a waiter always re-checks the word at the kernel's atomic check
//! point before parking, so a stale hint never loses a wake.

use std::hint;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::TimeoutExpired;
use crate::wait::{self, Deadline, WaitOutcome};

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;

/// Read-only probes per spin round before parking.
///
/// Spinning trades a bounded slice of busy CPU for skipping the
/// park/unpark round trip on short-lived contention. On a single CPU the
/// holder cannot make progress while we spin, so the budget collapses to
/// one probe.
#[cfg(not(yarn_single_cpu))]
pub(crate) const SPIN_LIMIT: u32 = 100;
#[cfg(yarn_single_cpu)]
pub(crate) const SPIN_LIMIT: u32 = 1;

/// The raw state/waiter-count pair behind the locking primitives.
pub(crate) struct RawMutex {
    state: AtomicU32,
    waiters: AtomicU32,
}

impl RawMutex {
    pub(crate) const fn new() -> Self {
        Self {
            state: AtomicU32::new(UNLOCKED),
            waiters: AtomicU32::new(0),
        }
    }

    /// One strong CAS 0→1. Never blocks; on failure the word is untouched.
    pub(crate) fn try_acquire(&self) -> bool {
        self.state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Spins read-only, attempting the CAS only when the word looks free.
    ///
    /// Polling with plain loads keeps the cache line shared between
    /// spinners; only an observed 0 triggers the invalidating CAS.
    fn spin_acquire(&self) -> bool {
        for _ in 0..SPIN_LIMIT {
            if self.state.load(Ordering::Relaxed) == UNLOCKED && self.try_acquire() {
                return true;
            }
            hint::spin_loop();
        }
        false
    }

    /// Acquires, parking on the state word between spin rounds.
    pub(crate) fn acquire(&self) {
        #[cfg(yarn_lock_stress)]
        crate::stress::delay();

        loop {
            if self.spin_acquire() {
                return;
            }
            trace!(word = self.state.as_ptr() as usize, "lock contended; parking");
            self.waiters.fetch_add(1, Ordering::AcqRel);
            let _ = wait::block(&self.state, LOCKED, None);
            self.waiters.fetch_sub(1, Ordering::Release);
        }
    }

    /// Timed acquire. The budget is spread over every spin and block
    /// slice; the error is returned no earlier than the full budget, but
    /// possibly later by up to one block call's scheduling latency.
    pub(crate) fn acquire_timeout(
        &self,
        timeout: Duration,
        operation: &'static str,
    ) -> Result<(), TimeoutExpired> {
        #[cfg(yarn_lock_stress)]
        crate::stress::delay();

        let deadline = Deadline::after(timeout);
        loop {
            if self.spin_acquire() {
                return Ok(());
            }
            let Some(left) = deadline.remaining() else {
                debug!(operation, ?timeout, "timed acquire expired");
                return Err(TimeoutExpired::new(operation, timeout));
            };
            self.waiters.fetch_add(1, Ordering::AcqRel);
            let outcome = wait::block(&self.state, LOCKED, Some(left));
            self.waiters.fetch_sub(1, Ordering::Release);
            if outcome == WaitOutcome::TimedOut {
                // The kernel slept the entire remaining budget.
                debug!(operation, ?timeout, "timed acquire expired");
                return Err(TimeoutExpired::new(operation, timeout));
            }
        }
    }

    /// Releases and wakes one parked waiter if the hint says any exist.
    pub(crate) fn release(&self) {
        #[cfg(yarn_lock_stress)]
        crate::stress::delay();

        self.state.store(UNLOCKED, Ordering::Release);
        if self.waiters.load(Ordering::Acquire) != 0 {
            wait::wake(&self.state, 1);
        }
    }

    /// Releases without waking anyone.
    pub(crate) fn release_silent(&self) {
        self.state.store(UNLOCKED, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_acquire_is_exclusive() {
        let raw = RawMutex::new();
        assert!(raw.try_acquire());
        assert!(!raw.try_acquire());
        raw.release();
        assert!(raw.try_acquire());
    }

    #[test]
    fn release_silent_frees_the_word() {
        let raw = RawMutex::new();
        assert!(raw.try_acquire());
        raw.release_silent();
        assert!(raw.try_acquire());
        raw.release();
    }

    #[test]
    fn acquire_uncontended() {
        let raw = RawMutex::new();
        raw.acquire();
        assert!(!raw.try_acquire());
        raw.release();
    }

    #[test]
    fn acquire_timeout_on_free_word_succeeds() {
        let raw = RawMutex::new();
        assert!(raw.acquire_timeout(Duration::from_millis(10), "raw").is_ok());
        raw.release();
    }
}
