//! Binary mutual-exclusion lock.
//!
//! A raw lock: it guards no payload and hands out no RAII guard, it just
//! owns one word of state. Callers pair it with whatever shared data
//! their critical sections protect, which is also what makes it usable
//! as the partner of a [`Condition`](crate::Condition).

use std::time::Duration;

use crate::error::TimeoutExpired;
use crate::raw::RawMutex;

/// A futex-backed mutual-exclusion lock.
///
/// `lock` spins briefly before parking, so short critical sections under
/// contention usually avoid the kernel entirely. No fairness is promised:
/// when several threads are parked, the wake target is whichever the
/// kernel picks, and an arriving spinner can overtake it.
///
/// # Contract
///
/// Calling [`unlock`](Lock::unlock) without holding the lock, or twice
/// for one acquisition, is a contract violation. It is neither checked
/// nor reported; mutual exclusion silently breaks.
///
/// # Example
///
/// ```ignore
/// static LOCK: Lock = Lock::new();
///
/// LOCK.lock();
/// // ... critical section ...
/// LOCK.unlock();
/// ```
pub struct Lock {
    raw: RawMutex,
}

impl Lock {
    /// Creates a new unlocked lock.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            raw: RawMutex::new(),
        }
    }

    /// Attempts to acquire the lock without blocking.
    ///
    /// Returns `false` exactly when the lock is already held; failure
    /// changes nothing.
    pub fn try_lock(&self) -> bool {
        self.raw.try_acquire()
    }

    /// Acquires the lock, blocking until it is held.
    pub fn lock(&self) {
        self.raw.acquire();
    }

    /// Acquires the lock, giving up once `timeout` has fully elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`TimeoutExpired`] if the lock could not be acquired
    /// within the budget. The error is never returned before the budget
    /// has elapsed, but may be returned somewhat after it.
    pub fn lock_timeout(&self, timeout: Duration) -> Result<(), TimeoutExpired> {
        self.raw.acquire_timeout(timeout, "Lock::lock_timeout")
    }

    /// Releases the lock and wakes one parked waiter, if any.
    pub fn unlock(&self) {
        self.raw.release();
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::UnsafeCell;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;

    struct Guarded {
        lock: Lock,
        value: UnsafeCell<u64>,
    }

    // SAFETY: `value` is only touched while `lock` is held (test
    // discipline).
    unsafe impl Sync for Guarded {}

    #[test]
    fn lock_unlock_single_thread() {
        let lock = Lock::new();

        // We can lock and unlock.
        lock.lock();
        lock.unlock();

        // First try_lock must work.
        assert!(lock.try_lock());
        // Second try_lock can't work.
        assert!(!lock.try_lock());

        lock.unlock();
        assert!(lock.try_lock());
        lock.unlock();
    }

    #[test]
    fn try_lock_does_not_disturb_state() {
        let lock = Lock::new();
        lock.lock();
        for _ in 0..10 {
            assert!(!lock.try_lock());
        }
        lock.unlock();
        assert!(lock.try_lock());
        lock.unlock();
    }

    #[test]
    fn mutual_exclusion() {
        const THREADS: usize = 8;
        const LOOPS: u64 = 10_000;

        let shared = Arc::new(Guarded {
            lock: Lock::new(),
            value: UnsafeCell::new(0),
        });

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    for _ in 0..LOOPS {
                        shared.lock.lock();
                        // SAFETY: exclusive by mutual exclusion.
                        unsafe {
                            *shared.value.get() += 1;
                        }
                        shared.lock.unlock();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // SAFETY: all writers joined.
        assert_eq!(unsafe { *shared.value.get() }, THREADS as u64 * LOOPS);
    }

    #[test]
    fn lock_timeout_on_free_lock_is_immediate() {
        let lock = Lock::new();
        assert!(lock.lock_timeout(Duration::from_millis(10)).is_ok());
        lock.unlock();
    }

    #[test]
    fn lock_timeout_expires_never_early() {
        let lock = Lock::new();
        lock.lock();

        let budget = Duration::from_millis(40);
        // The holder keeps the lock for the entire test; every attempt
        // must fail, and never before the budget has elapsed.
        for _ in 0..5 {
            let start = Instant::now();
            let err = lock.lock_timeout(budget).unwrap_err();
            assert!(start.elapsed() >= budget);
            assert_eq!(err.operation(), "Lock::lock_timeout");
            assert_eq!(err.timeout(), budget);
        }

        lock.unlock();
    }

    #[test]
    fn lock_timeout_succeeds_when_released() {
        let lock = Arc::new(Lock::new());
        lock.lock();

        let contender = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || lock.lock_timeout(Duration::from_secs(10)))
        };
        thread::sleep(Duration::from_millis(50));
        lock.unlock();

        assert!(contender.join().unwrap().is_ok());
        lock.unlock();
    }

    #[test]
    fn contended_lock_parks_and_resumes() {
        let lock = Arc::new(Lock::new());
        lock.lock();

        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                lock.lock();
                lock.unlock();
            })
        };
        // Give the waiter time to exhaust its spin budget and park.
        thread::sleep(Duration::from_millis(100));
        lock.unlock();
        waiter.join().unwrap();
    }
}
