//! Kernel wait/wake facility.
//!
//! Every primitive in this crate folds its state down to a single `u32`
//! word and parks threads on that word through [`WaitBackend`]. On Linux
//! the backend is the `futex(2)` syscall; elsewhere a table of
//! condvar-based parking slots emulates the same contract.
//!
//! The contract is deliberately weak: [`block`] may return at any time
//! (wake, value mismatch, timeout, spurious interruption), so every
//! caller re-checks its guarding condition in a loop. [`wake`] makes up
//! to `count` blocked threads runnable, in no particular order.

use std::sync::atomic::AtomicU32;
use std::time::{Duration, Instant};

use tracing::trace;

/// Why a [`WaitBackend::block`] call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    /// Woken, value mismatch at the check point, or a spurious return.
    /// The caller must re-check its guarding condition.
    Woken,
    /// The full timeout elapsed while blocked.
    TimedOut,
}

/// A facility that can park threads on a memory word and wake them.
///
/// `block` suspends the caller only if `*word == expected` at the
/// backend's atomic check point; otherwise it returns immediately with
/// [`WaitOutcome::Woken`]. Alternate backends can be substituted without
/// touching the primitives built on top.
pub(crate) trait WaitBackend {
    /// Parks the calling thread on `word` while it still equals `expected`.
    fn block(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> WaitOutcome;

    /// Makes up to `count` threads blocked on `word` runnable.
    ///
    /// Non-blocking; wakes are not guaranteed to preserve arrival order.
    fn wake(word: &AtomicU32, count: u32);
}

#[cfg(target_os = "linux")]
pub(crate) type Platform = futex::Futex;
#[cfg(not(target_os = "linux"))]
pub(crate) type Platform = slots::SlotQueue;

/// Parks the calling thread via the platform backend. See [`WaitBackend::block`].
pub(crate) fn block(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> WaitOutcome {
    trace!(
        word = word.as_ptr() as usize,
        expected,
        ?timeout,
        "blocking on wait word"
    );
    Platform::block(word, expected, timeout)
}

/// Wakes up to `count` threads blocked on `word`. See [`WaitBackend::wake`].
pub(crate) fn wake(word: &AtomicU32, count: u32) {
    Platform::wake(word, count);
}

// ---------------------------------------------------------------------------
// Timeout accounting
// ---------------------------------------------------------------------------

/// Cumulative elapsed-time budget for a timed acquire.
///
/// Tracks a monotonic start instant plus the caller's budget. The budget
/// is spread across repeated spin and block slices; [`remaining`] reports
/// `None` only once the full budget has truly elapsed, so a timeout is
/// never reported early (it may be reported late, after the final block
/// slice returns).
///
/// [`remaining`]: Deadline::remaining
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    start: Instant,
    budget: Duration,
}

impl Deadline {
    /// Starts a deadline `budget` from now.
    pub(crate) fn after(budget: Duration) -> Self {
        Self {
            start: Instant::now(),
            budget,
        }
    }

    /// Returns the unspent budget, or `None` once it is exhausted.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.budget
            .checked_sub(self.start.elapsed())
            .filter(|left| *left > Duration::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Linux backend: futex(2)
// ---------------------------------------------------------------------------

#[cfg(target_os = "linux")]
mod futex {
    use std::io;
    use std::ptr;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use super::{WaitBackend, WaitOutcome};

    /// `futex(2)`-backed wait queue.
    ///
    /// Uses `FUTEX_PRIVATE_FLAG`: these words are never shared across
    /// address spaces.
    pub(crate) struct Futex;

    impl WaitBackend for Futex {
        fn block(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> WaitOutcome {
            // FUTEX_WAIT takes a relative timeout measured against the
            // monotonic clock; a null pointer blocks indefinitely.
            let ts = timeout.map(|t| libc::timespec {
                tv_sec: libc::time_t::try_from(t.as_secs()).unwrap_or(libc::time_t::MAX),
                tv_nsec: libc::c_long::try_from(t.subsec_nanos()).unwrap_or(999_999_999),
            });
            let ts_ptr = ts
                .as_ref()
                .map_or(ptr::null(), |ts| ptr::from_ref::<libc::timespec>(ts));

            // SAFETY: `word` outlives the call and `ts_ptr` is null or
            // points to a live timespec; the kernel only reads both.
            let rc = unsafe {
                libc::syscall(
                    libc::SYS_futex,
                    word.as_ptr(),
                    libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                    expected,
                    ts_ptr,
                    ptr::null::<u32>(),
                    0u32,
                )
            };

            if rc == 0 {
                return WaitOutcome::Woken;
            }
            match io::Error::last_os_error().raw_os_error() {
                Some(libc::ETIMEDOUT) => WaitOutcome::TimedOut,
                // EAGAIN: the word no longer held `expected` at the check
                // point. EINTR: signal delivery. Both are re-check cases.
                _ => WaitOutcome::Woken,
            }
        }

        fn wake(word: &AtomicU32, count: u32) {
            // SAFETY: `word` is a live, aligned u32; FUTEX_WAKE does not
            // dereference beyond it.
            let _ = unsafe {
                libc::syscall(
                    libc::SYS_futex,
                    word.as_ptr(),
                    libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                    count,
                    ptr::null::<libc::timespec>(),
                    ptr::null::<u32>(),
                    0u32,
                )
            };
        }
    }
}

// ---------------------------------------------------------------------------
// Portable backend: hashed condvar slots
// ---------------------------------------------------------------------------

#[cfg(any(not(target_os = "linux"), test))]
mod slots {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Condvar, Mutex, PoisonError};
    use std::time::Duration;

    use super::{WaitBackend, WaitOutcome};

    const SLOT_COUNT: usize = 64;

    struct Slot {
        lock: Mutex<()>,
        cv: Condvar,
    }

    static SLOTS: [Slot; SLOT_COUNT] = [const {
        Slot {
            lock: Mutex::new(()),
            cv: Condvar::new(),
        }
    }; SLOT_COUNT];

    fn slot_for(word: *const u32) -> &'static Slot {
        // Fibonacci hash over the word address; distinct words may share
        // a slot, which surfaces as tolerated spurious wakes.
        let h = (word as usize >> 2).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        &SLOTS[h >> (usize::BITS - 6)]
    }

    /// Condvar-table emulation of the futex contract for platforms
    /// without one.
    pub(crate) struct SlotQueue;

    impl WaitBackend for SlotQueue {
        fn block(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> WaitOutcome {
            let slot = slot_for(word.as_ptr());
            let guard = slot.lock.lock().unwrap_or_else(PoisonError::into_inner);
            // Check-then-block is atomic with respect to `wake`, which
            // passes through the same slot mutex before notifying.
            if word.load(Ordering::SeqCst) != expected {
                return WaitOutcome::Woken;
            }
            match timeout {
                None => {
                    let _guard = slot.cv.wait(guard).unwrap_or_else(PoisonError::into_inner);
                    WaitOutcome::Woken
                }
                Some(t) => {
                    let (_guard, res) = slot
                        .cv
                        .wait_timeout(guard, t)
                        .unwrap_or_else(PoisonError::into_inner);
                    if res.timed_out() {
                        WaitOutcome::TimedOut
                    } else {
                        WaitOutcome::Woken
                    }
                }
            }
        }

        fn wake(word: &AtomicU32, _count: u32) {
            let slot = slot_for(word.as_ptr());
            // Serialize with the check in `block` so a waiter that has
            // seen the old value is already on the condvar.
            drop(slot.lock.lock().unwrap_or_else(PoisonError::into_inner));
            // Slots are shared between words, so a targeted notify_one
            // could deliver to the wrong word and strand the right
            // waiter. Wake everyone; they re-check and re-park.
            slot.cv.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    use super::slots::SlotQueue;
    use super::{Deadline, Platform, WaitBackend, WaitOutcome};

    fn backends() -> [(&'static str, BlockFn, WakeFn); 2] {
        [
            ("platform", Platform::block, Platform::wake),
            ("slots", SlotQueue::block, SlotQueue::wake),
        ]
    }

    type BlockFn = fn(&AtomicU32, u32, Option<Duration>) -> WaitOutcome;
    type WakeFn = fn(&AtomicU32, u32);

    #[test]
    fn mismatch_returns_immediately() {
        for (name, block, _) in backends() {
            let word = AtomicU32::new(1);
            let start = Instant::now();
            let out = block(&word, 0, None);
            assert_eq!(out, WaitOutcome::Woken, "{name}");
            assert!(start.elapsed() < Duration::from_secs(5), "{name}");
        }
    }

    #[test]
    fn timeout_elapses_fully() {
        for (name, block, _) in backends() {
            let word = AtomicU32::new(7);
            let budget = Duration::from_millis(50);
            let deadline = Deadline::after(budget);
            let start = Instant::now();
            // Spurious early returns are allowed; keep blocking until the
            // budget is spent, the way the timed primitives do.
            while let Some(left) = deadline.remaining() {
                let _ = block(&word, 7, Some(left));
            }
            assert!(start.elapsed() >= budget, "{name}");
        }
    }

    #[test]
    fn wake_unblocks_waiter() {
        for (_name, block, wake) in backends() {
            let word = Arc::new(AtomicU32::new(0));
            let waiter = {
                let word = Arc::clone(&word);
                thread::spawn(move || {
                    while word.load(Ordering::Acquire) == 0 {
                        let _ = block(&word, 0, None);
                    }
                })
            };
            thread::sleep(Duration::from_millis(50));
            word.store(1, Ordering::Release);
            wake(&word, 1);
            waiter.join().unwrap();
        }
    }

    #[test]
    fn wake_without_waiters_is_harmless() {
        for (_name, _block, wake) in backends() {
            let word = AtomicU32::new(0);
            wake(&word, 1);
            wake(&word, u32::MAX);
        }
    }

    #[test]
    fn deadline_expires() {
        let d = Deadline::after(Duration::from_millis(20));
        assert!(d.remaining().is_some());
        thread::sleep(Duration::from_millis(30));
        assert!(d.remaining().is_none());
    }

    #[test]
    fn deadline_remaining_shrinks() {
        let d = Deadline::after(Duration::from_secs(60));
        let first = d.remaining().unwrap();
        thread::sleep(Duration::from_millis(10));
        let second = d.remaining().unwrap();
        assert!(second < first);
    }
}
