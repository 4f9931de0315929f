//! Lock contention stress delays.
//!
//! Injects random spin delays around lock acquire/release to widen race
//! windows and surface timing-dependent bugs. Compiled only under
//! `cfg(yarn_lock_stress)`; normal builds carry none of this.
//!
//! - **PRNG**: xorshift64, per-thread state in a `thread_local` — no
//!   locking on the delay path.
//! - **Delay**: spins for a random duration in `[0, max_us)`
//!   microseconds, measured against the monotonic clock.

use std::cell::Cell;
use std::hint;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

/// Maximum stress delay in microseconds.
static MAX_US: AtomicU32 = AtomicU32::new(10);

thread_local! {
    /// Per-thread xorshift64 state; 0 means "not yet seeded".
    static PRNG_STATE: Cell<u64> = const { Cell::new(0) };
}

/// Sets the maximum random delay in microseconds. 0 disables delays.
pub fn set_max_us(max_us: u32) {
    MAX_US.store(max_us, Ordering::Relaxed);
}

/// Returns the next pseudo-random u64 for the current thread.
#[inline]
fn next_random() -> u64 {
    PRNG_STATE.with(|state| {
        let mut x = state.get();
        if x == 0 {
            // First use on this thread: seed from the slot's own address,
            // which differs per thread. Avoid zero (xorshift fixed point).
            let seed = (std::ptr::from_ref(state) as usize as u64)
                .wrapping_mul(0x9E37_79B9_7F4A_7C15);
            x = if seed == 0 { 0xDEAD_BEEF_CAFE_BABE } else { seed };
        }
        // xorshift64
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        state.set(x);
        x
    })
}

/// Spins for a random duration in `[0, max_us)` microseconds.
///
/// Must not take any lock in this crate (it is called from the lock
/// acquire/release paths).
#[inline]
pub(crate) fn delay() {
    let max_us = MAX_US.load(Ordering::Relaxed);
    if max_us == 0 {
        return;
    }

    let target_ns = next_random() % (u64::from(max_us) * 1000);
    if target_ns == 0 {
        return;
    }

    let start = Instant::now();
    while (start.elapsed().as_nanos() as u64) < target_ns {
        hint::spin_loop();
    }
}
