//! Thread synchronization primitives built directly on the kernel's
//! atomic wait/wake facility (`futex(2)` on Linux) rather than on an
//! existing mutex library.
//!
//! Four primitives, all folding their state into single atomic words:
//!
//! - [`Lock`] — binary mutual exclusion with a spin-then-block acquire
//!   path and a waiter-count hint on release.
//! - [`Semaphore`] — counting primitive, unbounded above.
//! - [`Condition`] — classic wait/notify, paired with a caller's
//!   [`Lock`].
//! - [`Monitor`] — a lock plus an arrival-ordered queue of
//!   predicate-guarded waiters, giving FIFO-fair, race-free conditional
//!   handoff without callers re-checking predicates externally.
//!
//! The timed acquire variants ([`Lock::lock_timeout`],
//! [`Semaphore::take_timeout`]) fail with [`TimeoutExpired`] once their
//! full budget has elapsed, never earlier (possibly somewhat later).
//!
//! Every primitive's state is instance-scoped; the crate holds no
//! process-wide mutable state. None of the primitives is recursive, none
//! tracks ownership, and misuse (double unlock, unlocking an unheld
//! lock) is an unchecked contract violation.

mod condition;
mod error;
mod lock;
mod monitor;
mod raw;
mod semaphore;
mod spin;
#[cfg(yarn_lock_stress)]
pub mod stress;
mod wait;

pub use condition::Condition;
pub use error::TimeoutExpired;
pub use lock::Lock;
pub use monitor::Monitor;
pub use semaphore::Semaphore;
