//! Predicate-based monitor with FIFO-fair lock handoff.
//!
//! A [`Monitor`] is a lock plus an arrival-ordered queue of
//! predicate-guarded waiters. Instead of waking everybody and letting
//! them re-check (the [`Condition`](crate::Condition) model), the thread
//! releasing the lock scans the queue in arrival order, evaluates the
//! queued predicates itself, and hands the lock directly to the first
//! waiter whose predicate holds. The scan and the grant happen under the
//! ownership being transferred, so there is never a window where the
//! lock is free but the satisfied waiter has not been told.
//!
//! Each waiter's record lives on its own stack for exactly the duration
//! of [`wait_for`](Monitor::wait_for) and is unlinked by that same thread
//! before the call returns. The queue itself sits under a private spin
//! lock so that queue memory stays safe even if a caller breaks the
//! hold-the-lock contract; in correct use the spin lock is uncontended.

use std::collections::VecDeque;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::trace;

use crate::raw::RawMutex;
use crate::spin::SpinLock;
use crate::wait;

/// Waiter wake-word states.
const WAITING: u32 = 0;
/// The lock was handed to this waiter; it owns the monitor on waking.
const GRANTED: u32 = 1;
/// Prodded by [`Monitor::notify_all`]; re-enter the acquire/scan
/// competition without owning anything.
const POKED: u32 = 2;

/// One queued waiter. Lives on the waiting thread's stack; other threads
/// reach it only through the queue, and only while holding the queue
/// guard.
struct WaitNode {
    wake: AtomicU32,
    pred_data: *const (),
    pred_call: unsafe fn(*const ()) -> bool,
}

impl WaitNode {
    fn new<P: Fn() -> bool + Send>(predicate: &P) -> Self {
        Self {
            wake: AtomicU32::new(WAITING),
            pred_data: std::ptr::from_ref(predicate).cast::<()>(),
            pred_call: eval_erased::<P>,
        }
    }

    /// Evaluates the owning thread's predicate.
    ///
    /// # Safety
    ///
    /// The node must still be linked in its monitor's queue (which keeps
    /// the owning `wait_for` frame, and thus the predicate, alive), and
    /// the caller must hold the queue guard.
    unsafe fn satisfied(&self) -> bool {
        unsafe { (self.pred_call)(self.pred_data) }
    }
}

unsafe fn eval_erased<P: Fn() -> bool>(data: *const ()) -> bool {
    // SAFETY: `data` came from `WaitNode::new` over a live `&P`.
    unsafe { (*data.cast::<P>())() }
}

/// Queue entry. The pointee is another thread's stack frame; see the
/// safety notes on [`WaitNode`].
struct NodeRef(NonNull<WaitNode>);

// SAFETY: a NodeRef is only dereferenced under the queue guard, and a
// node is unlinked (under that same guard) before its frame dies.
unsafe impl Send for NodeRef {}

/// Outcome of one queue scan.
enum Scan {
    /// The scanner's own predicate was the first satisfied one; its node
    /// was removed and it keeps the lock.
    Mine,
    /// The lock was handed to an earlier satisfied waiter.
    Handoff,
    /// No queued predicate holds.
    Idle,
}

/// A lock with an arrival-ordered queue of predicate waiters.
///
/// Among all queued predicates, the earliest-arrived satisfied one is
/// always served first, and handoff is race-free: ownership moves from
/// the releasing thread to the chosen waiter with no observable unlocked
/// state in between.
///
/// # Contract
///
/// [`wait_for`](Monitor::wait_for), [`unlock`](Monitor::unlock) and
/// [`notify_all`](Monitor::notify_all) require the calling thread to
/// hold the monitor lock. Violations are not detected: ordering and
/// mutual-exclusion guarantees break (memory safety does not).
/// Predicates must not panic and must not touch the monitor they are
/// queued on.
///
/// # Example
///
/// ```ignore
/// // Bounded hand-off of work items:
/// monitor.lock();
/// monitor.wait_for(|| queue_has_space());
/// push_item();
/// monitor.unlock(); // hands the lock to the first satisfied waiter
/// ```
pub struct Monitor {
    raw: RawMutex,
    queue: SpinLock<VecDeque<NodeRef>>,
}

impl Monitor {
    /// Creates a new unlocked monitor with no waiters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            raw: RawMutex::new(),
            queue: SpinLock::new(VecDeque::new()),
        }
    }

    /// Acquires the monitor lock, blocking until it is held.
    pub fn lock(&self) {
        self.raw.acquire();
    }

    /// Attempts to acquire the monitor lock without blocking.
    pub fn try_lock(&self) -> bool {
        self.raw.try_acquire()
    }

    /// Releases the lock, first offering it to the queue.
    ///
    /// Scans the waiters in arrival order; the first whose predicate now
    /// holds receives the lock directly. Only if no predicate holds is
    /// the lock actually freed (waking one plain [`lock`](Monitor::lock)
    /// waiter, if any).
    pub fn unlock(&self) {
        match self.scan(None) {
            Scan::Handoff => {}
            Scan::Idle => self.raw.release(),
            // Scan::Mine requires a queued own node, and `None` was passed.
            Scan::Mine => unreachable!("scan(None) cannot match an own node"),
        }
    }

    /// Releases the lock without evaluating any predicate and without
    /// waking anyone.
    ///
    /// Only correct when the caller knows no waiter (queued or parked on
    /// the lock word) could make progress from this release; queued
    /// waiters will not be re-examined until the next
    /// [`unlock`](Monitor::unlock) scan.
    pub fn silent_unlock(&self) {
        self.raw.release_silent();
    }

    /// Blocks the calling thread until `predicate` returns true and the
    /// thread holds the monitor lock.
    ///
    /// The caller must already hold the lock. If, scanning in arrival
    /// order, the caller's own predicate is the first satisfied one, the
    /// call returns immediately and the lock is simply kept: no wake,
    /// no park. Otherwise the lock is handed to the first satisfied
    /// waiter (or freed, if there is none) and the caller parks until a
    /// later scan finds its predicate true and grants it the lock.
    ///
    /// On return the caller holds the lock and its predicate was true at
    /// the moment of the granting scan.
    pub fn wait_for<P: Fn() -> bool + Send>(&self, predicate: P) {
        let node = WaitNode::new(&predicate);
        let me = NonNull::from(&node);
        self.queue.lock().push_back(NodeRef(me));

        'scan: loop {
            // Invariant: the monitor lock is held entering a scan round.
            match self.scan(Some(me)) {
                Scan::Mine => return, // node unlinked, lock kept
                Scan::Handoff => {}   // ownership moved to an earlier waiter
                Scan::Idle => self.raw.release(),
            }

            // The lock is no longer ours; park on the wake word.
            loop {
                let _ = wait::block(&node.wake, WAITING, None);
                match node.wake.load(Ordering::Acquire) {
                    GRANTED => {
                        // A scanning thread transferred the lock to us.
                        self.unlink(me);
                        return;
                    }
                    POKED => {
                        // Consume the prod. A concurrent grant overwrites
                        // POKED with GRANTED and wins; re-check after.
                        let _ = node.wake.compare_exchange(
                            POKED,
                            WAITING,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        );
                        if node.wake.load(Ordering::Acquire) == GRANTED {
                            self.unlink(me);
                            return;
                        }
                        if self.raw.try_acquire() {
                            continue 'scan;
                        }
                        // Lock is busy: the holder's own unlock scan will
                        // evaluate our predicate. Park again.
                    }
                    _ => {} // spurious wake; park again
                }
            }
        }
    }

    /// Wakes every queued waiter so it re-enters the acquire/scan
    /// competition.
    ///
    /// The caller must hold the lock. No predicate is evaluated and the
    /// lock is neither released nor transferred; a prodded waiter that
    /// cannot take the lock immediately parks again and is re-examined
    /// by the next [`unlock`](Monitor::unlock) scan. Useful when
    /// predicate inputs changed outside the monitor's critical sections.
    pub fn notify_all(&self) {
        let queue = self.queue.lock();
        for entry in queue.iter() {
            // SAFETY: entries are live while the queue guard is held.
            let waiter = unsafe { entry.0.as_ref() };
            if waiter
                .wake
                .compare_exchange(WAITING, POKED, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                wait::wake(&waiter.wake, 1);
            }
        }
    }

    /// Scans the queue in arrival order for the first satisfied
    /// predicate and resolves it: the scanner's own node is unlinked
    /// (`Mine`), any other node receives the lock (`Handoff`).
    ///
    /// Must be called with the monitor lock held. The grant's store and
    /// wake both happen under the queue guard: the grantee cannot unlink
    /// its node (and pop its frame) until the guard is released, which
    /// keeps the wake-word reference alive.
    fn scan(&self, own: Option<NonNull<WaitNode>>) -> Scan {
        let mut queue = self.queue.lock();
        // SAFETY: entries are live while the queue guard is held; the
        // monitor lock serializes predicate evaluation.
        let found = queue
            .iter()
            .position(|entry| unsafe { entry.0.as_ref().satisfied() });
        let Some(index) = found else {
            return Scan::Idle;
        };

        let target = queue[index].0;
        if Some(target) == own {
            queue.remove(index);
            return Scan::Mine;
        }

        // SAFETY: `target` is queued and the guard is held.
        let waiter = unsafe { target.as_ref() };
        trace!(grantee = ?target.as_ptr(), "monitor lock handoff");
        waiter.wake.store(GRANTED, Ordering::Release);
        wait::wake(&waiter.wake, 1);
        Scan::Handoff
    }

    /// Removes `me` from the queue. Called only by the owning thread,
    /// holding the monitor lock.
    fn unlink(&self, me: NonNull<WaitNode>) {
        let mut queue = self.queue.lock();
        if let Some(index) = queue.iter().position(|entry| entry.0 == me) {
            queue.remove(index);
        }
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}
