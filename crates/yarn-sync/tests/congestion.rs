//! Many threads hammering many independent locks.
//!
//! Each thread walks every lock once per loop iteration and bumps the
//! lock's counter, so every per-lock counter must end at exactly
//! `threads * loops`; any lost update means mutual exclusion broke.

use std::cell::UnsafeCell;
use std::sync::Arc;
use std::thread;

use yarn_sync::Lock;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

struct Counter {
    lock: Lock,
    value: UnsafeCell<u64>,
}

// SAFETY: `value` is only touched while `lock` is held.
unsafe impl Sync for Counter {}

impl Counter {
    fn new() -> Self {
        Self {
            lock: Lock::new(),
            value: UnsafeCell::new(0),
        }
    }
}

fn run_congestion(threads: usize, locks: usize, loops: usize) {
    let counters: Arc<Vec<Counter>> = Arc::new((0..locks).map(|_| Counter::new()).collect());

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let counters = Arc::clone(&counters);
            thread::spawn(move || {
                for _ in 0..loops {
                    for counter in counters.iter() {
                        counter.lock.lock();
                        // SAFETY: exclusive by mutual exclusion.
                        unsafe {
                            *counter.value.get() += 1;
                        }
                        counter.lock.unlock();
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let expected = (threads * loops) as u64;
    for (i, counter) in counters.iter().enumerate() {
        // SAFETY: all writers joined.
        let value = unsafe { *counter.value.get() };
        assert_eq!(value, expected, "lock {i} lost updates");
    }
}

#[test]
fn congestion_scaled() {
    init_tracing();
    run_congestion(16, 8, 256);
}

#[test]
#[ignore = "full-scale run; takes minutes under contention"]
fn congestion_full() {
    init_tracing();
    run_congestion(128, 32, 1024);
}
