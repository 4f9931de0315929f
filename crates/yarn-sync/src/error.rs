//! Error type for the timed acquire operations.

use std::time::Duration;

use thiserror::Error;

/// A timed acquire gave up after its full budget elapsed.
///
/// Raised only by [`Lock::lock_timeout`](crate::Lock::lock_timeout) and
/// [`Semaphore::take_timeout`](crate::Semaphore::take_timeout), and always
/// surfaced to the immediate caller; the primitives never retry a timed
/// operation on their own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} timed out after {timeout:?}")]
pub struct TimeoutExpired {
    operation: &'static str,
    timeout: Duration,
}

impl TimeoutExpired {
    pub(crate) fn new(operation: &'static str, timeout: Duration) -> Self {
        Self { operation, timeout }
    }

    /// The operation that timed out.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// The budget the operation was given.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
