//! Session run identifiers.
//!
//! Every accepted connection gets the next value from a shared counter.  The
//! id is attached to the session's tracing span so the log lines of one
//! request can be picked out of interleaved output.

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe, monotonically increasing id source.
///
/// # Examples
///
/// ```rust
/// use audioserver_core::domain::run_id::RunIdCounter;
///
/// let ids = RunIdCounter::new();
/// assert_eq!(ids.next(), 1);
/// assert_eq!(ids.next(), 2);
/// ```
#[derive(Debug)]
pub struct RunIdCounter {
    inner: AtomicU64,
}

impl RunIdCounter {
    /// Creates a counter whose first id is 1.
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(1),
        }
    }

    /// Returns the next id.  Wraps to 0 after `u64::MAX`.
    pub fn next(&self) -> u64 {
        // Ids only label log lines; no memory is published through them.
        self.inner.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for RunIdCounter {
    fn default() -> Self {
        Self::new()
    }
}
