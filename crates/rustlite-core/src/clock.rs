//! The monotonic logical clock shared by the Transaction Manager and the
//! Snapshot Manager (`current_ts` in the design notes).
//!
//! Deliberately independent of wall-clock time: commit timestamps and
//! snapshot timestamps are drawn from the same atomic counter so they can
//! be compared directly.

use std::sync::atomic::{AtomicU64, Ordering};

/// A single process-wide monotonic counter.
#[derive(Debug, Default)]
pub struct LogicalClock {
    value: AtomicU64,
}

impl LogicalClock {
    /// Construct a clock starting at zero.
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Current value without advancing it.
    pub fn current(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }

    /// Atomically advance and return the new value.
    pub fn advance(&self) -> u64 {
        self.value.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Force the clock to a specific value. Used during recovery to
    /// restore the clock from the highest timestamp seen in the WAL/cache.
    pub fn set(&self, ts: u64) {
        self.value.store(ts, Ordering::SeqCst);
    }
}
