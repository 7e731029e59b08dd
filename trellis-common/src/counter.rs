//! Atomic counters
use std::{
    num::NonZeroU64,
    sync::atomic::{AtomicU64, Ordering},
};

// Adapted from druid: see license info
/// An incrementing counter for generating unique ids.
///
/// This can be used safely from multiple threads.
///
/// The counter will overflow if `next()` is called 2^64 - 2 times.
pub struct Counter(AtomicU64);

impl Counter {
    /// Create a new counter.
    pub const fn new() -> Counter {
        Counter(AtomicU64::new(1))
    }

    /// Return the next value.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// Return the next value, as a `NonZeroU64`.
    pub fn next_nonzero(&self) -> NonZeroU64 {
        // the counter starts at 1 and only ever increments
        NonZeroU64::new(self.next()).unwrap_or(NonZeroU64::MIN)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Counter::new()
    }
}
