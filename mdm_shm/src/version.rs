//! Atomic sequence counter for optimistic concurrency control

use std::sync::atomic::{AtomicU64, Ordering};

/// Sequence counter using even/odd optimistic versioning
///
/// Writers move the counter to an odd value before touching the payload and
/// to the next even value once done. Readers sample it before and after a
/// copy and keep the copy only if both samples are equal and even.
///
/// Lives inside the shared segment header, hence `repr(transparent)`.
#[derive(Debug)]
#[repr(transparent)]
pub struct VersionCounter {
    counter: AtomicU64,
}

impl VersionCounter {
    /// Create a new version counter starting at 0 (even)
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Get current version with acquire ordering
    pub fn load(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    /// Begin write operation - increment to odd version
    pub fn begin_write(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Complete write operation - increment to even version
    pub fn end_write(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Check if version is stable (even)
    pub fn is_stable(version: u64) -> bool {
        version % 2 == 0
    }

    /// Check if version indicates write in progress (odd)
    pub fn is_writing(version: u64) -> bool {
        version % 2 == 1
    }
}

impl Default for VersionCounter {
    fn default() -> Self {
        Self::new()
    }
}
