//! Process-wide id sequences.
//!
//! Connection ids and match ids are handed out from a [`Sequence`]. Ids start
//! at 1 and are strictly increasing across every task that shares the
//! sequence.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic id allocator safe to share between tasks.
#[derive(Debug, Default)]
pub struct Sequence {
    last: AtomicU64,
}

impl Sequence {
    /// Create a sequence whose first id is 1.
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> u64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// The most recently allocated id (0 if none yet).
    pub fn current(&self) -> u64 {
        self.last.load(Ordering::Relaxed)
    }
}
