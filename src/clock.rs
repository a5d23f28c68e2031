//! Global version clock.

use core::sync::atomic::{AtomicUsize, Ordering};

/// Monotonically increasing version counter shared by every transaction in a
/// region. Begin snapshots it; commit advances it.
pub(crate) struct GlobalClock {
    now: AtomicUsize,
}

impl GlobalClock {
    pub(crate) const fn new() -> Self {
        Self {
            now: AtomicUsize::new(0),
        }
    }

    /// Current version. Taken as a transaction's read version at begin.
    #[inline]
    pub(crate) fn read(&self) -> usize {
        self.now.load(Ordering::Acquire)
    }

    /// Advance the clock and return the fresh version.
    ///
    /// The fetch-add is the single linearization point ordering concurrent
    /// commits.
    #[inline]
    pub(crate) fn tick(&self) -> usize {
        self.now.fetch_add(1, Ordering::AcqRel) + 1
    }
}
