//! Versioned spin lock.
//!
//! A single atomic word carrying both a commit version and a lock bit:
//!
//! - Bit 0: lock flag (1 = held).
//! - Bits 1..: version number of the last writer to publish through this lock.
//!
//! While the flag is clear, the version bits are trustworthy. While it is
//! set, readers must treat every word mapped to this lock as in flux.

use core::sync::atomic::{AtomicUsize, Ordering};

/// One versioned lock word.
pub(crate) struct VersionedLock {
    state: AtomicUsize,
}

impl VersionedLock {
    /// Fresh lock: version 0, unlocked.
    pub(crate) const fn new() -> Self {
        Self {
            state: AtomicUsize::new(0),
        }
    }

    /// Attempt to take the lock with a single compare-exchange.
    ///
    /// There is no spin loop: a held flag or a lost race both return `false`
    /// and the caller decides whether that aborts the transaction.
    #[inline]
    pub(crate) fn try_acquire(&self) -> bool {
        let state = self.state.load(Ordering::Acquire);
        if state & 1 == 1 {
            return false;
        }
        self.state
            .compare_exchange(state, state | 1, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Drop the lock, keeping the version bits.
    ///
    /// The caller must hold the flag. Nobody else can clear it, so
    /// subtracting one only flips bit 0.
    #[inline]
    pub(crate) fn release(&self) {
        self.state.fetch_sub(1, Ordering::Release);
    }

    /// Publish `version` and drop the lock in one store.
    ///
    /// The caller must hold the flag; the store overwrites it with 0.
    #[inline]
    pub(crate) fn set_and_release(&self, version: usize) {
        self.state.store(version << 1, Ordering::Release);
    }

    /// Load the whole word: `(version, flag)` in one shot.
    #[inline]
    pub(crate) fn observe(&self) -> usize {
        self.state.load(Ordering::Acquire)
    }
}

/// Is the lock bit of an observed word set?
#[inline]
pub(crate) fn locked(word: usize) -> bool {
    word & 1 == 1
}

/// Version bits of an observed word.
#[inline]
pub(crate) fn version(word: usize) -> usize {
    word >> 1
}
