//! Shared memory region: the engine value owning all global state.

use std::alloc::{self, Layout};
use std::mem;
use std::ptr::NonNull;
use std::sync::atomic::AtomicUsize;
use std::sync::{Mutex, PoisonError};

use crossbeam_utils::Backoff;

use crate::clock::GlobalClock;
use crate::errors::TmError;
use crate::lock_table::LockTable;
use crate::transaction::{Mode, Transaction};
use crate::vlock::VersionedLock;

/// A dynamically allocated segment, freed when the region is dropped.
struct Segment {
    ptr: NonNull<u8>,
    layout: Layout,
}

/// A word-aligned shared memory region with transactional access.
///
/// The region exclusively owns the shared buffer, the lock table, the global
/// version clock and the dynamic segment list. All process-wide state is
/// per-region: two regions never interact.
///
/// Transactions borrow the region, so the borrow checker enforces the
/// teardown precondition that no transaction is in flight at drop.
pub struct Region {
    start: NonNull<u8>,
    layout: Layout,
    size: usize,
    align: usize,
    pub(crate) locks: LockTable,
    pub(crate) clock: GlobalClock,
    /// Transactions currently inside the commit phase.
    pub(crate) committers: AtomicUsize,
    segments: Mutex<Vec<Segment>>,
}

// The raw buffer pointer is only reached through the transactional protocol,
// which is safe to drive from many threads at once.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Allocate a zero-filled region of `size` bytes addressed in
    /// `align`-sized words.
    ///
    /// `align` must be a power of two no smaller than a machine word, and
    /// `size` a positive multiple of it; violations are caller bugs and
    /// panic. Allocation failure surfaces as [`TmError::Nomem`].
    pub fn new(size: usize, align: usize) -> Result<Self, TmError> {
        assert!(
            align.is_power_of_two() && align >= mem::size_of::<usize>(),
            "alignment must be a power of two of at least one word"
        );
        assert!(
            size > 0 && size % align == 0,
            "size must be a positive multiple of the alignment"
        );

        let layout = Layout::from_size_align(size, align).map_err(|_| TmError::Nomem)?;
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let start = NonNull::new(ptr).ok_or(TmError::Nomem)?;

        Ok(Self {
            start,
            layout,
            size,
            align,
            locks: LockTable::new(),
            clock: GlobalClock::new(),
            committers: AtomicUsize::new(0),
            segments: Mutex::new(Vec::new()),
        })
    }

    /// Start address of the first shared segment.
    #[inline]
    pub fn start(&self) -> *mut u8 {
        self.start.as_ptr()
    }

    /// Size of the first shared segment in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Word size of every transactional access on this region.
    #[inline]
    pub fn align(&self) -> usize {
        self.align
    }

    /// Begin a transaction, snapshotting the global clock as its read
    /// version.
    pub fn begin(&self, mode: Mode) -> Transaction<'_> {
        Transaction::new(self, mode)
    }

    /// Run `f` against fresh transactions until one commits.
    ///
    /// Conflicts abort the attempt and retry behind an exponential backoff;
    /// any other error is returned as-is. The core protocol never blocks or
    /// yields on its own, so this is where contended callers should live.
    ///
    /// # Example
    ///
    /// ```
    /// use wstm::{Mode, Region};
    ///
    /// let region = Region::new(8, 8).unwrap();
    /// let addr = region.start();
    ///
    /// region
    ///     .transact(Mode::ReadWrite, |tx| {
    ///         let mut word = 0u64;
    ///         unsafe { tx.read(addr, 8, &mut word as *mut u64 as *mut u8)? };
    ///         word += 1;
    ///         unsafe { tx.write(&word as *const u64 as *const u8, 8, addr)? };
    ///         Ok(())
    ///     })
    ///     .unwrap();
    /// ```
    pub fn transact<T, F>(&self, mode: Mode, mut f: F) -> Result<T, TmError>
    where
        F: FnMut(&mut Transaction<'_>) -> Result<T, TmError>,
    {
        let backoff = Backoff::new();
        loop {
            let mut tx = self.begin(mode);
            match f(&mut tx) {
                Ok(out) => {
                    if tx.commit() {
                        return Ok(out);
                    }
                }
                Err(TmError::Conflict) => {}
                Err(err) => return Err(err),
            }
            backoff.snooze();
        }
    }

    /// Lock slot guarding the shared word at `addr`.
    #[inline]
    pub(crate) fn lock_for(&self, addr: usize) -> &VersionedLock {
        self.locks.slot(addr)
    }

    /// Allocate a zeroed dynamic segment and link it into the segment list.
    ///
    /// The list mutex is the only blocking point in the whole API and is
    /// held just long enough to push the new segment.
    pub(crate) fn alloc_segment(&self, size: usize) -> Result<*mut u8, TmError> {
        assert!(
            size > 0 && size % self.align == 0,
            "size must be a positive multiple of the alignment"
        );

        let layout = Layout::from_size_align(size, self.align).map_err(|_| TmError::Nomem)?;
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or(TmError::Nomem)?;

        self.segments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Segment { ptr, layout });

        Ok(ptr.as_ptr())
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        let segments = mem::take(
            &mut *self
                .segments
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for segment in segments {
            unsafe { alloc::dealloc(segment.ptr.as_ptr(), segment.layout) };
        }
        unsafe { alloc::dealloc(self.start.as_ptr(), self.layout) };
    }
}
