//! Transactions and the TL2 commit protocol.
//!
//! A transaction is owned by the thread that began it and borrows its
//! region. Reads are optimistic: no lock is ever taken outside the commit
//! phase. Writes are buffered in the write set and reach shared memory only
//! inside commit, between lock acquisition and `set_and_release`.
//!
//! The correctness of the engine rests on the ordering between five events:
//! clock read at begin, lock acquisition, the clock tick that stamps the
//! write version, read-set validation against that stamp, and the release
//! stores that publish the new version.

use core::slice;
use core::sync::atomic::{fence, AtomicUsize, Ordering};

use crate::errors::TmError;
use crate::region::Region;
use crate::txlog::{ReadSet, WriteSet};
use crate::vlock;
use crate::MAX_SIMUL_TXS;

/// Whether a transaction may write.
///
/// Read-only transactions keep no logs at all: every read is validated in
/// place by its bracketing lock observations and commit is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Reads only; writes are a contract violation.
    ReadOnly,
    /// May read and write.
    ReadWrite,
}

/// An in-flight transaction on a [`Region`].
///
/// Exactly one thread drives a given transaction; the `&mut` receivers
/// enforce that. A transaction that has returned [`TmError::Conflict`] from
/// any operation is dead and must be dropped, having already released
/// everything it held.
pub struct Transaction<'a> {
    region: &'a Region,
    mode: Mode,
    /// Global clock at begin. Reads newer than this are invisible.
    rv: usize,
    /// Version this commit will publish. Stamped inside `commit`.
    wv: usize,
    reads: ReadSet,
    writes: WriteSet,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(region: &'a Region, mode: Mode) -> Self {
        Self {
            region,
            mode,
            rv: region.clock.read(),
            wv: 0,
            reads: ReadSet::new(),
            writes: WriteSet::new(region.align()),
        }
    }

    /// Transactionally copy `len` bytes from shared address `src` into the
    /// private buffer `dst`.
    ///
    /// `len` must be a positive multiple of the region's word size and both
    /// pointers word-aligned. On `Err` the transaction has aborted and must
    /// be dropped; `dst` may hold torn data.
    ///
    /// # Safety
    ///
    /// `src..src + len` must lie in memory owned by this transaction's
    /// region (the first segment or a live dynamic segment), and `dst` must
    /// be valid for `len` bytes of writes.
    pub unsafe fn read(&mut self, src: *const u8, len: usize, dst: *mut u8) -> Result<(), TmError> {
        let word = self.region.align();
        debug_assert!(len > 0 && len % word == 0);
        debug_assert!(src as usize % word == 0 && dst as usize % word == 0);

        match self.mode {
            Mode::ReadOnly => {
                let mut off = 0;
                while off < len {
                    self.speculative_word(src as usize + off, dst.add(off))?;
                    off += word;
                }
            }
            Mode::ReadWrite => {
                let mut off = 0;
                while off < len {
                    let addr = src as usize + off;
                    // Serve the transaction's own pending store if there is
                    // one; otherwise read shared memory and log the address.
                    if let Some(bytes) = self.writes.lookup(addr) {
                        core::ptr::copy_nonoverlapping(bytes.as_ptr(), dst.add(off), word);
                    } else {
                        self.speculative_word(addr, dst.add(off))?;
                        self.reads.push(addr);
                    }
                    off += word;
                }
            }
        }
        Ok(())
    }

    /// Transactionally copy `len` bytes from the private buffer `src` to
    /// shared address `dst`.
    ///
    /// Purely local: the bytes are buffered in the write set and reach
    /// shared memory only if `commit` succeeds. A second write to the same
    /// word replaces the buffered bytes.
    ///
    /// # Safety
    ///
    /// `dst..dst + len` must lie in memory owned by this transaction's
    /// region, and `src` must be valid for `len` bytes of reads. Alignment
    /// and length contracts are as for [`read`](Self::read).
    pub unsafe fn write(
        &mut self,
        src: *const u8,
        len: usize,
        dst: *mut u8,
    ) -> Result<(), TmError> {
        let word = self.region.align();
        debug_assert!(len > 0 && len % word == 0);
        debug_assert!(src as usize % word == 0 && dst as usize % word == 0);
        debug_assert!(matches!(self.mode, Mode::ReadWrite));

        let mut off = 0;
        while off < len {
            let bytes = slice::from_raw_parts(src.add(off), word);
            self.writes.record(dst as usize + off, bytes);
            off += word;
        }
        Ok(())
    }

    /// Allocate a zeroed dynamic segment of `size` bytes.
    ///
    /// `size` must be a positive multiple of the region's word size.
    /// [`TmError::Nomem`] is not an abort: the transaction stays usable.
    pub fn alloc(&mut self, size: usize) -> Result<*mut u8, TmError> {
        self.region.alloc_segment(size)
    }

    /// Free a dynamic segment. Deferred: segments live until the region is
    /// dropped, so this always succeeds.
    pub fn free(&mut self, _addr: *mut u8) -> bool {
        true
    }

    /// Attempt to commit. Returns `true` iff the transaction serialized;
    /// either way the transaction is consumed.
    pub fn commit(mut self) -> bool {
        // Read-only transactions validated every read in place, and a
        // read-write transaction that wrote nothing cannot invalidate
        // anyone: both serialize at their read version as-is.
        if matches!(self.mode, Mode::ReadOnly) || self.writes.is_empty() {
            return true;
        }

        let region = self.region;

        // 1. Admission: refuse to enter an overcrowded commit phase. The
        //    check precedes the increment, so this abort owes no decrement.
        if region.committers.load(Ordering::Relaxed) > MAX_SIMUL_TXS {
            return false;
        }
        region.committers.fetch_add(1, Ordering::Relaxed);

        // 2. Acquire every write-set lock, in insertion order. One failed
        //    CAS aborts; only the acquired prefix is released.
        for (held, addr) in self.writes.addrs().enumerate() {
            if !region.lock_for(addr).try_acquire() {
                for prev in self.writes.addrs().take(held) {
                    region.lock_for(prev).release();
                }
                region.committers.fetch_sub(1, Ordering::Relaxed);
                return false;
            }
        }

        // 3. Stamp the write version. Everything that committed before this
        //    tick is ordered before us; everything after, after.
        self.wv = region.clock.tick();

        // 4. Validate the read set against the stamp. If the clock moved by
        //    exactly one since begin, no other commit interleaved and the
        //    set is provably still valid. A held lock fails validation even
        //    if we hold it ourselves; addresses served from our own write
        //    set never reached the read set, so this only bites when a read
        //    preceded the first write to the same word.
        if self.wv != self.rv + 1 {
            for addr in self.reads.iter() {
                let state = region.lock_for(addr).observe();
                if vlock::version(state) > self.rv || vlock::locked(state) {
                    for prev in self.writes.addrs() {
                        region.lock_for(prev).release();
                    }
                    region.committers.fetch_sub(1, Ordering::Relaxed);
                    return false;
                }
            }
        }

        // 5. Write back and publish. Each slot's release store carries wv,
        //    so the new bytes are globally visible before the lock drops.
        for (addr, bytes) in self.writes.entries() {
            unsafe { copy_private_to_shared(bytes.as_ptr(), addr as *mut u8, bytes.len()) };
            region.lock_for(addr).set_and_release(self.wv);
        }

        region.committers.fetch_sub(1, Ordering::Relaxed);
        true
    }

    /// Speculative copy of one shared word into private memory.
    ///
    /// The copy is bracketed by two observations of the word's lock. Any
    /// change between them, a version newer than `rv`, or a held bit means
    /// the copy cannot be trusted and the transaction aborts.
    unsafe fn speculative_word(&self, addr: usize, dst: *mut u8) -> Result<(), TmError> {
        let lock = self.region.lock_for(addr);

        let pre = lock.observe();
        copy_shared_to_private(addr as *const u8, dst, self.region.align());
        // The copy must complete before the second observation.
        fence(Ordering::Acquire);
        let post = lock.observe();

        if pre != post || vlock::version(post) > self.rv || vlock::locked(post) {
            return Err(TmError::Conflict);
        }
        Ok(())
    }
}

// Shared words are only ever touched through word-sized atomics, so
// concurrent speculative readers and committing writers race on defined
// terms: a stale or mixed word is possible but is always caught by the
// observation pair around the copy.

#[inline]
unsafe fn copy_shared_to_private(src: *const u8, dst: *mut u8, len: usize) {
    let words = len / core::mem::size_of::<usize>();
    let src = src as *const AtomicUsize;
    let dst = dst as *mut usize;
    for i in 0..words {
        dst.add(i).write((*src.add(i)).load(Ordering::Relaxed));
    }
}

#[inline]
unsafe fn copy_private_to_shared(src: *const u8, dst: *mut u8, len: usize) {
    let words = len / core::mem::size_of::<usize>();
    let src = src as *const usize;
    let dst = dst as *const AtomicUsize;
    for i in 0..words {
        (*dst.add(i)).store(src.add(i).read(), Ordering::Relaxed);
    }
}
