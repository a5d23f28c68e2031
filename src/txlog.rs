//! Per-transaction read and write logs.
//!
//! Both logs are owned by exactly one thread and die with the transaction.
//! The write set doubles as the lock-acquisition schedule: commit takes
//! locks in insertion order, so iteration order here must be insertion
//! order and must be stable.

use foldhash::fast::FixedState;
use std::collections::HashMap;

/// Addresses a read-write transaction has observed, in read order. Rereads
/// append again; validation is idempotent, so duplicates only cost a load.
pub(crate) struct ReadSet {
    addrs: Vec<usize>,
}

impl ReadSet {
    pub(crate) fn new() -> Self {
        Self { addrs: Vec::new() }
    }

    #[inline]
    pub(crate) fn push(&mut self, addr: usize) {
        self.addrs.push(addr);
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.addrs.iter().copied()
    }
}

/// Pending stores: one buffered word per shared address.
///
/// Entries keep insertion order in `addrs`; buffered bytes live in a single
/// arena, one word-sized slot per entry; `index` gives by-address lookup so
/// reads can be served from the transaction's own writes. Writing the same
/// address twice overwrites the slot in place, so an address never appears
/// twice in the schedule.
pub(crate) struct WriteSet {
    word: usize,
    addrs: Vec<usize>,
    index: HashMap<usize, usize, FixedState>,
    arena: Vec<u8>,
}

impl WriteSet {
    pub(crate) fn new(word: usize) -> Self {
        Self {
            word,
            addrs: Vec::new(),
            index: HashMap::with_hasher(FixedState::default()),
            arena: Vec::new(),
        }
    }

    /// Buffer `bytes` as the pending store for `addr`.
    pub(crate) fn record(&mut self, addr: usize, bytes: &[u8]) {
        debug_assert_eq!(bytes.len(), self.word);
        match self.index.get(&addr) {
            Some(&slot) => {
                self.arena[slot * self.word..(slot + 1) * self.word].copy_from_slice(bytes);
            }
            None => {
                self.index.insert(addr, self.addrs.len());
                self.addrs.push(addr);
                self.arena.extend_from_slice(bytes);
            }
        }
    }

    /// Buffered bytes for `addr`, if this transaction intends to write it.
    #[inline]
    pub(crate) fn lookup(&self, addr: usize) -> Option<&[u8]> {
        self.index
            .get(&addr)
            .map(|&slot| &self.arena[slot * self.word..(slot + 1) * self.word])
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    /// Addresses in insertion order: the lock-acquisition schedule.
    pub(crate) fn addrs(&self) -> impl Iterator<Item = usize> + '_ {
        self.addrs.iter().copied()
    }

    /// `(address, buffered bytes)` pairs in insertion order.
    pub(crate) fn entries(&self) -> impl Iterator<Item = (usize, &[u8])> + '_ {
        self.addrs
            .iter()
            .enumerate()
            .map(|(slot, &addr)| (addr, &self.arena[slot * self.word..(slot + 1) * self.word]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_write_overwrites_in_place() {
        let mut set = WriteSet::new(8);
        set.record(0x100, &[1u8; 8]);
        set.record(0x200, &[2u8; 8]);
        set.record(0x100, &[9u8; 8]);

        assert_eq!(set.lookup(0x100), Some(&[9u8; 8][..]));
        assert_eq!(set.lookup(0x200), Some(&[2u8; 8][..]));
        assert_eq!(set.lookup(0x300), None);

        // One entry per address, original order kept.
        assert_eq!(set.addrs().collect::<Vec<_>>(), vec![0x100, 0x200]);
    }

    #[test]
    fn entries_follow_insertion_order() {
        let mut set = WriteSet::new(8);
        for (i, addr) in [0x38, 0x08, 0x20].into_iter().enumerate() {
            set.record(addr, &[i as u8; 8]);
        }
        let order: Vec<usize> = set.entries().map(|(addr, _)| addr).collect();
        assert_eq!(order, vec![0x38, 0x08, 0x20]);
    }

    #[test]
    fn read_set_appends() {
        let mut set = ReadSet::new();
        set.push(8);
        set.push(16);
        set.push(8);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![8, 16, 8]);
    }
}
