//! Word-granular software transactional memory.
//!
//! # Architecture
//!
//! This crate implements a TL2-style (Transactional Locking II) engine over
//! a contiguous, word-aligned shared memory region.
//!
//! - **Reads**: optimistic. No locks are taken; every word copy is bracketed
//!   by two observations of its versioned lock and aborts if the word moved.
//! - **Writes**: buffered locally in the write set and invisible to other
//!   threads until commit.
//! - **Commit**: acquires the write set's locks with single-shot CAS,
//!   stamps a fresh version off the global clock, validates the read set
//!   against it, writes back, and publishes version and lock release in one
//!   store per slot.
//!
//! Every committed transaction is observably equivalent to some serial
//! execution ordered by the global clock, and even doomed transactions only
//! ever see consistent snapshots.
//!
//! # Example
//!
//! ```
//! use wstm::{Mode, Region};
//!
//! let region = Region::new(16, 8).unwrap();
//! let addr = region.start();
//!
//! // Publish a value.
//! region
//!     .transact(Mode::ReadWrite, |tx| {
//!         let value = 42u64;
//!         unsafe { tx.write(&value as *const u64 as *const u8, 8, addr)? };
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! // Read it back without taking any lock.
//! let seen = region
//!     .transact(Mode::ReadOnly, |tx| {
//!         let mut value = 0u64;
//!         unsafe { tx.read(addr, 8, &mut value as *mut u64 as *mut u8)? };
//!         Ok(value)
//!     })
//!     .unwrap();
//! assert_eq!(seen, 42);
//! ```

#![warn(missing_docs)]

mod clock;
mod errors;
mod lock_table;
mod region;
mod transaction;
mod txlog;
mod vlock;

pub use errors::TmError;
pub use region::Region;
pub use transaction::{Mode, Transaction};

/// Number of versioned locks in a region's lock table.
///
/// 2^20 slots at one machine word each is an 8 MiB table on 64-bit targets,
/// small enough to sit comfortably in memory yet wide enough that two live
/// transactions rarely collide on a slot by accident. Must be a power of
/// two: addresses map to slots by masking.
pub const LOCK_ARRAY_SIZE: usize = 1 << 20;

/// Cap on transactions simultaneously inside the commit phase.
///
/// Commit never blocks, so the only pile-up risk is lock-acquisition churn
/// when too many writers arrive at once; past this many concurrent
/// committers, further commits abort on admission and retry from scratch.
pub const MAX_SIMUL_TXS: usize = 64;
