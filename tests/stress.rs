//! Multithreaded stress tests: serializability under contention.

use std::sync::Arc;
use std::thread;

use rand::Rng;
use wstm::{Mode, Region, TmError, Transaction};

fn read_word(tx: &mut Transaction<'_>, addr: *const u8) -> Result<u64, TmError> {
    let mut out = 0u64;
    unsafe { tx.read(addr, 8, &mut out as *mut u64 as *mut u8)? };
    Ok(out)
}

fn write_word(tx: &mut Transaction<'_>, addr: *mut u8, value: u64) -> Result<(), TmError> {
    unsafe { tx.write(&value as *const u64 as *const u8, 8, addr) }
}

#[test]
#[cfg_attr(miri, ignore)]
fn concurrent_counter() {
    let region = Arc::new(Region::new(8, 8).unwrap());
    let threads = 8;
    let increments = 200u64;

    let mut handles = vec![];
    for _ in 0..threads {
        let region = region.clone();
        handles.push(thread::spawn(move || {
            let addr = region.start();
            for _ in 0..increments {
                region
                    .transact(Mode::ReadWrite, |tx| {
                        let value = read_word(tx, addr)?;
                        write_word(tx, addr, value + 1)
                    })
                    .unwrap();
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    let total = region
        .transact(Mode::ReadOnly, |tx| read_word(tx, region.start()))
        .unwrap();
    assert_eq!(total, threads * increments);
}

#[test]
#[cfg_attr(miri, ignore)]
fn bank_transfers_conserve_money() {
    const ACCOUNTS: usize = 8;
    const INITIAL_BALANCE: u64 = 1000;
    const TRANSFERS: usize = 300;
    const THREADS: usize = 4;

    let region = Arc::new(Region::new(ACCOUNTS * 8, 8).unwrap());
    let account = |region: &Region, i: usize| unsafe { region.start().add(i * 8) };

    region
        .transact(Mode::ReadWrite, |tx| {
            for i in 0..ACCOUNTS {
                write_word(tx, account(&region, i), INITIAL_BALANCE)?;
            }
            Ok(())
        })
        .unwrap();

    let mut handles = vec![];
    for _ in 0..THREADS {
        let region = region.clone();
        handles.push(thread::spawn(move || {
            let mut rng = rand::rng();
            for _ in 0..TRANSFERS {
                let from = rng.random_range(0..ACCOUNTS);
                let to = rng.random_range(0..ACCOUNTS);
                if from == to {
                    continue;
                }
                region
                    .transact(Mode::ReadWrite, |tx| {
                        let balance_from = read_word(tx, account(&region, from))?;
                        let balance_to = read_word(tx, account(&region, to))?;
                        if balance_from >= 10 {
                            write_word(tx, account(&region, from), balance_from - 10)?;
                            write_word(tx, account(&region, to), balance_to + 10)?;
                        }
                        Ok(())
                    })
                    .unwrap();
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    let total = region
        .transact(Mode::ReadOnly, |tx| {
            let mut sum = 0;
            for i in 0..ACCOUNTS {
                sum += read_word(tx, account(&region, i))?;
            }
            Ok(sum)
        })
        .unwrap();
    assert_eq!(
        total,
        ACCOUNTS as u64 * INITIAL_BALANCE,
        "money not conserved"
    );
}

#[test]
#[cfg_attr(miri, ignore)]
fn readers_never_observe_a_torn_pair() {
    const ROUNDS: u64 = 2000;

    let region = Arc::new(Region::new(16, 8).unwrap());

    // One writer commits identical values into both words; every reader
    // snapshot must see the pair whole or abort, never half-updated.
    let writer = {
        let region = region.clone();
        thread::spawn(move || {
            for i in 1..=ROUNDS {
                let addr = region.start();
                region
                    .transact(Mode::ReadWrite, |tx| {
                        write_word(tx, addr, i)?;
                        write_word(tx, unsafe { addr.add(8) }, i)
                    })
                    .unwrap();
            }
        })
    };

    let mut readers = vec![];
    for _ in 0..4 {
        let region = region.clone();
        readers.push(thread::spawn(move || {
            let mut observed = 0;
            while observed < ROUNDS {
                let mut tx = region.begin(Mode::ReadOnly);
                let mut pair = [0u64; 2];
                let ok = unsafe { tx.read(region.start(), 16, pair.as_mut_ptr() as *mut u8) };
                // Conflicted readers just retry with a fresh snapshot.
                if ok.is_ok() {
                    assert!(tx.commit());
                    assert_eq!(pair[0], pair[1], "torn snapshot observed");
                    observed = observed.max(pair[0]);
                }
            }
        }));
    }

    writer.join().unwrap();
    for h in readers {
        h.join().unwrap();
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn mixed_readers_and_writers_keep_the_invariant() {
    const ROUNDS: usize = 500;

    // Writers move value between two words, preserving their sum; read-only
    // transactions check the invariant the whole time.
    let region = Arc::new(Region::new(16, 8).unwrap());
    let total = 1000u64;

    region
        .transact(Mode::ReadWrite, |tx| {
            write_word(tx, region.start(), total)?;
            write_word(tx, unsafe { region.start().add(8) }, 0)
        })
        .unwrap();

    let mut handles = vec![];
    for _ in 0..2 {
        let region = region.clone();
        handles.push(thread::spawn(move || {
            let mut rng = rand::rng();
            for _ in 0..ROUNDS {
                let delta = rng.random_range(1..=5u64);
                region
                    .transact(Mode::ReadWrite, |tx| {
                        let a = read_word(tx, region.start())?;
                        let b = read_word(tx, unsafe { region.start().add(8) })?;
                        if a >= delta {
                            write_word(tx, region.start(), a - delta)?;
                            write_word(tx, unsafe { region.start().add(8) }, b + delta)
                        } else {
                            write_word(tx, region.start(), a + b)?;
                            write_word(tx, unsafe { region.start().add(8) }, 0)
                        }
                    })
                    .unwrap();
            }
        }));
    }
    for _ in 0..2 {
        let region = region.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..ROUNDS {
                let sum = region
                    .transact(Mode::ReadOnly, |tx| {
                        let a = read_word(tx, region.start())?;
                        let b = read_word(tx, unsafe { region.start().add(8) })?;
                        Ok(a + b)
                    })
                    .unwrap();
                assert_eq!(sum, total, "transfer invariant broken");
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }
}
