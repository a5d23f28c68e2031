//! Concurrent account transfers over a shared region.
//!
//! Run with `cargo run --example transfer`.

use std::sync::Arc;
use std::thread;
use wstm::{Mode, Region, TmError, Transaction};

const ACCOUNTS: usize = 4;
const INITIAL_BALANCE: u64 = 1000;
const TRANSFERS: usize = 2000;
const THREADS: usize = 4;

fn read_word(tx: &mut Transaction<'_>, addr: *const u8) -> Result<u64, TmError> {
    let mut out = 0u64;
    unsafe { tx.read(addr, 8, &mut out as *mut u64 as *mut u8)? };
    Ok(out)
}

fn write_word(tx: &mut Transaction<'_>, addr: *mut u8, value: u64) -> Result<(), TmError> {
    unsafe { tx.write(&value as *const u64 as *const u8, 8, addr) }
}

fn main() {
    let region = Arc::new(Region::new(ACCOUNTS * 8, 8).expect("region allocation"));
    let account = |region: &Region, i: usize| unsafe { region.start().add(i * 8) };

    region
        .transact(Mode::ReadWrite, |tx| {
            for i in 0..ACCOUNTS {
                write_word(tx, account(&region, i), INITIAL_BALANCE)?;
            }
            Ok(())
        })
        .expect("initial funding");

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let region = region.clone();
            thread::spawn(move || {
                for i in 0..TRANSFERS {
                    let from = (t + i) % ACCOUNTS;
                    let to = (t + i + 1) % ACCOUNTS;
                    region
                        .transact(Mode::ReadWrite, |tx| {
                            let balance_from = read_word(tx, account(&region, from))?;
                            let balance_to = read_word(tx, account(&region, to))?;
                            if balance_from > 0 {
                                write_word(tx, account(&region, from), balance_from - 1)?;
                                write_word(tx, account(&region, to), balance_to + 1)?;
                            }
                            Ok(())
                        })
                        .expect("transfer");
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let balances = region
        .transact(Mode::ReadOnly, |tx| {
            let mut balances = [0u64; ACCOUNTS];
            for (i, slot) in balances.iter_mut().enumerate() {
                *slot = read_word(tx, account(&region, i))?;
            }
            Ok(balances)
        })
        .expect("final audit");

    let total: u64 = balances.iter().sum();
    for (i, balance) in balances.iter().enumerate() {
        println!("account {i}: {balance}");
    }
    println!("total: {total} (expected {})", ACCOUNTS as u64 * INITIAL_BALANCE);
    assert_eq!(total, ACCOUNTS as u64 * INITIAL_BALANCE);
}
