// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Concurrency tests using parking_lot's built-in deadlock detector.
//!
//! Many threads drive one ledger at once. Operations must serialize without
//! deadlocking and every conservation rule must hold at the end.

use bond_ledger_rs::{
    AccountId, Amount, BondLedger, BondTerms, CouponIndex, Currency, InMemoryCurrency, ManualClock,
    Timestamp,
};
use parking_lot::deadlock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

const DAY: u64 = 86_400;
const ISSUER: AccountId = AccountId(0);
const ESCROW: AccountId = AccountId(100_000);

// === Deadlock Detection Infrastructure ===

/// Starts a background thread that checks for deadlocks.
/// Returns a handle to stop the detector.
fn start_deadlock_detector() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    thread::spawn(move || {
        while running_clone.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(100));
            let deadlocks = deadlock::check_deadlock();
            if !deadlocks.is_empty() {
                eprintln!("\n=== DEADLOCK DETECTED ===");
                for (i, threads) in deadlocks.iter().enumerate() {
                    eprintln!("\nDeadlock #{}", i + 1);
                    for t in threads {
                        eprintln!("Thread ID: {:?}", t.thread_id());
                        eprintln!("Backtrace:\n{:#?}", t.backtrace());
                    }
                }
                panic!("Deadlock detected! See output above for details.");
            }
        }
    });

    running
}

/// Stops the deadlock detector.
fn stop_deadlock_detector(running: Arc<AtomicBool>) {
    running.store(false, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(150));
}

struct Fixture {
    ledger: Arc<BondLedger>,
    currency: Arc<InMemoryCurrency>,
    clock: Arc<ManualClock>,
}

fn fixture(cap: Amount) -> Fixture {
    let currency = Arc::new(InMemoryCurrency::new());
    let clock = Arc::new(ManualClock::new(Timestamp(0)));
    let terms = BondTerms {
        name: "Concurrent Bond".into(),
        symbol: "CCB".into(),
        issuer: ISSUER,
        notional: 100,
        apr_basis_points: 500,
        coupon_frequency_secs: 30 * DAY,
        maturity: Timestamp(360 * DAY),
        cap,
        decimals: 0,
    };
    let ledger = Arc::new(BondLedger::new(ESCROW, terms, currency.clone(), clock.clone()).unwrap());
    Fixture {
        ledger,
        currency,
        clock,
    }
}

impl Fixture {
    fn fund(&self, account: AccountId, amount: Amount) {
        self.currency.mint(account, amount);
        self.currency.approve(account, ESCROW, amount);
    }

    /// `holders` investors with 1000 currency (10 units) each, claimed.
    fn issue_to(&self, holders: u32) {
        for id in 1..=holders {
            self.fund(AccountId(id), 1_000);
            self.ledger.subscribe(AccountId(id), 1_000).unwrap();
        }
        self.ledger.close_primary_issuance(ISSUER).unwrap();
        for id in 1..=holders {
            self.ledger.claim_bond(AccountId(id)).unwrap();
        }
    }
}

// === Tests ===

/// Many investors race to subscribe against a cap smaller than demand.
#[test]
fn no_deadlock_subscriptions_racing_the_cap() {
    let detector = start_deadlock_detector();
    let f = fixture(20_000);
    let accepted = Arc::new(AtomicU64::new(0));

    const NUM_THREADS: u32 = 50;
    const OPS_PER_THREAD: usize = 20;

    for id in 1..=NUM_THREADS {
        f.fund(AccountId(id), 1_000);
    }

    let mut handles = Vec::new();
    for id in 1..=NUM_THREADS {
        let ledger = f.ledger.clone();
        let accepted = accepted.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..OPS_PER_THREAD {
                if ledger.subscribe(AccountId(id), 50).is_ok() {
                    accepted.fetch_add(50, Ordering::SeqCst);
                }
            }
        }));
    }
    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);

    let total = f.ledger.total_subscribed();
    assert!(total <= 20_000);
    assert_eq!(u128::from(accepted.load(Ordering::SeqCst)), total);
    assert_eq!(f.currency.balance_of(ESCROW), total);
    let receipts: Amount = f.ledger.positions().iter().map(|p| p.receipt).sum();
    assert_eq!(receipts, total);
}

/// Every holder claims the same coupon from two threads at once.
#[test]
fn no_deadlock_duplicate_coupon_claims() {
    let detector = start_deadlock_detector();
    let f = fixture(1_000_000);
    const HOLDERS: u32 = 40;
    f.issue_to(HOLDERS);
    f.fund(ISSUER, 4_000);
    f.ledger
        .deposit_coupon(ISSUER, CouponIndex(1), 4_000)
        .unwrap();
    f.clock.set(Timestamp(30 * DAY));

    let mut handles = Vec::new();
    for _ in 0..2 {
        for id in 1..=HOLDERS {
            let ledger = f.ledger.clone();
            handles.push(thread::spawn(move || {
                ledger.claim_coupon(AccountId(id), CouponIndex(1)).is_ok()
            }));
        }
    }
    let successes = handles
        .into_iter()
        .map(|handle| handle.join().expect("Thread panicked"))
        .filter(|ok| *ok)
        .count();

    stop_deadlock_detector(detector);

    assert_eq!(successes, HOLDERS as usize);
    for id in 1..=HOLDERS {
        assert_eq!(f.currency.balance_of(AccountId(id)), 100);
    }
    assert_eq!(f.currency.balance_of(ESCROW), f.ledger.escrow_liabilities());
}

/// Readers take snapshots and walk the event log while writers mutate.
#[test]
fn no_deadlock_reads_during_writes() {
    let detector = start_deadlock_detector();
    let f = fixture(1_000_000);
    const WRITERS: u32 = 10;
    const READERS: usize = 10;

    for id in 1..=WRITERS {
        f.fund(AccountId(id), 10_000);
    }

    let mut handles = Vec::new();
    for id in 1..=WRITERS {
        let ledger = f.ledger.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..100 {
                let _ = ledger.subscribe(AccountId(id), 100);
            }
        }));
    }
    for _ in 0..READERS {
        let ledger = f.ledger.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..100 {
                let snapshot = ledger.snapshot();
                assert!(snapshot.total_subscribed <= snapshot.cap);
                let _ = ledger.positions();
                let _ = ledger.events().history();
            }
        }));
    }
    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);

    assert_eq!(f.ledger.total_subscribed(), 100_000);
    assert_eq!(f.ledger.events().len(), 1_000);
}

/// Redemptions race for principal that only covers some of them.
#[test]
fn no_deadlock_redemptions_share_limited_principal() {
    let detector = start_deadlock_detector();
    let f = fixture(1_000_000);
    const HOLDERS: u32 = 30;
    f.issue_to(HOLDERS);
    f.ledger.withdraw_proceeds(ISSUER).unwrap();
    f.currency.approve(ISSUER, ESCROW, 12_000);
    f.ledger.return_principal(ISSUER, 12_000).unwrap();
    f.clock.set(Timestamp(360 * DAY));

    let handles: Vec<_> = (1..=HOLDERS)
        .map(|id| {
            let ledger = f.ledger.clone();
            thread::spawn(move || ledger.redeem(AccountId(id)).unwrap_or(0))
        })
        .collect();
    let paid: Amount = handles
        .into_iter()
        .map(|handle| handle.join().expect("Thread panicked"))
        .sum();

    stop_deadlock_detector(detector);

    assert_eq!(paid, 12_000);
    assert_eq!(f.ledger.total_bonds_redeemed(), 120);
    assert_eq!(f.ledger.principal_available(), 0);
    assert_eq!(
        f.ledger.total_bonds_issued(),
        f.ledger.total_bonds_redeemed() + f.ledger.positions().iter().map(|p| p.units).sum::<Amount>()
    );
}
