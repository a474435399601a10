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

//! Property-based tests for the bond ledger.
//!
//! These tests verify invariants that should hold for any sequence of
//! lifecycle operations, valid or not.

use bond_ledger_rs::{
    AccountId, Amount, BondError, BondLedger, BondTerms, CouponIndex, Currency, InMemoryCurrency,
    ManualClock, Timestamp,
};
use proptest::prelude::*;
use std::sync::Arc;

const DAY: u64 = 86_400;
const ISSUER: AccountId = AccountId(0);
const ESCROW: AccountId = AccountId(9_999);
const INVESTORS: u32 = 4;

struct Harness {
    ledger: BondLedger,
    currency: Arc<InMemoryCurrency>,
    clock: Arc<ManualClock>,
}

fn harness(cap: Amount) -> Harness {
    let currency = Arc::new(InMemoryCurrency::new());
    let clock = Arc::new(ManualClock::new(Timestamp(0)));
    let terms = BondTerms {
        name: "Property Bond".into(),
        symbol: "PB".into(),
        issuer: ISSUER,
        notional: 100,
        apr_basis_points: 400,
        coupon_frequency_secs: 90 * DAY,
        maturity: Timestamp(360 * DAY),
        cap,
        decimals: 0,
    };
    let ledger = BondLedger::new(ESCROW, terms, currency.clone(), clock.clone()).unwrap();
    for id in 0..=INVESTORS {
        currency.mint(AccountId(id), 1_000_000);
        currency.approve(AccountId(id), ESCROW, 1_000_000);
    }
    Harness {
        ledger,
        currency,
        clock,
    }
}

// =============================================================================
// Arbitrary Strategies
// =============================================================================

#[derive(Debug, Clone)]
enum Action {
    Subscribe(u32, Amount),
    Close,
    Withdraw,
    ClaimBond(u32),
    DepositCoupon(u32, Amount),
    ClaimCoupon(u32, u32),
    CheckDefault(u32),
    ReturnPrincipal(Amount),
    Redeem(u32),
    Transfer(u32, u32, Amount),
    Advance(u64),
}

fn arb_investor() -> impl Strategy<Value = u32> {
    1..=INVESTORS
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        4 => (arb_investor(), 0u128..3_000).prop_map(|(i, a)| Action::Subscribe(i, a)),
        1 => Just(Action::Close),
        1 => Just(Action::Withdraw),
        2 => arb_investor().prop_map(Action::ClaimBond),
        2 => (0u32..6, 0u128..5_000).prop_map(|(i, a)| Action::DepositCoupon(i, a)),
        3 => (arb_investor(), 0u32..6).prop_map(|(h, i)| Action::ClaimCoupon(h, i)),
        1 => (0u32..6).prop_map(Action::CheckDefault),
        1 => (0u128..10_000).prop_map(Action::ReturnPrincipal),
        2 => arb_investor().prop_map(Action::Redeem),
        2 => (arb_investor(), arb_investor(), 0u128..40).prop_map(|(f, t, u)| Action::Transfer(f, t, u)),
        2 => (1u64..120).prop_map(Action::Advance),
    ]
}

fn apply(h: &Harness, action: &Action) -> Result<(), BondError> {
    let ledger = &h.ledger;
    match *action {
        Action::Subscribe(i, amount) => ledger.subscribe(AccountId(i), amount),
        Action::Close => ledger.close_primary_issuance(ISSUER).map(drop),
        Action::Withdraw => ledger.withdraw_proceeds(ISSUER).map(drop),
        Action::ClaimBond(i) => ledger.claim_bond(AccountId(i)).map(drop),
        Action::DepositCoupon(index, amount) => {
            ledger.deposit_coupon(ISSUER, CouponIndex(index), amount)
        }
        Action::ClaimCoupon(i, index) => ledger.claim_coupon(AccountId(i), CouponIndex(index)).map(drop),
        Action::CheckDefault(index) => ledger.check_default(CouponIndex(index)).map(drop),
        Action::ReturnPrincipal(amount) => ledger.return_principal(ISSUER, amount),
        Action::Redeem(i) => ledger.redeem(AccountId(i)).map(drop),
        Action::Transfer(from, to, units) => {
            ledger.transfer_units(AccountId(from), AccountId(to), units)
        }
        Action::Advance(days) => {
            h.clock.advance(days * DAY);
            Ok(())
        }
    }
}

// =============================================================================
// Ledger Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Total subscribed never exceeds the cap, and an over-cap call changes nothing.
    #[test]
    fn subscriptions_never_exceed_cap(
        cap in 1u128..20_000,
        subscriptions in prop::collection::vec((arb_investor(), 1u128..5_000), 1..30),
    ) {
        let h = harness(cap);
        for (investor, amount) in subscriptions {
            let before = h.ledger.total_subscribed();
            match h.ledger.subscribe(AccountId(investor), amount) {
                Ok(()) => prop_assert_eq!(h.ledger.total_subscribed(), before + amount),
                Err(_) => {
                    prop_assert!(before + amount > cap);
                    prop_assert_eq!(h.ledger.total_subscribed(), before);
                }
            }
            prop_assert!(h.ledger.total_subscribed() <= cap);
        }
    }

    /// Live units plus redeemed units always equal units issued.
    #[test]
    fn units_are_conserved(actions in prop::collection::vec(arb_action(), 1..60)) {
        let h = harness(50_000);
        for action in &actions {
            let _ = apply(&h, action);
            let live: Amount = h.ledger.positions().iter().map(|p| p.units).sum();
            prop_assert_eq!(
                live + h.ledger.total_bonds_redeemed(),
                h.ledger.total_bonds_issued()
            );
        }
    }

    /// Escrow holds exactly what the ledger owes out of it.
    #[test]
    fn escrow_matches_liabilities(actions in prop::collection::vec(arb_action(), 1..60)) {
        let h = harness(50_000);
        for action in &actions {
            let _ = apply(&h, action);
            prop_assert_eq!(h.currency.balance_of(ESCROW), h.ledger.escrow_liabilities());
        }
    }

    /// A rejected operation leaves the bond and every balance untouched.
    #[test]
    fn failed_operations_change_nothing(actions in prop::collection::vec(arb_action(), 1..60)) {
        let h = harness(50_000);
        for action in &actions {
            let snapshot = h.ledger.snapshot();
            let positions = h.ledger.positions();
            let balances: Vec<Amount> = (0..=INVESTORS)
                .map(|id| h.currency.balance_of(AccountId(id)))
                .chain([h.currency.balance_of(ESCROW)])
                .collect();
            let events = h.ledger.events().len();

            if apply(&h, action).is_err() {
                prop_assert_eq!(h.ledger.snapshot(), snapshot);
                prop_assert_eq!(h.ledger.positions(), positions);
                let after: Vec<Amount> = (0..=INVESTORS)
                    .map(|id| h.currency.balance_of(AccountId(id)))
                    .chain([h.currency.balance_of(ESCROW)])
                    .collect();
                prop_assert_eq!(after, balances);
                prop_assert_eq!(h.ledger.events().len(), events);
            }
        }
    }

    /// Coupon claims never pay out more than was funded, and lose at most
    /// one unit per holder to truncation.
    #[test]
    fn coupon_payouts_are_bounded_by_funding(
        shares in prop::collection::vec(1u128..5_000, 1..=INVESTORS as usize),
        funded in 1u128..1_000_000,
    ) {
        let h = harness(10_000_000);
        for (i, amount) in shares.iter().enumerate() {
            h.ledger.subscribe(AccountId(i as u32 + 1), amount * 100).unwrap();
        }
        h.ledger.close_primary_issuance(ISSUER).unwrap();
        for i in 0..shares.len() {
            h.ledger.claim_bond(AccountId(i as u32 + 1)).unwrap();
        }
        h.ledger.deposit_coupon(ISSUER, CouponIndex(1), funded).unwrap();
        h.clock.advance(90 * DAY);

        let paid: Amount = (0..shares.len())
            .map(|i| h.ledger.claim_coupon(AccountId(i as u32 + 1), CouponIndex(1)).unwrap())
            .sum();
        prop_assert!(paid <= funded);
        prop_assert!(funded - paid < shares.len() as u128);
    }

    /// However late holders convert their receipts, each is paid exactly
    /// the share of the coupon their subscription had at close.
    #[test]
    fn late_unit_claims_pay_the_share_at_close(
        shares in prop::collection::vec(1u128..5_000, 1..=INVESTORS as usize),
        rate in 1u128..50,
        steps in prop::collection::vec((0usize..INVESTORS as usize, any::<bool>()), 0..20),
    ) {
        let h = harness(10_000_000);
        for (i, units) in shares.iter().enumerate() {
            h.ledger.subscribe(AccountId(i as u32 + 1), units * 100).unwrap();
        }
        h.ledger.close_primary_issuance(ISSUER).unwrap();
        let funded = shares.iter().sum::<Amount>() * rate;
        h.ledger.deposit_coupon(ISSUER, CouponIndex(1), funded).unwrap();
        h.clock.advance(90 * DAY);

        let mut paid = vec![0; shares.len()];
        let mut claim = |i: usize| -> Result<(), TestCaseError> {
            match h.ledger.claim_coupon(AccountId(i as u32 + 1), CouponIndex(1)) {
                Ok(payout) => paid[i] += payout,
                Err(BondError::CouponAlreadyClaimed { .. }) => {}
                Err(err) => return Err(TestCaseError::fail(format!("claim failed: {err}"))),
            }
            Ok(())
        };
        for &(i, convert) in &steps {
            let i = i % shares.len();
            if convert {
                let _ = h.ledger.claim_bond(AccountId(i as u32 + 1));
            } else {
                claim(i)?;
            }
        }
        for i in 0..shares.len() {
            let _ = h.ledger.claim_bond(AccountId(i as u32 + 1));
            claim(i)?;
        }

        let expected: Vec<Amount> = shares.iter().map(|units| units * rate).collect();
        prop_assert_eq!(paid, expected);
    }

    /// Moving units around between coupon claims never pays a unit twice
    /// and never locks an honest holder out: the period pays out exactly.
    #[test]
    fn coupons_follow_units_through_transfers(
        shares in prop::collection::vec(1u128..500, 1..=INVESTORS as usize),
        rate in 1u128..50,
        steps in prop::collection::vec(
            (0u8..3, 1..=INVESTORS + 1, 1..=INVESTORS + 1, 1u128..600),
            0..40,
        ),
    ) {
        let h = harness(10_000_000);
        for (i, units) in shares.iter().enumerate() {
            h.ledger.subscribe(AccountId(i as u32 + 1), units * 100).unwrap();
        }
        h.ledger.close_primary_issuance(ISSUER).unwrap();
        let funded = shares.iter().sum::<Amount>() * rate;
        h.ledger.deposit_coupon(ISSUER, CouponIndex(1), funded).unwrap();
        h.clock.advance(90 * DAY);

        let mut paid: Amount = 0;
        let mut claim = |holder: u32| -> Result<(), TestCaseError> {
            match h.ledger.claim_coupon(AccountId(holder), CouponIndex(1)) {
                Ok(payout) => {
                    prop_assert_eq!(payout % rate, 0);
                    paid += payout;
                }
                Err(BondError::CouponAlreadyClaimed { .. }) => {}
                Err(err) => return Err(TestCaseError::fail(format!("claim failed: {err}"))),
            }
            Ok(())
        };
        for &(kind, from, to, units) in &steps {
            match kind {
                0 => {
                    let _ = h.ledger.claim_bond(AccountId(from));
                }
                1 => claim(from)?,
                _ => {
                    let _ = h.ledger.transfer_units(AccountId(from), AccountId(to), units);
                }
            }
        }
        for holder in 1..=INVESTORS + 1 {
            let _ = h.ledger.claim_bond(AccountId(holder));
            claim(holder)?;
        }

        prop_assert_eq!(paid, funded);
        prop_assert_eq!(h.ledger.escrow_liabilities(), h.ledger.withdrawable_proceeds());
    }

    /// Redemptions never pay out more principal than was returned.
    #[test]
    fn redemptions_bounded_by_returned_principal(
        subscriptions in prop::collection::vec(1u128..50, 1..=INVESTORS as usize),
        returned in 1u128..20_000,
    ) {
        let h = harness(1_000_000);
        for (i, whole_bonds) in subscriptions.iter().enumerate() {
            h.ledger.subscribe(AccountId(i as u32 + 1), whole_bonds * 100).unwrap();
        }
        h.ledger.close_primary_issuance(ISSUER).unwrap();
        for i in 0..subscriptions.len() {
            h.ledger.claim_bond(AccountId(i as u32 + 1)).unwrap();
        }
        h.ledger.return_principal(ISSUER, returned).unwrap();
        h.clock.set(Timestamp(360 * DAY));

        let mut paid = 0;
        for (i, whole_bonds) in subscriptions.iter().enumerate() {
            let investor = AccountId(i as u32 + 1);
            if let Ok(payout) = h.ledger.redeem(investor) {
                prop_assert_eq!(payout, whole_bonds * 100);
                prop_assert_eq!(h.ledger.balance_of(investor), 0);
                paid += payout;
            }
        }
        prop_assert!(paid <= returned);
        prop_assert_eq!(h.ledger.principal_available(), returned - paid);
    }
}
