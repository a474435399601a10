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

//! Bond lifecycle engine.
//!
//! The [`BondLedger`] is the central component: it owns the bond record,
//! applies every lifecycle operation to it, and moves currency in and out
//! of its escrow account.
//!
//! # Lifecycle
//!
//! ```text
//! subscribe* ─► close ─► claim_bond* ─► (deposit_coupon ─► claim_coupon*) x N ─► return_principal ─► redeem*
//!                          withdraw_proceeds            check_default (any time after close)
//! ```
//!
//! # Serialization and reentrancy
//!
//! State sits in a [`ReentrantMutex`]: operations from different threads
//! run one at a time, while a call made back into the ledger by the
//! currency during a transfer (same thread) is let through and sees the
//! state as already updated.
//!
//! - Payouts apply their state change first, then push funds, and undo the
//!   change if the push fails.
//! - Deposits validate, pull funds, then apply. If a reentrant call made
//!   the change invalid in the meantime the pulled funds are refunded.
//!
//! Either way a failed operation leaves the bond unchanged.

use crate::base::{AccountId, Amount, CouponIndex, Timestamp};
use crate::clock::Clock;
use crate::coupon;
use crate::currency::Currency;
use crate::default_monitor::DefaultRecord;
use crate::error::BondError;
use crate::events::{EventKind, EventLog};
use crate::issuance::{principal_of, units_for};
use crate::state::{BondSnapshot, BondState};
use crate::terms::BondTerms;
use parking_lot::ReentrantMutex;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// An investor's receipt and unit holdings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub investor: AccountId,
    pub receipt: Amount,
    pub units: Amount,
}

/// Single-writer bond ledger.
///
/// # Invariants
///
/// - `total_subscribed <= cap`, and subscriptions stop once issuance closes.
/// - Live units plus redeemed units always equal units issued.
/// - A coupon period is funded at most once, and pays each unit at most
///   once, whoever holds it when the claim is made.
/// - Coupon payouts never exceed the period's funding; redemption payouts
///   never exceed the principal returned.
/// - The default flag never resets.
pub struct BondLedger {
    escrow: AccountId,
    state: ReentrantMutex<RefCell<BondState>>,
    currency: Arc<dyn Currency>,
    clock: Arc<dyn Clock>,
    events: EventLog,
}

impl BondLedger {
    /// Creates a ledger for a new bond.
    ///
    /// `escrow` is the ledger's own account on `currency`; investors and the
    /// issuer approve it before subscribing or depositing.
    ///
    /// # Errors
    ///
    /// [`BondError::InvalidTerms`] if `terms` fail validation.
    pub fn new(
        escrow: AccountId,
        terms: BondTerms,
        currency: Arc<dyn Currency>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, BondError> {
        terms.validate()?;
        info!(
            name = %terms.name,
            symbol = %terms.symbol,
            issuer = %terms.issuer,
            notional = terms.notional,
            cap = terms.cap,
            maturity = %terms.maturity,
            "bond created"
        );
        Ok(Self {
            escrow,
            state: ReentrantMutex::new(RefCell::new(BondState::new(terms))),
            currency,
            clock,
            events: EventLog::new(),
        })
    }

    // === Subscription ===

    /// Pulls `amount` from `investor` into escrow and records the receipt.
    ///
    /// # Errors
    ///
    /// - [`BondError::IssuanceClosed`] - the offering is closed.
    /// - [`BondError::InvalidAmount`] - `amount` is zero.
    /// - [`BondError::CapExceeded`] - the raise would pass the cap.
    /// - [`BondError::TransferFailed`] - the currency refused the pull.
    pub fn subscribe(&self, investor: AccountId, amount: Amount) -> Result<(), BondError> {
        let _serial = self.state.lock();
        let now = self.clock.now();
        self.read(|s| {
            s.issuance.require_open()?;
            s.subscriptions.ensure_room(amount, s.terms.cap)
        })
        .and_then(|()| {
            self.pull_then_apply(investor, amount, |s| {
                s.issuance.require_open()?;
                let cap = s.terms.cap;
                s.subscriptions.subscribe(investor, amount, cap)
            })
        })
        .inspect_err(|err| debug!(%investor, amount, %err, "subscribe rejected"))?;

        info!(%investor, amount, "subscribed");
        self.events
            .record(now, EventKind::Subscribed { investor, amount });
        Ok(())
    }

    // === Issuance ===

    /// Closes the offering and fixes the issuance date. Issuer only, once.
    ///
    /// The units the receipts convert to are fixed here as the divisor of
    /// every coupon.
    pub fn close_primary_issuance(&self, caller: AccountId) -> Result<Timestamp, BondError> {
        let _serial = self.state.lock();
        let now = self.clock.now();
        let supply = self
            .write(|s| {
                s.require_issuer(caller)?;
                let supply = s.issuable_units()?;
                s.issuance.close(now)?;
                s.coupons.fix_supply(supply);
                Ok(supply)
            })
            .inspect_err(|err| debug!(%caller, %err, "close rejected"))?;

        info!(issuance_date = %now, supply, "primary issuance closed");
        self.events
            .record(now, EventKind::IssuanceClosed { issuance_date: now });
        Ok(now)
    }

    /// Pays the subscription proceeds not yet withdrawn to the issuer.
    ///
    /// Only subscription money is ever drained; coupon and principal
    /// deposits stay in escrow. A second call pays nothing and returns 0.
    pub fn withdraw_proceeds(&self, caller: AccountId) -> Result<Amount, BondError> {
        let _serial = self.state.lock();
        let now = self.clock.now();
        let result = (|| -> Result<Amount, BondError> {
            let amount = self.write(|s| {
                s.require_issuer(caller)?;
                let total = s.subscriptions.total_subscribed();
                s.issuance.begin_withdrawal(total)
            })?;
            self.push_or_undo(caller, amount, |s| s.issuance.rollback_withdrawal(amount))?;
            Ok(amount)
        })();
        let amount = result.inspect_err(|err| debug!(%caller, %err, "withdraw rejected"))?;

        if amount > 0 {
            info!(issuer = %caller, amount, "proceeds withdrawn");
            self.events.record(
                now,
                EventKind::ProceedsWithdrawn {
                    issuer: caller,
                    amount,
                },
            );
        }
        Ok(amount)
    }

    /// Converts `investor`'s receipt into bond units. Returns the units.
    ///
    /// The fractional remainder of `receipt * 10^decimals / notional` is
    /// forfeited.
    ///
    /// # Errors
    ///
    /// - [`BondError::IssuanceOpen`] - the offering has not closed.
    /// - [`BondError::NothingToClaim`] - no receipt (or already claimed).
    pub fn claim_bond(&self, investor: AccountId) -> Result<Amount, BondError> {
        let _serial = self.state.lock();
        let now = self.clock.now();
        let (receipt, units) = self
            .write(|s| {
                s.issuance.require_closed()?;
                let receipt = s.subscriptions.receipt(&investor);
                if receipt == 0 {
                    return Err(BondError::NothingToClaim { investor });
                }
                let units = units_for(receipt, s.terms.decimals, s.terms.notional)?;
                s.subscriptions.take_receipt(investor);
                if let Err(err) = s.units.mint(investor, units) {
                    s.subscriptions.restore_receipt(investor, receipt)?;
                    return Err(err);
                }
                Ok((receipt, units))
            })
            .inspect_err(|err| debug!(%investor, %err, "claim bond rejected"))?;

        info!(%investor, receipt, units, "bond units claimed");
        self.events.record(
            now,
            EventKind::BondClaimed {
                investor,
                receipt,
                units,
            },
        );
        Ok(units)
    }

    // === Coupons ===

    /// Funds coupon `index` with `amount`. Issuer only, once per index.
    ///
    /// Early funding (before the due date) is accepted.
    pub fn deposit_coupon(
        &self,
        caller: AccountId,
        index: CouponIndex,
        amount: Amount,
    ) -> Result<(), BondError> {
        let _serial = self.state.lock();
        let now = self.clock.now();
        let due = self
            .read(|s| {
                s.require_issuer(caller)?;
                let due = s.due_date(index)?;
                s.coupons.ensure_fundable(index, amount)?;
                Ok::<_, BondError>(due)
            })
            .and_then(|due| {
                self.pull_then_apply(caller, amount, |s| s.coupons.fund(index, amount))?;
                Ok(due)
            })
            .inspect_err(|err| debug!(%caller, %index, amount, %err, "coupon deposit rejected"))?;

        let early = now < due;
        info!(%index, amount, early, "coupon funded");
        self.events
            .record(now, EventKind::CouponDeposited { index, amount });
        Ok(())
    }

    /// Pays `investor` their pro-rata share of coupon `index`.
    ///
    /// Payout is `unpaid_units * funded_amount / supply`, truncated. Units
    /// count whether or not their receipt has been claimed yet, and `supply`
    /// is fixed at close. Units a holder received already paid for `index`
    /// earn nothing more.
    ///
    /// # Errors
    ///
    /// - [`BondError::CouponNotFunded`] - the issuer has not funded `index`.
    /// - [`BondError::CouponNotDue`] - the due date has not arrived.
    /// - [`BondError::CouponAlreadyClaimed`] - every unit of `investor` is paid.
    /// - [`BondError::InsufficientEscrow`] - the period's funding is exhausted.
    pub fn claim_coupon(&self, investor: AccountId, index: CouponIndex) -> Result<Amount, BondError> {
        let _serial = self.state.lock();
        let now = self.clock.now();
        let result = (|| -> Result<coupon::CouponClaim, BondError> {
            let claim = self.write(|s| {
                let due = s.due_date(index)?;
                if !s.coupons.is_funded(index) {
                    return Err(BondError::CouponNotFunded { index });
                }
                if now < due {
                    return Err(BondError::CouponNotDue { index, due, now });
                }
                let entitled = s.entitled_units(investor)?;
                s.coupons.begin_claim(index, investor, entitled)
            })?;
            self.push_or_undo(investor, claim.payout, |s| {
                s.coupons.rollback_claim(index, investor, claim)
            })?;
            Ok(claim)
        })();
        let claim =
            result.inspect_err(|err| debug!(%investor, %index, %err, "coupon claim rejected"))?;
        let payout = claim.payout;

        info!(%investor, %index, units = claim.units, payout, "coupon claimed");
        self.events.record(
            now,
            EventKind::CouponClaimed {
                investor,
                index,
                payout,
            },
        );
        Ok(payout)
    }

    // === Default monitoring ===

    /// Raises the default flag if coupon `index` is still unfunded more than
    /// the grace period after its due date. Anyone may call this.
    ///
    /// Returns `true` when this call raised the flag.
    pub fn check_default(&self, index: CouponIndex) -> Result<bool, BondError> {
        let _serial = self.state.lock();
        let now = self.clock.now();
        let (raised, due) = self
            .write(|s| {
                let due = s.due_date(index)?;
                let funded = s.coupons.is_funded(index);
                Ok((s.monitor.check(index, due, funded, now), due))
            })
            .inspect_err(|err| debug!(%index, %err, "default check rejected"))?;

        if raised {
            warn!(%index, %due, %now, "coupon missed past grace period, bond in default");
            self.events
                .record(now, EventKind::DefaultTriggered { index, due });
        }
        Ok(raised)
    }

    // === Redemption ===

    /// Pulls `amount` of principal from the issuer into escrow.
    ///
    /// Accepted at any time, in default or not.
    pub fn return_principal(&self, caller: AccountId, amount: Amount) -> Result<(), BondError> {
        let _serial = self.state.lock();
        let now = self.clock.now();
        self.read(|s| {
            s.require_issuer(caller)?;
            if amount == 0 {
                return Err(BondError::InvalidAmount);
            }
            Ok(())
        })
        .and_then(|()| self.pull_then_apply(caller, amount, |s| s.redemption.deposit(amount)))
        .inspect_err(|err| debug!(%caller, amount, %err, "principal return rejected"))?;

        info!(amount, "principal returned");
        self.events
            .record(now, EventKind::PrincipalReturned { amount });
        Ok(())
    }

    /// Burns all of `investor`'s units and pays their face value.
    ///
    /// Coupon credit the burned units carried is dropped with them.
    ///
    /// # Errors
    ///
    /// - [`BondError::NotMature`] - called before the maturity date.
    /// - [`BondError::NothingToRedeem`] - `investor` holds no units.
    /// - [`BondError::InsufficientEscrow`] - not enough principal returned.
    pub fn redeem(&self, investor: AccountId) -> Result<Amount, BondError> {
        let _serial = self.state.lock();
        let now = self.clock.now();
        let result = (|| -> Result<(Amount, Amount), BondError> {
            let (units, payout, credit) = self.write(|s| {
                let maturity = s.terms.maturity;
                if now < maturity {
                    return Err(BondError::NotMature { maturity, now });
                }
                let units = s.units.balance_of(&investor);
                if units == 0 {
                    return Err(BondError::NothingToRedeem { investor });
                }
                let payout = principal_of(units, s.terms.decimals, s.terms.notional)?;
                s.redemption.reserve(payout)?;
                if let Err(err) = s.units.burn_all(investor) {
                    s.redemption.release(payout)?;
                    return Err(err);
                }
                let credit = match s.coupons.forfeit_credit(investor, units) {
                    Ok(credit) => credit,
                    Err(err) => {
                        s.units.unburn(investor, units)?;
                        s.redemption.release(payout)?;
                        return Err(err);
                    }
                };
                Ok((units, payout, credit))
            })?;
            self.push_or_undo(investor, payout, |s| {
                s.units.unburn(investor, units)?;
                s.coupons.restore_credit(investor, &credit)?;
                s.redemption.release(payout)
            })?;
            Ok((units, payout))
        })();
        let (units, payout) =
            result.inspect_err(|err| debug!(%investor, %err, "redemption rejected"))?;

        info!(%investor, units, payout, "redeemed");
        self.events.record(
            now,
            EventKind::Redeemed {
                investor,
                units,
                payout,
            },
        );
        Ok(payout)
    }

    // === Secondary transfers ===

    /// Moves `units` bond units from `from` to `to`.
    ///
    /// Coupon credit moves with them: units already paid for a period leave
    /// `from` first and cannot be paid again to `to`.
    pub fn transfer_units(&self, from: AccountId, to: AccountId, units: Amount) -> Result<(), BondError> {
        let _serial = self.state.lock();
        let now = self.clock.now();
        self.write(|s| {
            s.units.transfer(from, to, units)?;
            if let Err(err) = s.coupons.transfer_credit(from, to, units) {
                s.units.transfer(to, from, units)?;
                return Err(err);
            }
            Ok(())
        })
        .inspect_err(|err| debug!(%from, %to, units, %err, "unit transfer rejected"))?;

        info!(%from, %to, units, "units transferred");
        self.events
            .record(now, EventKind::UnitsTransferred { from, to, units });
        Ok(())
    }

    // === Queries ===

    pub fn escrow(&self) -> AccountId {
        self.escrow
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn terms(&self) -> BondTerms {
        self.read(|s| s.terms.clone())
    }

    pub fn issuer(&self) -> AccountId {
        self.read(|s| s.terms.issuer)
    }

    pub fn maturity_date(&self) -> Timestamp {
        self.read(|s| s.terms.maturity)
    }

    pub fn is_issuance_closed(&self) -> bool {
        self.read(|s| s.issuance.is_closed())
    }

    /// `None` until primary issuance closes.
    pub fn issuance_date(&self) -> Option<Timestamp> {
        self.read(|s| s.issuance.issuance_date())
    }

    pub fn is_defaulted(&self) -> bool {
        self.read(|s| s.monitor.is_defaulted())
    }

    pub fn default_record(&self) -> Option<DefaultRecord> {
        self.read(|s| s.monitor.record())
    }

    pub fn total_subscribed(&self) -> Amount {
        self.read(|s| s.subscriptions.total_subscribed())
    }

    pub fn total_bonds_issued(&self) -> Amount {
        self.read(|s| s.units.total_issued())
    }

    pub fn total_bonds_redeemed(&self) -> Amount {
        self.read(|s| s.units.total_redeemed())
    }

    pub fn subscription_receipt(&self, investor: AccountId) -> Amount {
        self.read(|s| s.subscriptions.receipt(&investor))
    }

    /// Bond units held by `holder`.
    pub fn balance_of(&self, holder: AccountId) -> Amount {
        self.read(|s| s.units.balance_of(&holder))
    }

    pub fn coupon_funded(&self, index: CouponIndex) -> bool {
        self.read(|s| s.coupons.is_funded(index))
    }

    pub fn coupon_claimed(&self, index: CouponIndex, investor: AccountId) -> bool {
        self.read(|s| s.coupons.is_claimed(index, &investor))
    }

    /// Due date of coupon `index`; `None` before close or for index 0.
    pub fn coupon_date(&self, index: CouponIndex) -> Option<Timestamp> {
        self.read(|s| s.schedule().and_then(|schedule| schedule.due_date(index)))
    }

    pub fn coupon_count(&self) -> u32 {
        self.read(BondState::coupon_count)
    }

    /// Seconds until the next unfunded or upcoming coupon; 0 before close.
    pub fn time_to_next_coupon(&self) -> u64 {
        let now = self.clock.now();
        self.read(|s| s.time_to_next_coupon(now))
    }

    /// Interest accrued on `investor`'s principal since issuance, at the
    /// bond's APR over a fixed 365-day year. Informational only.
    pub fn accrued_interest(&self, investor: AccountId) -> Result<Amount, BondError> {
        let now = self.clock.now();
        self.read(|s| {
            let Some(issuance_date) = s.issuance.issuance_date() else {
                return Ok(0);
            };
            let units = s.units.balance_of(&investor);
            let principal = principal_of(units, s.terms.decimals, s.terms.notional)?;
            let elapsed = issuance_date.secs_until(now);
            coupon::accrued_interest(principal, s.terms.apr_basis_points, elapsed)
        })
    }

    /// Subscription proceeds the issuer can still withdraw.
    pub fn withdrawable_proceeds(&self) -> Amount {
        self.read(|s| s.issuance.withdrawable(s.subscriptions.total_subscribed()))
    }

    /// Returned principal not yet paid out.
    pub fn principal_available(&self) -> Amount {
        self.read(|s| s.redemption.available())
    }

    /// Currency the ledger owes out of escrow across all buckets.
    pub fn escrow_liabilities(&self) -> Amount {
        self.read(BondState::escrow_liabilities)
    }

    /// Every investor with a receipt or units, ordered by identity.
    pub fn positions(&self) -> Vec<Position> {
        self.read(|s| {
            let mut positions: BTreeMap<AccountId, Position> = BTreeMap::new();
            for (investor, receipt) in s.subscriptions.receipts() {
                positions
                    .entry(*investor)
                    .or_insert(Position {
                        investor: *investor,
                        receipt: 0,
                        units: 0,
                    })
                    .receipt = *receipt;
            }
            for (investor, units) in s.units.holders() {
                positions
                    .entry(*investor)
                    .or_insert(Position {
                        investor: *investor,
                        receipt: 0,
                        units: 0,
                    })
                    .units = *units;
            }
            positions.into_values().collect()
        })
    }

    pub fn snapshot(&self) -> BondSnapshot {
        let now = self.clock.now();
        self.read(|s| s.snapshot(now))
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    // === Internals ===

    fn read<T>(&self, f: impl FnOnce(&BondState) -> T) -> T {
        let guard = self.state.lock();
        let state = guard.borrow();
        f(&state)
    }

    /// Applies `f` under the lock. The borrow ends before any transfer.
    fn write<T>(&self, f: impl FnOnce(&mut BondState) -> Result<T, BondError>) -> Result<T, BondError> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let result = f(&mut state);
        state.assert_invariants();
        result
    }

    /// Pulls `amount` from `from` into escrow, then applies `apply`.
    ///
    /// If `apply` fails after the funds arrived they are sent back.
    fn pull_then_apply(
        &self,
        from: AccountId,
        amount: Amount,
        apply: impl FnOnce(&mut BondState) -> Result<(), BondError>,
    ) -> Result<(), BondError> {
        self.currency
            .transfer_from(self.escrow, from, self.escrow, amount)?;
        if let Err(err) = self.write(apply) {
            warn!(%from, amount, %err, "state changed during pull, refunding");
            if let Err(refund_err) = self.currency.transfer(self.escrow, from, amount) {
                error!(%from, amount, %refund_err, "refund failed, funds left in escrow");
            }
            return Err(err);
        }
        Ok(())
    }

    /// Pushes `amount` from escrow to `to`; on failure runs `undo`.
    fn push_or_undo(
        &self,
        to: AccountId,
        amount: Amount,
        undo: impl FnOnce(&mut BondState) -> Result<(), BondError>,
    ) -> Result<(), BondError> {
        if amount == 0 {
            return Ok(());
        }
        if let Err(transfer_err) = self.currency.transfer(self.escrow, to, amount) {
            warn!(%to, amount, %transfer_err, "payout failed, reverting");
            if let Err(err) = self.write(undo) {
                error!(%to, amount, %err, "revert after failed payout did not apply");
            }
            return Err(transfer_err.into());
        }
        Ok(())
    }
}
