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

//! The bond record.
//!
//! [`BondState`] is plain data: it knows nothing about the currency or
//! locking. The [`BondLedger`](crate::BondLedger) owns one and applies every
//! operation to it under its single-writer lock.

use crate::base::{AccountId, Amount, CouponIndex, Timestamp};
use crate::coupon::CouponBook;
use crate::default_monitor::{DefaultMonitor, DefaultRecord};
use crate::error::BondError;
use crate::fixed_point::checked_add;
use crate::issuance::{BondUnits, Issuance, units_for};
use crate::redemption::Redemption;
use crate::schedule::CouponSchedule;
use crate::subscription::SubscriptionLedger;
use crate::terms::BondTerms;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct BondState {
    pub(crate) terms: BondTerms,
    pub(crate) subscriptions: SubscriptionLedger,
    pub(crate) issuance: Issuance,
    pub(crate) units: BondUnits,
    pub(crate) coupons: CouponBook,
    pub(crate) monitor: DefaultMonitor,
    pub(crate) redemption: Redemption,
}

impl BondState {
    pub fn new(terms: BondTerms) -> Self {
        Self {
            terms,
            subscriptions: SubscriptionLedger::new(),
            issuance: Issuance::default(),
            units: BondUnits::default(),
            coupons: CouponBook::default(),
            monitor: DefaultMonitor::default(),
            redemption: Redemption::default(),
        }
    }

    pub fn require_issuer(&self, caller: AccountId) -> Result<(), BondError> {
        if caller != self.terms.issuer {
            return Err(BondError::Unauthorized { caller });
        }
        Ok(())
    }

    /// The coupon schedule, once primary issuance has closed.
    pub fn schedule(&self) -> Option<CouponSchedule> {
        self.issuance
            .issuance_date()
            .map(|date| CouponSchedule::new(date, self.terms.coupon_frequency_secs))
    }

    pub fn coupon_count(&self) -> u32 {
        self.schedule()
            .map(|schedule| schedule.coupon_count(self.terms.maturity))
            .unwrap_or(0)
    }

    /// Due date of `index`, validated against the schedule.
    ///
    /// # Errors
    ///
    /// - [`BondError::IssuanceOpen`] - no schedule exists yet.
    /// - [`BondError::InvalidCouponIndex`] - `index` is outside the schedule.
    pub fn due_date(&self, index: CouponIndex) -> Result<Timestamp, BondError> {
        let schedule = self.schedule().ok_or(BondError::IssuanceOpen)?;
        schedule.checked_due_date(index, self.coupon_count())
    }

    /// Units the outstanding receipts convert to, summed per investor.
    pub fn issuable_units(&self) -> Result<Amount, BondError> {
        self.subscriptions
            .receipts()
            .try_fold(0, |total, (_, receipt)| {
                checked_add(total, units_for(*receipt, self.terms.decimals, self.terms.notional)?)
            })
    }

    /// Units `holder` earns coupons on: held units plus the units their
    /// unclaimed receipt converts to.
    pub fn entitled_units(&self, holder: AccountId) -> Result<Amount, BondError> {
        let receipt = self.subscriptions.receipt(&holder);
        let pending = if receipt == 0 {
            0
        } else {
            units_for(receipt, self.terms.decimals, self.terms.notional)?
        };
        checked_add(self.units.balance_of(&holder), pending)
    }

    /// Seconds until the next unfunded or upcoming coupon; 0 before close.
    pub fn time_to_next_coupon(&self, now: Timestamp) -> u64 {
        self.schedule()
            .map(|schedule| {
                schedule.time_to_next_coupon(now, self.coupon_count(), |index| {
                    self.coupons.is_funded(index)
                })
            })
            .unwrap_or(0)
    }

    /// Escrow the ledger is accountable for: unwithdrawn proceeds, unclaimed
    /// coupons and unpaid principal.
    pub fn escrow_liabilities(&self) -> Amount {
        self.issuance
            .withdrawable(self.subscriptions.total_subscribed())
            .saturating_add(self.coupons.unclaimed_total())
            .saturating_add(self.redemption.available())
    }

    pub fn snapshot(&self, now: Timestamp) -> BondSnapshot {
        BondSnapshot {
            name: self.terms.name.clone(),
            symbol: self.terms.symbol.clone(),
            issuer: self.terms.issuer,
            notional: self.terms.notional,
            apr_basis_points: self.terms.apr_basis_points,
            coupon_frequency_secs: self.terms.coupon_frequency_secs,
            maturity: self.terms.maturity,
            cap: self.terms.cap,
            decimals: self.terms.decimals,
            issuance_closed: self.issuance.is_closed(),
            issuance_date: self.issuance.issuance_date(),
            is_defaulted: self.monitor.is_defaulted(),
            default: self.monitor.record(),
            total_subscribed: self.subscriptions.total_subscribed(),
            proceeds_withdrawn: self.issuance.proceeds_withdrawn(),
            total_bonds_issued: self.units.total_issued(),
            total_bonds_redeemed: self.units.total_redeemed(),
            principal_returned: self.redemption.principal_returned(),
            principal_paid: self.redemption.principal_paid(),
            coupon_count: self.coupon_count(),
            coupons: self
                .coupons
                .periods()
                .map(|(index, period)| CouponSummary {
                    index: *index,
                    funded_amount: period.funded_amount(),
                    claimed_amount: period.claimed_amount(),
                })
                .collect(),
            time_to_next_coupon: self.time_to_next_coupon(now),
            as_of: now,
        }
    }

    pub(crate) fn assert_invariants(&self) {
        debug_assert!(
            self.subscriptions.total_subscribed() <= self.terms.cap,
            "Invariant violated: total subscribed {} exceeds cap {}",
            self.subscriptions.total_subscribed(),
            self.terms.cap
        );
        debug_assert!(
            self.subscriptions.outstanding() <= self.subscriptions.total_subscribed(),
            "Invariant violated: outstanding receipts exceed total subscribed"
        );
        debug_assert_eq!(
            self.units.live() + self.units.total_redeemed(),
            self.units.total_issued(),
            "Invariant violated: live + redeemed != issued"
        );
        debug_assert!(
            self.redemption.principal_paid() <= self.redemption.principal_returned(),
            "Invariant violated: principal paid exceeds principal returned"
        );
        debug_assert!(
            self.issuance.proceeds_withdrawn() <= self.subscriptions.total_subscribed(),
            "Invariant violated: proceeds withdrawn exceed subscriptions"
        );
        if self.issuance.is_closed() {
            debug_assert!(
                self.units.total_issued() <= self.coupons.supply(),
                "Invariant violated: units issued exceed the coupon supply"
            );
            debug_assert!(
                self.coupons
                    .periods()
                    .all(|(_, period)| period.paid_units() <= self.coupons.supply()),
                "Invariant violated: a coupon paid more units than the supply"
            );
        }
    }
}

/// Funding and claims of one coupon period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CouponSummary {
    pub index: CouponIndex,
    pub funded_amount: Amount,
    pub claimed_amount: Amount,
}

/// Point-in-time view of the bond for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BondSnapshot {
    pub name: String,
    pub symbol: String,
    pub issuer: AccountId,
    pub notional: Amount,
    pub apr_basis_points: u32,
    pub coupon_frequency_secs: u64,
    pub maturity: Timestamp,
    pub cap: Amount,
    pub decimals: u8,
    pub issuance_closed: bool,
    pub issuance_date: Option<Timestamp>,
    pub is_defaulted: bool,
    pub default: Option<DefaultRecord>,
    pub total_subscribed: Amount,
    pub proceeds_withdrawn: Amount,
    pub total_bonds_issued: Amount,
    pub total_bonds_redeemed: Amount,
    pub principal_returned: Amount,
    pub principal_paid: Amount,
    pub coupon_count: u32,
    pub coupons: Vec<CouponSummary>,
    pub time_to_next_coupon: u64,
    pub as_of: Timestamp,
}
