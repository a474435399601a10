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

//! Coupon funding, pro-rata claims and accrued interest.
//!
//! A period's funding is write-once. Each period remembers how many units
//! it has already paid and for whom; that credit follows the units when
//! they change hands, so a unit is paid at most once per period no matter
//! how often it moves. Payouts are `unpaid_units * funded / supply`, where
//! `supply` is the unit count fixed when primary issuance closed.

use crate::base::{AccountId, Amount, CouponIndex};
use crate::error::BondError;
use crate::fixed_point::{Balances, checked_add, checked_sub, mul_div};
use std::collections::{BTreeMap, HashSet};

/// Fixed 365-day year, regardless of leap years.
pub const YEAR_SECONDS: u64 = 365 * 86_400;

/// Basis-point denominator: 10000 = 100%.
pub const BASIS_POINTS: u128 = 10_000;

#[derive(Debug, Clone, Default)]
pub struct CouponPeriod {
    funded_amount: Amount,
    claimed_amount: Amount,
    paid_units: Balances,
    claimants: HashSet<AccountId>,
}

impl CouponPeriod {
    pub fn funded_amount(&self) -> Amount {
        self.funded_amount
    }

    pub fn claimed_amount(&self) -> Amount {
        self.claimed_amount
    }

    /// Funding not yet paid out.
    pub fn remaining(&self) -> Amount {
        self.funded_amount - self.claimed_amount
    }

    /// Units of `holder` this period has already paid.
    pub fn paid_units_of(&self, holder: &AccountId) -> Amount {
        self.paid_units.get(holder)
    }

    /// Units paid across all holders.
    pub fn paid_units(&self) -> Amount {
        self.paid_units.total()
    }
}

/// A booked coupon claim, kept so a failed payout can be reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CouponClaim {
    pub units: Amount,
    pub payout: Amount,
    first: bool,
}

/// Funded coupon periods keyed by index.
///
/// A period is present if and only if it has been funded.
#[derive(Debug, Clone, Default)]
pub struct CouponBook {
    supply: Amount,
    periods: BTreeMap<CouponIndex, CouponPeriod>,
}

impl CouponBook {
    /// Units every coupon is divided over.
    pub fn supply(&self) -> Amount {
        self.supply
    }

    /// Fixes the coupon divisor. Called once, when issuance closes.
    pub fn fix_supply(&mut self, supply: Amount) {
        self.supply = supply;
    }

    pub fn is_funded(&self, index: CouponIndex) -> bool {
        self.periods.contains_key(&index)
    }

    /// Whether `holder` has claimed `index` or holds units already paid for it.
    pub fn is_claimed(&self, index: CouponIndex, holder: &AccountId) -> bool {
        self.periods.get(&index).is_some_and(|period| {
            period.claimants.contains(holder) || period.paid_units.get(holder) > 0
        })
    }

    pub fn period(&self, index: CouponIndex) -> Option<&CouponPeriod> {
        self.periods.get(&index)
    }

    pub fn periods(&self) -> impl Iterator<Item = (&CouponIndex, &CouponPeriod)> {
        self.periods.iter()
    }

    /// Coupon funds held but not yet claimed, across all periods.
    pub fn unclaimed_total(&self) -> Amount {
        self.periods.values().map(CouponPeriod::remaining).sum()
    }

    /// Checks that `index` can still be funded with `amount`.
    ///
    /// # Errors
    ///
    /// - [`BondError::InvalidAmount`] - `amount` is zero.
    /// - [`BondError::CouponAlreadyFunded`] - the period was funded before.
    pub fn ensure_fundable(&self, index: CouponIndex, amount: Amount) -> Result<(), BondError> {
        if amount == 0 {
            return Err(BondError::InvalidAmount);
        }
        if self.is_funded(index) {
            return Err(BondError::CouponAlreadyFunded { index });
        }
        Ok(())
    }

    /// Funds `index` with `amount`. Write-once per index.
    pub fn fund(&mut self, index: CouponIndex, amount: Amount) -> Result<(), BondError> {
        self.ensure_fundable(index, amount)?;
        self.periods.insert(
            index,
            CouponPeriod {
                funded_amount: amount,
                ..CouponPeriod::default()
            },
        );
        Ok(())
    }

    /// Pays `holder` for the part of `entitled` units that `index` has not
    /// paid yet and books the payout.
    ///
    /// # Errors
    ///
    /// - [`BondError::CouponNotFunded`] - nothing was deposited for `index`.
    /// - [`BondError::CouponAlreadyClaimed`] - every unit of `holder` is paid.
    /// - [`BondError::InsufficientEscrow`] - the payout would pass the funding.
    pub fn begin_claim(
        &mut self,
        index: CouponIndex,
        holder: AccountId,
        entitled: Amount,
    ) -> Result<CouponClaim, BondError> {
        let supply = self.supply;
        let period = self
            .periods
            .get_mut(&index)
            .ok_or(BondError::CouponNotFunded { index })?;
        let paid = period.paid_units.get(&holder);
        let units = entitled.saturating_sub(paid);
        if units == 0 && (paid > 0 || period.claimants.contains(&holder)) {
            return Err(BondError::CouponAlreadyClaimed {
                investor: holder,
                index,
            });
        }
        let payout = if supply == 0 {
            0
        } else {
            mul_div(units, period.funded_amount, supply)?
        };
        let available = period.remaining();
        if payout > available {
            return Err(BondError::InsufficientEscrow {
                required: payout,
                available,
            });
        }
        let claimed_amount = checked_add(period.claimed_amount, payout)?;
        period.paid_units.credit(holder, units)?;
        period.claimed_amount = claimed_amount;
        let first = period.claimants.insert(holder);
        Ok(CouponClaim {
            units,
            payout,
            first,
        })
    }

    /// Reverses a [`begin_claim`](Self::begin_claim) whose transfer failed.
    pub fn rollback_claim(
        &mut self,
        index: CouponIndex,
        holder: AccountId,
        claim: CouponClaim,
    ) -> Result<(), BondError> {
        let period = self
            .periods
            .get_mut(&index)
            .ok_or(BondError::CouponNotFunded { index })?;
        period.claimed_amount = checked_sub(period.claimed_amount, claim.payout)?;
        let units = claim.units.min(period.paid_units.get(&holder));
        period.paid_units.debit(holder, units)?;
        if claim.first {
            period.claimants.remove(&holder);
        }
        Ok(())
    }

    /// Moves paid credit for up to `units` from `from` to `to` in every
    /// period. Paid units are the first to leave.
    pub fn transfer_credit(&mut self, from: AccountId, to: AccountId, units: Amount) -> Result<(), BondError> {
        for period in self.periods.values_mut() {
            let moved = units.min(period.paid_units.get(&from));
            if moved == 0 {
                continue;
            }
            period.paid_units.debit(from, moved)?;
            period.paid_units.credit(to, moved)?;
        }
        Ok(())
    }

    /// Drops the paid credit `units` burned units of `holder` carried,
    /// returning it per period. Paid units are the first to go.
    pub fn forfeit_credit(
        &mut self,
        holder: AccountId,
        units: Amount,
    ) -> Result<Vec<(CouponIndex, Amount)>, BondError> {
        let mut forfeited = Vec::new();
        for (index, period) in self.periods.iter_mut() {
            let burned = units.min(period.paid_units.get(&holder));
            if burned > 0 {
                period.paid_units.debit(holder, burned)?;
                forfeited.push((*index, burned));
            }
        }
        Ok(forfeited)
    }

    /// Reverses a [`forfeit_credit`](Self::forfeit_credit).
    pub fn restore_credit(
        &mut self,
        holder: AccountId,
        credit: &[(CouponIndex, Amount)],
    ) -> Result<(), BondError> {
        for (index, units) in credit {
            if let Some(period) = self.periods.get_mut(index) {
                period.paid_units.credit(holder, *units)?;
            }
        }
        Ok(())
    }
}

/// Simple interest on `principal` over `elapsed_secs`:
/// `principal * apr_bps * elapsed / (YEAR_SECONDS * 10000)`, truncated.
pub fn accrued_interest(
    principal: Amount,
    apr_basis_points: u32,
    elapsed_secs: u64,
) -> Result<Amount, BondError> {
    let rate_time = u128::from(apr_basis_points)
        .checked_mul(u128::from(elapsed_secs))
        .ok_or(BondError::Overflow)?;
    mul_div(principal, rate_time, u128::from(YEAR_SECONDS) * BASIS_POINTS)
}
