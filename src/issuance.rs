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

//! Closing the offering and converting receipts to bond units.
//!
//! ```text
//!  Open ──close──► Closed (issuance_date fixed)
//!                     │
//!                     ├── withdraw proceeds (once; later calls drain nothing)
//!                     └── claim bond: receipt ──► units
//! ```

use crate::base::{AccountId, Amount, Timestamp};
use crate::error::BondError;
use crate::fixed_point::{Balances, checked_add, checked_sub, mul_div, scale};

/// Offering phase plus the proceeds the issuer has already taken.
#[derive(Debug, Clone, Default)]
pub struct Issuance {
    issuance_date: Option<Timestamp>,
    proceeds_withdrawn: Amount,
}

impl Issuance {
    pub fn is_closed(&self) -> bool {
        self.issuance_date.is_some()
    }

    pub fn issuance_date(&self) -> Option<Timestamp> {
        self.issuance_date
    }

    pub fn proceeds_withdrawn(&self) -> Amount {
        self.proceeds_withdrawn
    }

    pub fn require_open(&self) -> Result<(), BondError> {
        match self.issuance_date {
            None => Ok(()),
            Some(_) => Err(BondError::IssuanceClosed),
        }
    }

    pub fn require_closed(&self) -> Result<Timestamp, BondError> {
        self.issuance_date.ok_or(BondError::IssuanceOpen)
    }

    /// Closes the offering at `now`.
    pub fn close(&mut self, now: Timestamp) -> Result<(), BondError> {
        if self.is_closed() {
            return Err(BondError::AlreadyClosed);
        }
        self.issuance_date = Some(now);
        Ok(())
    }

    /// Subscription proceeds not yet paid to the issuer.
    pub fn withdrawable(&self, total_subscribed: Amount) -> Amount {
        total_subscribed.saturating_sub(self.proceeds_withdrawn)
    }

    /// Marks the remaining proceeds as withdrawn, returning the amount.
    pub fn begin_withdrawal(&mut self, total_subscribed: Amount) -> Result<Amount, BondError> {
        self.require_closed()?;
        let amount = self.withdrawable(total_subscribed);
        self.proceeds_withdrawn = checked_add(self.proceeds_withdrawn, amount)?;
        Ok(amount)
    }

    pub fn rollback_withdrawal(&mut self, amount: Amount) -> Result<(), BondError> {
        self.proceeds_withdrawn = checked_sub(self.proceeds_withdrawn, amount)?;
        Ok(())
    }
}

/// Bond units for a subscription: `receipt * 10^decimals / notional`.
///
/// Truncates; the fractional remainder is forfeited.
pub fn units_for(receipt: Amount, decimals: u8, notional: Amount) -> Result<Amount, BondError> {
    mul_div(receipt, scale(decimals)?, notional)
}

/// Currency value of `units` at face value: `units * notional / 10^decimals`.
pub fn principal_of(units: Amount, decimals: u8, notional: Amount) -> Result<Amount, BondError> {
    mul_div(units, notional, scale(decimals)?)
}

/// Bond unit holdings.
///
/// Invariant: `live + total_redeemed == total_issued`.
#[derive(Debug, Clone, Default)]
pub struct BondUnits {
    balances: Balances,
    total_issued: Amount,
    total_redeemed: Amount,
}

impl BondUnits {
    pub fn balance_of(&self, holder: &AccountId) -> Amount {
        self.balances.get(holder)
    }

    pub fn total_issued(&self) -> Amount {
        self.total_issued
    }

    pub fn total_redeemed(&self) -> Amount {
        self.total_redeemed
    }

    pub fn live(&self) -> Amount {
        self.balances.total()
    }

    pub fn holders(&self) -> impl Iterator<Item = (&AccountId, &Amount)> {
        self.balances.iter()
    }

    pub fn mint(&mut self, holder: AccountId, units: Amount) -> Result<(), BondError> {
        let total_issued = checked_add(self.total_issued, units)?;
        self.balances.credit(holder, units)?;
        self.total_issued = total_issued;
        self.assert_invariants();
        Ok(())
    }

    /// Zeroes `holder`'s balance and counts it as redeemed.
    pub fn burn_all(&mut self, holder: AccountId) -> Result<Amount, BondError> {
        let units = self.balances.get(&holder);
        let total_redeemed = checked_add(self.total_redeemed, units)?;
        self.balances.take(holder);
        self.total_redeemed = total_redeemed;
        self.assert_invariants();
        Ok(units)
    }

    /// Reverses a [`burn_all`](Self::burn_all).
    pub fn unburn(&mut self, holder: AccountId, units: Amount) -> Result<(), BondError> {
        let total_redeemed = checked_sub(self.total_redeemed, units)?;
        self.balances.credit(holder, units)?;
        self.total_redeemed = total_redeemed;
        self.assert_invariants();
        Ok(())
    }

    pub fn transfer(&mut self, from: AccountId, to: AccountId, units: Amount) -> Result<(), BondError> {
        if units == 0 {
            return Err(BondError::InvalidAmount);
        }
        self.balances.debit(from, units)?;
        self.balances.credit(to, units)?;
        self.assert_invariants();
        Ok(())
    }

    fn assert_invariants(&self) {
        debug_assert_eq!(
            self.balances.total() + self.total_redeemed,
            self.total_issued,
            "Invariant violated: live + redeemed != issued"
        );
    }
}
