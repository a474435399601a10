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

//! Integer-scaled balance arithmetic.
//!
//! All money-moving code goes through these helpers: every operation is
//! checked, divisions truncate toward zero, and nothing wraps or goes
//! negative. [`Decimal`] appears only at the reporting edge via
//! [`to_decimal`].

use crate::base::{AccountId, Amount};
use crate::error::BondError;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Largest supported `decimals`; `10^18` leaves ample headroom in `u128`.
pub const MAX_DECIMALS: u8 = 18;

/// Returns `10^decimals`.
pub fn scale(decimals: u8) -> Result<Amount, BondError> {
    if decimals > MAX_DECIMALS {
        return Err(BondError::Overflow);
    }
    10u128.checked_pow(u32::from(decimals)).ok_or(BondError::Overflow)
}

pub fn checked_add(a: Amount, b: Amount) -> Result<Amount, BondError> {
    a.checked_add(b).ok_or(BondError::Overflow)
}

pub fn checked_sub(a: Amount, b: Amount) -> Result<Amount, BondError> {
    a.checked_sub(b).ok_or(BondError::Overflow)
}

/// Computes `a * b / divisor`, truncating.
///
/// # Errors
///
/// [`BondError::Overflow`] if the product overflows or `divisor` is zero.
pub fn mul_div(a: Amount, b: Amount, divisor: Amount) -> Result<Amount, BondError> {
    a.checked_mul(b)
        .ok_or(BondError::Overflow)?
        .checked_div(divisor)
        .ok_or(BondError::Overflow)
}

/// Renders a raw amount with `decimals` fractional digits.
///
/// Returns `None` when the value does not fit a [`Decimal`] mantissa.
pub fn to_decimal(raw: Amount, decimals: u8) -> Option<Decimal> {
    let mantissa = i128::try_from(raw).ok()?;
    Decimal::try_from_i128_with_scale(mantissa, u32::from(decimals)).ok()
}

/// Per-account balances with a running total.
///
/// Only non-zero balances are stored. `total` always equals the sum of
/// all entries.
#[derive(Debug, Clone, Default)]
pub struct Balances {
    entries: HashMap<AccountId, Amount>,
    total: Amount,
}

impl Balances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, account: &AccountId) -> Amount {
        self.entries.get(account).copied().unwrap_or(0)
    }

    pub fn total(&self) -> Amount {
        self.total
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AccountId, &Amount)> {
        self.entries.iter()
    }

    /// Adds `amount` to `account`. Returns the new balance.
    pub fn credit(&mut self, account: AccountId, amount: Amount) -> Result<Amount, BondError> {
        let new_total = checked_add(self.total, amount)?;
        let balance = checked_add(self.get(&account), amount)?;
        self.total = new_total;
        if balance > 0 {
            self.entries.insert(account, balance);
        }
        self.assert_invariants();
        Ok(balance)
    }

    /// Removes `amount` from `account`. Returns the new balance.
    ///
    /// # Errors
    ///
    /// [`BondError::InsufficientBalance`] if the account holds less than
    /// `amount`; the ledger is unchanged.
    pub fn debit(&mut self, account: AccountId, amount: Amount) -> Result<Amount, BondError> {
        let balance = self.get(&account);
        if balance < amount {
            return Err(BondError::InsufficientBalance {
                account,
                balance,
                requested: amount,
            });
        }
        let remaining = balance - amount;
        self.total -= amount;
        if remaining == 0 {
            self.entries.remove(&account);
        } else {
            self.entries.insert(account, remaining);
        }
        self.assert_invariants();
        Ok(remaining)
    }

    /// Zeroes `account` and returns what it held.
    pub fn take(&mut self, account: AccountId) -> Amount {
        let balance = self.entries.remove(&account).unwrap_or(0);
        self.total -= balance;
        self.assert_invariants();
        balance
    }

    fn assert_invariants(&self) {
        debug_assert_eq!(
            self.entries.values().copied().sum::<Amount>(),
            self.total,
            "Invariant violated: running total diverged from entries"
        );
    }
}
