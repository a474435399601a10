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

//! Coupon due dates.
//!
//! The schedule is derived, never stored: it exists only once primary
//! issuance has closed and is fully determined by the issuance date and
//! the coupon frequency.
//!
//! ```text
//!  issuance      due(1)         due(2)   ...   due(N) >= maturity
//!     |-- freq -----|-- freq -------|              |
//! ```

use crate::base::{CouponIndex, Timestamp};
use crate::error::BondError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CouponSchedule {
    issuance_date: Timestamp,
    frequency_secs: u64,
}

impl CouponSchedule {
    pub fn new(issuance_date: Timestamp, frequency_secs: u64) -> Self {
        Self {
            issuance_date,
            frequency_secs,
        }
    }

    pub fn issuance_date(&self) -> Timestamp {
        self.issuance_date
    }

    /// `issuance_date + index * frequency`; `None` for index 0 or on overflow.
    pub fn due_date(&self, index: CouponIndex) -> Option<Timestamp> {
        if index.0 == 0 {
            return None;
        }
        let offset = u64::from(index.0).checked_mul(self.frequency_secs)?;
        self.issuance_date.add_secs(offset)
    }

    /// Number of periods up to maturity: `ceil((maturity - issuance) / frequency)`.
    pub fn coupon_count(&self, maturity: Timestamp) -> u32 {
        if self.frequency_secs == 0 {
            return 0;
        }
        let span = self.issuance_date.secs_until(maturity);
        let count = span.div_ceil(self.frequency_secs);
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Resolves the due date of an index inside `1..=count`.
    ///
    /// # Errors
    ///
    /// [`BondError::InvalidCouponIndex`] for index 0 or beyond `count`.
    pub fn checked_due_date(&self, index: CouponIndex, count: u32) -> Result<Timestamp, BondError> {
        if index.0 == 0 || index.0 > count {
            return Err(BondError::InvalidCouponIndex { index, count });
        }
        self.due_date(index).ok_or(BondError::Overflow)
    }

    /// Seconds until the first period that is unfunded or still in the future.
    ///
    /// Zero when every period is funded and past due, or when that period's
    /// due date has already passed.
    pub fn time_to_next_coupon(
        &self,
        now: Timestamp,
        count: u32,
        is_funded: impl Fn(CouponIndex) -> bool,
    ) -> u64 {
        (1..=count)
            .map(CouponIndex)
            .find_map(|index| {
                let due = self.due_date(index)?;
                (!is_funded(index) || due > now).then_some(due)
            })
            .map(|due| now.secs_until(due))
            .unwrap_or(0)
    }
}
