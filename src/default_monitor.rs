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

//! Missed-payment watchdog.
//!
//! The default flag only ever goes from `false` to `true`. It is advisory:
//! the ledger keeps accepting coupon funding, claims and redemption after
//! it is raised, and leaves policy to the integrating system.

use crate::base::{CouponIndex, Timestamp};
use serde::Serialize;

/// Window after a due date during which funding is still on time.
pub const GRACE_PERIOD_SECS: u64 = 5 * 86_400;

/// Details of the first missed payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DefaultRecord {
    pub index: CouponIndex,
    pub due: Timestamp,
    pub detected_at: Timestamp,
}

#[derive(Debug, Clone, Default)]
pub struct DefaultMonitor {
    record: Option<DefaultRecord>,
}

impl DefaultMonitor {
    pub fn is_defaulted(&self) -> bool {
        self.record.is_some()
    }

    pub fn record(&self) -> Option<DefaultRecord> {
        self.record
    }

    /// Latches the default flag if `index` is unfunded past its grace period.
    ///
    /// Returns `true` only on the call that raised the flag.
    pub fn check(&mut self, index: CouponIndex, due: Timestamp, funded: bool, now: Timestamp) -> bool {
        if self.is_defaulted() || funded || !past_grace(due, now) {
            return false;
        }
        self.record = Some(DefaultRecord {
            index,
            due,
            detected_at: now,
        });
        true
    }
}

/// `now > due + GRACE_PERIOD_SECS`.
fn past_grace(due: Timestamp, now: Timestamp) -> bool {
    due.add_secs(GRACE_PERIOD_SECS)
        .is_some_and(|deadline| now > deadline)
}
