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

//! Pending contributions during the open offering window.

use crate::base::{AccountId, Amount};
use crate::error::BondError;
use crate::fixed_point::{Balances, checked_add};

/// Per-investor subscription receipts.
///
/// `total_subscribed` counts everything ever subscribed and never drops
/// when receipts are converted to bond units; it is the figure the cap
/// applies to.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionLedger {
    receipts: Balances,
    total_subscribed: Amount,
}

impl SubscriptionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn receipt(&self, investor: &AccountId) -> Amount {
        self.receipts.get(investor)
    }

    pub fn total_subscribed(&self) -> Amount {
        self.total_subscribed
    }

    /// Receipts not yet converted to units.
    pub fn outstanding(&self) -> Amount {
        self.receipts.total()
    }

    pub fn receipts(&self) -> impl Iterator<Item = (&AccountId, &Amount)> {
        self.receipts.iter()
    }

    /// Checks that `amount` fits under `cap`.
    ///
    /// # Errors
    ///
    /// - [`BondError::InvalidAmount`] - `amount` is zero.
    /// - [`BondError::CapExceeded`] - the raise would pass `cap`.
    pub fn ensure_room(&self, amount: Amount, cap: Amount) -> Result<(), BondError> {
        if amount == 0 {
            return Err(BondError::InvalidAmount);
        }
        let remaining = cap.saturating_sub(self.total_subscribed);
        if amount > remaining {
            return Err(BondError::CapExceeded {
                requested: amount,
                remaining,
            });
        }
        Ok(())
    }

    /// Records `amount` against `investor`.
    pub fn subscribe(
        &mut self,
        investor: AccountId,
        amount: Amount,
        cap: Amount,
    ) -> Result<(), BondError> {
        self.ensure_room(amount, cap)?;
        let new_total = checked_add(self.total_subscribed, amount)?;
        self.receipts.credit(investor, amount)?;
        self.total_subscribed = new_total;
        Ok(())
    }

    /// Zeroes `investor`'s receipt, returning it.
    pub fn take_receipt(&mut self, investor: AccountId) -> Amount {
        self.receipts.take(investor)
    }

    pub fn restore_receipt(&mut self, investor: AccountId, amount: Amount) -> Result<(), BondError> {
        self.receipts.credit(investor, amount).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: AccountId = AccountId(1);
    const BOB: AccountId = AccountId(2);

    #[test]
    fn subscriptions_accumulate() {
        let mut ledger = SubscriptionLedger::new();
        ledger.subscribe(ALICE, 100, 1_000).unwrap();
        ledger.subscribe(ALICE, 50, 1_000).unwrap();
        ledger.subscribe(BOB, 25, 1_000).unwrap();
        assert_eq!(ledger.receipt(&ALICE), 150);
        assert_eq!(ledger.total_subscribed(), 175);
    }

    #[test]
    fn subscription_filling_cap_exactly_is_accepted() {
        let mut ledger = SubscriptionLedger::new();
        ledger.subscribe(ALICE, 1_000, 1_000).unwrap();
        assert_eq!(ledger.total_subscribed(), 1_000);
    }

    #[test]
    fn subscription_over_cap_is_rejected_without_effect() {
        let mut ledger = SubscriptionLedger::new();
        ledger.subscribe(ALICE, 900, 1_000).unwrap();
        let result = ledger.subscribe(BOB, 101, 1_000);
        assert_eq!(
            result,
            Err(BondError::CapExceeded {
                requested: 101,
                remaining: 100
            })
        );
        assert_eq!(ledger.receipt(&BOB), 0);
        assert_eq!(ledger.total_subscribed(), 900);
    }

    #[test]
    fn zero_subscription_is_rejected() {
        let mut ledger = SubscriptionLedger::new();
        assert_eq!(ledger.subscribe(ALICE, 0, 1_000), Err(BondError::InvalidAmount));
    }

    #[test]
    fn ensure_room_does_not_record() {
        let mut ledger = SubscriptionLedger::new();
        ledger.subscribe(ALICE, 400, 1_000).unwrap();
        ledger.ensure_room(600, 1_000).unwrap();
        assert_eq!(ledger.total_subscribed(), 400);
        assert!(ledger.ensure_room(601, 1_000).is_err());
    }

    #[test]
    fn take_receipt_keeps_total_subscribed() {
        let mut ledger = SubscriptionLedger::new();
        ledger.subscribe(ALICE, 100, 1_000).unwrap();
        assert_eq!(ledger.take_receipt(ALICE), 100);
        assert_eq!(ledger.receipt(&ALICE), 0);
        assert_eq!(ledger.outstanding(), 0);
        assert_eq!(ledger.total_subscribed(), 100);
    }
}
