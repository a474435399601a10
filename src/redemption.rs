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

//! Principal escrow for redemption at maturity.

use crate::base::Amount;
use crate::error::BondError;
use crate::fixed_point::{checked_add, checked_sub};

/// Principal the issuer has returned and how much of it has been paid out.
///
/// `principal_paid <= principal_returned` always holds.
#[derive(Debug, Clone, Default)]
pub struct Redemption {
    principal_returned: Amount,
    principal_paid: Amount,
}

impl Redemption {
    pub fn principal_returned(&self) -> Amount {
        self.principal_returned
    }

    pub fn principal_paid(&self) -> Amount {
        self.principal_paid
    }

    pub fn available(&self) -> Amount {
        self.principal_returned - self.principal_paid
    }

    pub fn deposit(&mut self, amount: Amount) -> Result<(), BondError> {
        if amount == 0 {
            return Err(BondError::InvalidAmount);
        }
        self.principal_returned = checked_add(self.principal_returned, amount)?;
        Ok(())
    }

    /// Reserves `payout` from the returned principal.
    ///
    /// # Errors
    ///
    /// [`BondError::InsufficientEscrow`] if less than `payout` is available.
    pub fn reserve(&mut self, payout: Amount) -> Result<(), BondError> {
        let available = self.available();
        if payout > available {
            return Err(BondError::InsufficientEscrow {
                required: payout,
                available,
            });
        }
        self.principal_paid += payout;
        Ok(())
    }

    pub fn release(&mut self, payout: Amount) -> Result<(), BondError> {
        self.principal_paid = checked_sub(self.principal_paid, payout)?;
        Ok(())
    }
}
