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

//! Immutable bond terms fixed at creation.
//!
//! # Scale convention
//!
//! `notional`, `cap` and every currency amount passed to the ledger are in
//! the currency's smallest unit. `decimals` is the bond-unit scale only:
//! `10^decimals` bond units make one whole bond with face value `notional`.
//!
//! ```
//! use bond_ledger_rs::{AccountId, BondTerms, Timestamp};
//!
//! let terms = BondTerms {
//!     name: "Corporate Bond 2027".into(),
//!     symbol: "CB27".into(),
//!     issuer: AccountId(0),
//!     notional: 100_000_000,
//!     apr_basis_points: 400,
//!     coupon_frequency_secs: 90 * 86_400,
//!     maturity: Timestamp(1_000_000_000),
//!     cap: 1_000_000_000_000,
//!     decimals: 6,
//! };
//! assert!(terms.validate().is_ok());
//! ```

use crate::base::{AccountId, Amount, Timestamp};
use crate::error::BondError;
use crate::fixed_point::MAX_DECIMALS;
use serde::{Deserialize, Serialize};

/// Upper bound on the coupon rate: 1000%.
pub const MAX_APR_BASIS_POINTS: u32 = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondTerms {
    pub name: String,
    pub symbol: String,
    pub issuer: AccountId,
    /// Face value of one whole bond, in currency units.
    pub notional: Amount,
    /// 10000 = 100%.
    pub apr_basis_points: u32,
    pub coupon_frequency_secs: u64,
    pub maturity: Timestamp,
    /// Maximum raise, in currency units.
    pub cap: Amount,
    pub decimals: u8,
}

impl BondTerms {
    /// Checks the terms are usable.
    ///
    /// # Errors
    ///
    /// [`BondError::InvalidTerms`] naming the first offending field.
    pub fn validate(&self) -> Result<(), BondError> {
        if self.name.trim().is_empty() {
            return Err(BondError::InvalidTerms("name must not be empty".into()));
        }
        if self.symbol.trim().is_empty() {
            return Err(BondError::InvalidTerms("symbol must not be empty".into()));
        }
        if self.notional == 0 {
            return Err(BondError::InvalidTerms("notional must be positive".into()));
        }
        if self.cap == 0 {
            return Err(BondError::InvalidTerms("cap must be positive".into()));
        }
        if self.coupon_frequency_secs == 0 {
            return Err(BondError::InvalidTerms(
                "coupon frequency must be positive".into(),
            ));
        }
        if self.decimals > MAX_DECIMALS {
            return Err(BondError::InvalidTerms(format!(
                "decimals {} exceeds maximum {}",
                self.decimals, MAX_DECIMALS
            )));
        }
        if self.apr_basis_points > MAX_APR_BASIS_POINTS {
            return Err(BondError::InvalidTerms(format!(
                "apr {} bps exceeds maximum {}",
                self.apr_basis_points, MAX_APR_BASIS_POINTS
            )));
        }
        Ok(())
    }
}
