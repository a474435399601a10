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

//! # Bond Ledger
//!
//! A single-bond ledger for a fixed-income security: investors subscribe
//! during a capped offering, receive bond units once the issuer closes it,
//! collect pro-rata coupons the issuer funds, and redeem principal at
//! maturity. Missed coupons past a grace period latch a default flag.
//!
//! ## Core Components
//!
//! - [`BondLedger`]: applies every lifecycle operation under a single writer
//! - [`BondTerms`]: immutable economic terms fixed at creation
//! - [`Currency`]: the fungible settlement token the ledger escrows
//! - [`Clock`]: the source of "now"
//! - [`BondError`]: typed failures, grouped by [`ErrorKind`]
//! - [`EventLog`]: the ordered record of completed operations
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use bond_ledger_rs::{AccountId, BondLedger, BondTerms, CouponIndex, Currency, InMemoryCurrency, ManualClock, Timestamp};
//!
//! const DAY: u64 = 86_400;
//! let issuer = AccountId(0);
//! let investor = AccountId(1);
//! let escrow = AccountId(99);
//!
//! let currency = Arc::new(InMemoryCurrency::new());
//! let clock = Arc::new(ManualClock::new(Timestamp(0)));
//! let terms = BondTerms {
//!     name: "Corporate Bond 2027".into(),
//!     symbol: "CB27".into(),
//!     issuer,
//!     notional: 100,
//!     apr_basis_points: 400,
//!     coupon_frequency_secs: 90 * DAY,
//!     maturity: Timestamp(360 * DAY),
//!     cap: 10_000,
//!     decimals: 0,
//! };
//! let ledger = BondLedger::new(escrow, terms, currency.clone(), clock.clone()).unwrap();
//!
//! currency.mint(investor, 1_000);
//! currency.approve(investor, escrow, 1_000);
//! ledger.subscribe(investor, 1_000).unwrap();
//! ledger.close_primary_issuance(issuer).unwrap();
//! assert_eq!(ledger.claim_bond(investor).unwrap(), 10);
//!
//! currency.mint(issuer, 10);
//! currency.approve(issuer, escrow, 10);
//! ledger.deposit_coupon(issuer, CouponIndex(1), 10).unwrap();
//! clock.set(Timestamp(90 * DAY));
//! assert_eq!(ledger.claim_coupon(investor, CouponIndex(1)).unwrap(), 10);
//! ```
//!
//! ## Thread Safety
//!
//! [`BondLedger`] is `Send + Sync`. Operations are serialized; a currency
//! that calls back into the ledger from inside a transfer is let through
//! and observes state already updated by the outer call.

mod base;
mod clock;
pub mod coupon;
mod currency;
mod default_monitor;
pub mod error;
mod events;
pub mod fixed_point;
mod issuance;
mod ledger;
mod redemption;
mod schedule;
mod state;
mod subscription;
mod terms;

pub use base::{AccountId, Amount, CouponIndex, Timestamp};
pub use clock::{Clock, ManualClock, SystemClock};
pub use coupon::{BASIS_POINTS, YEAR_SECONDS};
pub use currency::{Currency, CurrencyError, InMemoryCurrency};
pub use default_monitor::{DefaultRecord, GRACE_PERIOD_SECS};
pub use error::{BondError, ErrorKind};
pub use events::{EventKind, EventLog, LedgerEvent};
pub use fixed_point::MAX_DECIMALS;
pub use issuance::{principal_of, units_for};
pub use ledger::{BondLedger, Position};
pub use schedule::CouponSchedule;
pub use state::{BondSnapshot, CouponSummary};
pub use terms::BondTerms;
