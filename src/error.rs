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

//! Error types for bond lifecycle operations.

use crate::base::{AccountId, Amount, CouponIndex, Timestamp};
use crate::currency::CurrencyError;
use thiserror::Error;

/// Coarse classification of a [`BondError`].
///
/// Callers (operator tooling, UIs) can match on the kind to decide how to
/// present a rejection without depending on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Operation called outside its lifecycle phase.
    InvalidState,
    /// Issuer-only operation called by someone else.
    Unauthorized,
    /// Double close, double fund, double claim.
    AlreadyProcessed,
    /// Cap or escrow limit would be exceeded.
    LimitExceeded,
    /// The currency collaborator rejected a pull or push.
    TransferFailed,
    /// Malformed argument or configuration.
    InvalidInput,
    /// Fixed-point arithmetic overflowed.
    Arithmetic,
}

/// Bond lifecycle errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BondError {
    /// Subscription attempted after primary issuance closed
    #[error("primary issuance is closed")]
    IssuanceClosed,

    /// Post-close operation attempted while the offering is open
    #[error("primary issuance is still open")]
    IssuanceOpen,

    /// Redemption attempted before the maturity date
    #[error("not yet mature (maturity {maturity}, now {now})")]
    NotMature { maturity: Timestamp, now: Timestamp },

    /// Coupon claimed before its due date
    #[error("coupon {index} not yet due (due {due}, now {now})")]
    CouponNotDue {
        index: CouponIndex,
        due: Timestamp,
        now: Timestamp,
    },

    /// Coupon claimed before the issuer funded it
    #[error("coupon {index} is not funded")]
    CouponNotFunded { index: CouponIndex },

    /// Index outside `1..=count`
    #[error("coupon index {index} outside schedule of {count} periods")]
    InvalidCouponIndex { index: CouponIndex, count: u32 },

    /// Amount is zero
    #[error("invalid amount (must be positive)")]
    InvalidAmount,

    /// Bond terms failed validation
    #[error("invalid bond terms: {0}")]
    InvalidTerms(String),

    /// Issuer-only operation called by another identity
    #[error("caller {caller} is not the issuer")]
    Unauthorized { caller: AccountId },

    /// Primary issuance already closed
    #[error("primary issuance already closed")]
    AlreadyClosed,

    /// Coupon period already funded
    #[error("coupon {index} already funded")]
    CouponAlreadyFunded { index: CouponIndex },

    /// Coupon already claimed by this investor
    #[error("coupon {index} already claimed by {investor}")]
    CouponAlreadyClaimed {
        investor: AccountId,
        index: CouponIndex,
    },

    /// No pending subscription receipt to convert
    #[error("nothing to claim for {investor}")]
    NothingToClaim { investor: AccountId },

    /// No bond units to redeem
    #[error("no bond units held by {investor}")]
    NothingToRedeem { investor: AccountId },

    /// Subscription would exceed the raise cap
    #[error("subscription of {requested} exceeds remaining cap {remaining}")]
    CapExceeded { requested: Amount, remaining: Amount },

    /// Payout exceeds the escrow bucket that funds it
    #[error("insufficient escrow: required {required}, available {available}")]
    InsufficientEscrow { required: Amount, available: Amount },

    /// Ledger balance debit beyond the account's balance
    #[error("insufficient balance for {account}: has {balance}, requested {requested}")]
    InsufficientBalance {
        account: AccountId,
        balance: Amount,
        requested: Amount,
    },

    /// Currency collaborator rejected the movement
    #[error("currency transfer failed: {0}")]
    TransferFailed(#[from] CurrencyError),

    /// Fixed-point arithmetic overflowed
    #[error("arithmetic overflow")]
    Overflow,
}

impl BondError {
    /// Maps the error onto the coarse taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IssuanceClosed
            | Self::IssuanceOpen
            | Self::NotMature { .. }
            | Self::CouponNotDue { .. }
            | Self::CouponNotFunded { .. } => ErrorKind::InvalidState,
            Self::InvalidCouponIndex { .. } | Self::InvalidAmount | Self::InvalidTerms(_) => {
                ErrorKind::InvalidInput
            }
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::AlreadyClosed
            | Self::CouponAlreadyFunded { .. }
            | Self::CouponAlreadyClaimed { .. }
            | Self::NothingToClaim { .. }
            | Self::NothingToRedeem { .. } => ErrorKind::AlreadyProcessed,
            Self::CapExceeded { .. }
            | Self::InsufficientEscrow { .. }
            | Self::InsufficientBalance { .. } => ErrorKind::LimitExceeded,
            Self::TransferFailed(_) => ErrorKind::TransferFailed,
            Self::Overflow => ErrorKind::Arithmetic,
        }
    }
}
