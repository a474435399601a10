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

//! The external fungible currency the bond is denominated in.
//!
//! The ledger only ever pulls (`transfer_from`) or pushes (`transfer`)
//! funds at the moment of an operation. Implementations are untrusted:
//! they may fail, and they may call back into the ledger.
//!
//! # Example
//!
//! ```
//! use bond_ledger_rs::{AccountId, Currency, InMemoryCurrency};
//!
//! let coin = InMemoryCurrency::new();
//! coin.mint(AccountId(1), 500);
//! coin.approve(AccountId(1), AccountId(99), 200);
//! coin.transfer_from(AccountId(99), AccountId(1), AccountId(99), 200).unwrap();
//! assert_eq!(coin.balance_of(AccountId(99)), 200);
//! ```

use crate::base::{AccountId, Amount};
use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;

/// Rejections raised by a currency implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CurrencyError {
    #[error("insufficient balance for {account}: has {balance}, needs {needed}")]
    InsufficientBalance {
        account: AccountId,
        balance: Amount,
        needed: Amount,
    },

    #[error("insufficient allowance from {owner} to {spender}: has {allowance}, needs {needed}")]
    InsufficientAllowance {
        owner: AccountId,
        spender: AccountId,
        allowance: Amount,
        needed: Amount,
    },

    #[error("transfer rejected: {0}")]
    Rejected(String),
}

/// Balance-holding currency with transfer/approve semantics.
pub trait Currency: Send + Sync {
    /// Moves `amount` from `owner` to `recipient`, spending `spender`'s
    /// allowance from `owner`.
    fn transfer_from(
        &self,
        spender: AccountId,
        owner: AccountId,
        recipient: AccountId,
        amount: Amount,
    ) -> Result<(), CurrencyError>;

    /// Moves `amount` from `sender` to `recipient`.
    fn transfer(
        &self,
        sender: AccountId,
        recipient: AccountId,
        amount: Amount,
    ) -> Result<(), CurrencyError>;

    fn balance_of(&self, account: AccountId) -> Amount;

    /// Sets `spender`'s allowance over `owner`'s funds to `amount`.
    fn approve(&self, owner: AccountId, spender: AccountId, amount: Amount);

    fn allowance(&self, owner: AccountId, spender: AccountId) -> Amount;
}

#[derive(Debug, Default)]
struct Book {
    balances: HashMap<AccountId, Amount>,
    allowances: HashMap<(AccountId, AccountId), Amount>,
    total_supply: Amount,
}

impl Book {
    fn move_funds(
        &mut self,
        sender: AccountId,
        recipient: AccountId,
        amount: Amount,
    ) -> Result<(), CurrencyError> {
        let balance = self.balances.get(&sender).copied().unwrap_or(0);
        if balance < amount {
            return Err(CurrencyError::InsufficientBalance {
                account: sender,
                balance,
                needed: amount,
            });
        }
        self.balances.insert(sender, balance - amount);
        // Cannot overflow: every balance is bounded by total_supply.
        *self.balances.entry(recipient).or_insert(0) += amount;
        Ok(())
    }
}

/// In-process stable coin.
///
/// All state sits behind one lock so a transfer debits and credits
/// atomically. Zero-amount transfers succeed without effect.
#[derive(Debug, Default)]
pub struct InMemoryCurrency {
    inner: Mutex<Book>,
}

impl InMemoryCurrency {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `amount` new units in `account`.
    ///
    /// Saturates at `u128::MAX` total supply.
    pub fn mint(&self, account: AccountId, amount: Amount) {
        let mut book = self.inner.lock();
        let amount = amount.min(Amount::MAX - book.total_supply);
        book.total_supply += amount;
        *book.balances.entry(account).or_insert(0) += amount;
    }

    pub fn total_supply(&self) -> Amount {
        self.inner.lock().total_supply
    }
}

impl Currency for InMemoryCurrency {
    fn transfer_from(
        &self,
        spender: AccountId,
        owner: AccountId,
        recipient: AccountId,
        amount: Amount,
    ) -> Result<(), CurrencyError> {
        if amount == 0 {
            return Ok(());
        }
        let mut book = self.inner.lock();
        let allowance = book
            .allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or(0);
        if allowance < amount {
            return Err(CurrencyError::InsufficientAllowance {
                owner,
                spender,
                allowance,
                needed: amount,
            });
        }
        book.move_funds(owner, recipient, amount)?;
        book.allowances.insert((owner, spender), allowance - amount);
        Ok(())
    }

    fn transfer(
        &self,
        sender: AccountId,
        recipient: AccountId,
        amount: Amount,
    ) -> Result<(), CurrencyError> {
        if amount == 0 {
            return Ok(());
        }
        self.inner.lock().move_funds(sender, recipient, amount)
    }

    fn balance_of(&self, account: AccountId) -> Amount {
        self.inner
            .lock()
            .balances
            .get(&account)
            .copied()
            .unwrap_or(0)
    }

    fn approve(&self, owner: AccountId, spender: AccountId, amount: Amount) {
        self.inner.lock().allowances.insert((owner, spender), amount);
    }

    fn allowance(&self, owner: AccountId, spender: AccountId) -> Amount {
        self.inner
            .lock()
            .allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or(0)
    }
}
