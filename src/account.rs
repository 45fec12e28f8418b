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

//! Account balance bookkeeping.
//!
//! Funds sit in three conceptual slots: free (`balance - held`), held, and
//! spent (gone from `balance`). Every ledger operation is one transfer:
//!
//! ```text
//!  free ──authorize──► held ──capture──► spent
//!   ▲                   │                  │
//!   └──────void─────────┘                  │
//!   └──────────────────refund──────────────┘
//! ```
//!
//! Only [`AccountBalance::hold`] is guarded against available funds. The
//! release paths never fail; if a release would take `held` below zero it is
//! clamped and the shortfall is returned so the caller can report it.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use card_ledger::{AccountBalance, AccountId, Currency};
//!
//! let account = AccountBalance::new(AccountId(1), Currency::parse("USD").unwrap(), dec!(500.00));
//! assert_eq!(account.available(), dec!(500.00));
//! ```

use crate::base::{AccountId, Currency};
use crate::error::LedgerError;
use crate::money::{DECIMAL_PRECISION, quantize};
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Balance row of one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountBalance {
    account_id: AccountId,
    currency: Currency,
    balance: Decimal,
    held: Decimal,
}

impl AccountBalance {
    pub fn new(account_id: AccountId, currency: Currency, balance: Decimal) -> Self {
        Self {
            account_id,
            currency,
            balance: quantize(balance),
            held: Decimal::ZERO,
        }
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Total funds, including held funds.
    pub fn balance(&self) -> Decimal {
        self.balance
    }

    /// Sum of open authorizations.
    pub fn held(&self) -> Decimal {
        self.held
    }

    /// Returns `balance - held`.
    pub fn available(&self) -> Decimal {
        self.balance - self.held
    }

    /// Whether `0 <= held <= balance`.
    pub fn is_consistent(&self) -> bool {
        self.held >= Decimal::ZERO && self.held <= self.balance
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.is_consistent(),
            "Invariant violated on account {}: held {} balance {}",
            self.account_id,
            self.held,
            self.balance
        );
    }

    /// Moves funds from free to held (authorize).
    pub fn hold(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        if self.available() < amount {
            return Err(LedgerError::InsufficientFunds);
        }
        self.held += amount;
        self.assert_invariants();
        Ok(())
    }

    /// Moves funds from held back to free (void).
    ///
    /// Returns the shortfall when `held` was below `amount`; zero otherwise.
    pub fn release(&mut self, amount: Decimal) -> Decimal {
        let shortfall = self.drain_held(amount);
        self.assert_invariants();
        shortfall
    }

    /// Drops a hold of `authorized` and spends `charge` of it (capture).
    ///
    /// `charge` never exceeds `authorized`; the difference goes back to free.
    ///
    /// Both slots are floored at zero. `held` is clamped when it is smaller
    /// than `authorized`, and `balance` is clamped when `charge` exceeds it,
    /// which leaves the uncovered part of the charge unpaid. Returns the
    /// combined shortfall of both clamps.
    pub fn capture(&mut self, authorized: Decimal, charge: Decimal) -> Decimal {
        debug_assert!(charge <= authorized);
        let mut shortfall = self.drain_held(authorized);
        self.balance -= charge;
        if self.balance < Decimal::ZERO {
            shortfall += -self.balance;
            self.balance = Decimal::ZERO;
        }
        if self.held > self.balance {
            shortfall += self.held - self.balance;
            self.held = self.balance;
        }
        self.assert_invariants();
        shortfall
    }

    /// Moves spent funds back to free (refund).
    pub fn credit(&mut self, amount: Decimal) {
        self.balance += amount;
        self.assert_invariants();
    }

    fn drain_held(&mut self, amount: Decimal) -> Decimal {
        if self.held >= amount {
            self.held -= amount;
            Decimal::ZERO
        } else {
            let shortfall = amount - self.held;
            self.held = Decimal::ZERO;
            shortfall
        }
    }

    #[cfg(test)]
    pub(crate) fn force_held(&mut self, held: Decimal) {
        self.held = held;
    }
}

impl Serialize for AccountBalance {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let fixed = |value: Decimal| {
            let mut value = quantize(value);
            value.rescale(DECIMAL_PRECISION);
            value
        };
        let mut state = serializer.serialize_struct("AccountBalance", 5)?;
        state.serialize_field("account", &self.account_id)?;
        state.serialize_field("currency", &self.currency)?;
        state.serialize_field("balance", &fixed(self.balance))?;
        state.serialize_field("held", &fixed(self.held))?;
        state.serialize_field("available", &fixed(self.available()))?;
        state.end()
    }
}
