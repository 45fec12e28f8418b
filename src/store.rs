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

//! Persistence boundary.
//!
//! The engine never touches storage directly. It hands a closure to
//! [`LedgerStore::transact`], which runs it against a working copy of one
//! account row plus read access to the journal, and commits the account and
//! every staged journal write together, or nothing at all.

use crate::account::AccountBalance;
use crate::base::{AccountId, OperationId};
use crate::error::LedgerError;
use crate::journal::JournalView;
use crate::transaction::{Transaction, TransactionKind};

/// Atomic read-modify-write over an account row and the journal.
pub trait LedgerStore: Send + Sync {
    /// Runs `work` while holding exclusive access to `account_id`.
    ///
    /// Changes staged in the [`UnitOfWork`] are committed only if `work`
    /// returns `Ok`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AccountNotFound`] if the account does not exist.
    /// - [`LedgerError::Storage`] on a failed commit. A
    ///   [`StoreError::Conflict`](crate::StoreError::Conflict) means nothing
    ///   was written and the unit may be re-run.
    /// - Whatever `work` itself returns.
    fn transact<T, F>(&self, account_id: AccountId, work: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut UnitOfWork<'_>) -> Result<T, LedgerError>;

    fn account(&self, account_id: AccountId) -> Result<Option<AccountBalance>, LedgerError>;

    fn transaction(&self, operation_id: &OperationId) -> Result<Option<Transaction>, LedgerError>;

    /// All journal records of an account in insertion order.
    fn history(&self, account_id: AccountId) -> Result<Vec<Transaction>, LedgerError>;
}

/// Staged changes of one [`LedgerStore::transact`] call.
pub struct UnitOfWork<'a> {
    account: AccountBalance,
    journal: &'a dyn JournalView,
    inserts: Vec<Transaction>,
    updates: Vec<Transaction>,
}

impl<'a> UnitOfWork<'a> {
    pub fn new(account: AccountBalance, journal: &'a dyn JournalView) -> Self {
        Self {
            account,
            journal,
            inserts: Vec::new(),
            updates: Vec::new(),
        }
    }

    pub fn account(&self) -> &AccountBalance {
        &self.account
    }

    pub fn account_mut(&mut self) -> &mut AccountBalance {
        &mut self.account
    }

    /// Looks up a record, seeing this unit's own staged writes first.
    pub fn find(&self, operation_id: &OperationId) -> Option<Transaction> {
        self.staged()
            .find(|record| &record.operation_id == operation_id)
            .cloned()
            .or_else(|| self.journal.get(operation_id))
    }

    /// Looks up the child of `kind` linked to `parent`.
    pub fn find_child(&self, parent: &OperationId, kind: TransactionKind) -> Option<Transaction> {
        self.inserts
            .iter()
            .find(|record| {
                record.kind == kind && record.related_operation_id.as_ref() == Some(parent)
            })
            .cloned()
            .or_else(|| self.journal.child(parent, kind))
    }

    pub fn insert(&mut self, record: Transaction) {
        self.inserts.push(record);
    }

    pub fn update(&mut self, record: Transaction) {
        self.updates.push(record);
    }

    /// Splits the unit into the account row, new records and updated records.
    pub fn into_parts(self) -> (AccountBalance, Vec<Transaction>, Vec<Transaction>) {
        (self.account, self.inserts, self.updates)
    }

    fn staged(&self) -> impl Iterator<Item = &Transaction> {
        self.updates.iter().rev().chain(self.inserts.iter().rev())
    }
}

/// How many times a unit of work is attempted when the store reports a
/// transient conflict. Business failures are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// At least one attempt is always made.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS)
    }
}
