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

//! In-memory [`LedgerStore`].
//!
//! Each account row sits behind its own [`Mutex`], which is what serializes
//! operations on the same account. Rows live in a [`DashMap`] so that
//! different accounts never contend.

use crate::account::AccountBalance;
use crate::base::{AccountId, Currency, OperationId};
use crate::error::LedgerError;
use crate::journal::{Journal, JournalView};
use crate::store::{LedgerStore, UnitOfWork};
use crate::transaction::Transaction;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Default)]
pub struct InMemoryStore {
    accounts: DashMap<AccountId, Arc<Mutex<AccountBalance>>>,
    journal: Journal,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an account with an opening balance.
    ///
    /// Account creation belongs to the account-management side, not the
    /// engine. Opening an existing account returns it unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidAmount`] for a negative opening balance.
    pub fn open_account(
        &self,
        account_id: AccountId,
        currency: Currency,
        opening_balance: Decimal,
    ) -> Result<AccountBalance, LedgerError> {
        if opening_balance < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        let slot = self
            .accounts
            .entry(account_id)
            .or_insert_with(|| {
                info!(%account_id, %currency, %opening_balance, "account opened");
                Arc::new(Mutex::new(AccountBalance::new(
                    account_id,
                    currency,
                    opening_balance,
                )))
            })
            .value()
            .clone();
        let snapshot = slot.lock().clone();
        Ok(snapshot)
    }

    /// Snapshots of every account, ordered by id.
    pub fn accounts(&self) -> Vec<AccountBalance> {
        let slots: Vec<_> = self.accounts.iter().map(|r| r.value().clone()).collect();
        let mut accounts: Vec<_> = slots.iter().map(|slot| slot.lock().clone()).collect();
        accounts.sort_by_key(AccountBalance::account_id);
        accounts
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Clones the row handle out so the shard guard is released before the
    /// row is locked.
    fn slot(&self, account_id: AccountId) -> Option<Arc<Mutex<AccountBalance>>> {
        self.accounts.get(&account_id).map(|r| r.value().clone())
    }

    #[cfg(test)]
    pub(crate) fn with_account_mut(
        &self,
        account_id: AccountId,
        f: impl FnOnce(&mut AccountBalance),
    ) {
        if let Some(slot) = self.slot(account_id) {
            let mut row = slot.lock();
            f(&mut row);
        }
    }
}

impl LedgerStore for InMemoryStore {
    fn transact<T, F>(&self, account_id: AccountId, work: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut UnitOfWork<'_>) -> Result<T, LedgerError>,
    {
        let slot = self
            .slot(account_id)
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        let mut row = slot.lock();

        let mut unit = UnitOfWork::new(row.clone(), &self.journal);
        let value = work(&mut unit)?;
        let (account, inserts, updates) = unit.into_parts();

        // Inserts can lose a first-writer race on the operation id, so they
        // go first and are undone if any of them fails.
        let mut committed: Vec<OperationId> = Vec::with_capacity(inserts.len());
        for record in inserts {
            let operation_id = record.operation_id.clone();
            if let Err(e) = self.journal.insert(record) {
                for id in &committed {
                    self.journal.remove(id);
                }
                return Err(e.into());
            }
            committed.push(operation_id);
        }
        for record in updates {
            self.journal.update(record);
        }
        *row = account;
        Ok(value)
    }

    fn account(&self, account_id: AccountId) -> Result<Option<AccountBalance>, LedgerError> {
        Ok(self.slot(account_id).map(|slot| slot.lock().clone()))
    }

    fn transaction(&self, operation_id: &OperationId) -> Result<Option<Transaction>, LedgerError> {
        Ok(self.journal.get(operation_id))
    }

    fn history(&self, account_id: AccountId) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self.journal.history(account_id))
    }
}
