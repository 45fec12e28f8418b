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

//! Thread-safe transaction journal.
//!
//! Records are keyed by operation id, with two secondary indices: children by
//! `(related_operation_id, kind)` for replay lookups, and per-account
//! insertion order for history queries.

use crate::base::{AccountId, OperationId};
use crate::error::StoreError;
use crate::transaction::{Transaction, TransactionKind};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Read access to committed journal records.
pub trait JournalView {
    fn get(&self, operation_id: &OperationId) -> Option<Transaction>;

    /// The child record of `kind` linked to `parent`, if any.
    fn child(&self, parent: &OperationId, kind: TransactionKind) -> Option<Transaction>;
}

/// Append-mostly store of [`Transaction`] records.
///
/// Inserts use the [`DashMap`] entry API, so the first writer of an
/// operation id wins even across accounts.
#[derive(Debug, Default)]
pub struct Journal {
    records: DashMap<OperationId, Transaction>,
    children: DashMap<(OperationId, TransactionKind), OperationId>,
    by_account: DashMap<AccountId, Vec<OperationId>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the operation id is already taken.
    pub fn insert(&self, record: Transaction) -> Result<(), StoreError> {
        let operation_id = record.operation_id.clone();
        let account_id = record.account_id;
        let child_key = record
            .related_operation_id
            .clone()
            .map(|parent| (parent, record.kind));

        match self.records.entry(operation_id.clone()) {
            Entry::Occupied(_) => return Err(StoreError::Conflict(operation_id)),
            Entry::Vacant(entry) => {
                entry.insert(record);
            }
        }
        if let Some(key) = child_key {
            self.children.insert(key, operation_id.clone());
        }
        self.by_account.entry(account_id).or_default().push(operation_id);
        Ok(())
    }

    /// Replaces an existing record. Only status changes go through here.
    pub fn update(&self, record: Transaction) {
        if let Some(mut existing) = self.records.get_mut(&record.operation_id) {
            *existing = record;
        }
    }

    /// Drops a record inserted by a unit of work that failed to commit.
    pub(crate) fn remove(&self, operation_id: &OperationId) {
        if let Some((_, record)) = self.records.remove(operation_id) {
            if let Some(parent) = record.related_operation_id {
                self.children.remove(&(parent, record.kind));
            }
            if let Some(mut ids) = self.by_account.get_mut(&record.account_id) {
                ids.retain(|id| id != operation_id);
            }
        }
    }

    /// All records of an account in insertion order.
    pub fn history(&self, account_id: AccountId) -> Vec<Transaction> {
        let ids = self
            .by_account
            .get(&account_id)
            .map(|ids| ids.value().clone())
            .unwrap_or_default();
        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl JournalView for Journal {
    fn get(&self, operation_id: &OperationId) -> Option<Transaction> {
        self.records.get(operation_id).map(|r| r.value().clone())
    }

    fn child(&self, parent: &OperationId, kind: TransactionKind) -> Option<Transaction> {
        let child_id = self
            .children
            .get(&(parent.clone(), kind))
            .map(|r| r.value().clone())?;
        self.get(&child_id)
    }
}
