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

//! Ledger engine.
//!
//! The [`Engine`] applies authorize, capture, void and refund operations
//! against a [`LedgerStore`]. Every operation is one unit of work on a single
//! account row:
//!
//! 1. Look the operation id up first. A record that already reflects the
//!    requested transition short-circuits to the stored result, so retried
//!    requests never move money twice.
//! 2. Check the state machine and amount ceilings.
//! 3. Apply the balance change and stage the journal writes.
//!
//! # Thread Safety
//!
//! The engine holds no locks of its own. Same-account operations serialize
//! on the store's row lock; different accounts run in parallel.

use crate::account::AccountBalance;
use crate::base::{AccountId, Currency, ExternalId, OperationId};
use crate::error::LedgerError;
use crate::memory::InMemoryStore;
use crate::money::positive_amount;
use crate::operation::{
    AuthorizeRequest, AuthorizeResult, CaptureRequest, CaptureResult, Operation, Outcome,
    RefundRequest, RefundResult, VoidRequest, VoidResult,
};
use crate::store::{LedgerStore, RetryPolicy, UnitOfWork};
use crate::transaction::{Transaction, TransactionKind, TransactionStatus};
use rust_decimal::Decimal;
use tracing::{debug, error, info, instrument, warn};

/// What a unit of work did.
enum Applied<T> {
    /// The operation had already been applied; nothing was written.
    Replayed(T),
    /// Balance and journal changes were committed. A non-zero `shortfall`
    /// means the held balance had to be clamped at zero.
    Committed { result: T, shortfall: Decimal },
}

/// Card settlement ledger engine.
///
/// # Invariants
///
/// - `0 <= held <= balance` on every account after every commit.
/// - An operation id moves money at most once, however often it is replayed.
/// - A capture never exceeds its authorization; a refund never exceeds its
///   capture; an authorization is refunded at most once.
pub struct Engine<S = InMemoryStore> {
    store: S,
    retry: RetryPolicy,
}

impl Engine<InMemoryStore> {
    /// Creates an engine over an empty in-memory store.
    pub fn new() -> Self {
        Self::with_store(InMemoryStore::new())
    }

    /// Opens an account in the in-memory store.
    pub fn open_account(
        &self,
        account_id: AccountId,
        currency: Currency,
        opening_balance: Decimal,
    ) -> Result<AccountBalance, LedgerError> {
        self.store.open_account(account_id, currency, opening_balance)
    }
}

impl Default for Engine<InMemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: LedgerStore> Engine<S> {
    pub fn with_store(store: S) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Dispatches an [`Operation`] to the matching entry point.
    pub fn process(&self, operation: Operation) -> Result<Outcome, LedgerError> {
        match operation {
            Operation::Authorize(request) => self.authorize(request).map(Outcome::Authorized),
            Operation::Capture(request) => self.capture(request).map(Outcome::Captured),
            Operation::Void(request) => self.void(request).map(Outcome::Voided),
            Operation::Refund(request) => self.refund(request).map(Outcome::Refunded),
        }
    }

    /// Places a hold of `amount` on the account.
    ///
    /// Replaying an existing operation id with the same account, amount and
    /// currency returns the stored authorization without a second hold.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - Amount is not positive after rounding.
    /// - [`LedgerError::AccountNotFound`] - Unknown account.
    /// - [`LedgerError::CurrencyMismatch`] - Currency differs from the account's.
    /// - [`LedgerError::InsufficientFunds`] - Amount exceeds `balance - held`.
    /// - [`LedgerError::OperationConflict`] - Operation id reused with another payload.
    #[instrument(skip(self, request), fields(account_id = %request.account_id))]
    pub fn authorize(&self, request: AuthorizeRequest) -> Result<AuthorizeResult, LedgerError> {
        let AuthorizeRequest {
            operation_id,
            account_id,
            amount,
            currency,
            description,
        } = request;
        let amount = positive_amount(amount)?;
        let operation_id = operation_id.unwrap_or_else(OperationId::generate);

        let applied = self.run(account_id, |unit| {
            if let Some(existing) = unit.find(&operation_id) {
                let same_request = existing.kind == TransactionKind::Authorize
                    && existing.account_id == account_id
                    && existing.amount == amount
                    && existing.currency == currency;
                if !same_request {
                    return Err(LedgerError::OperationConflict(operation_id.clone()));
                }
                return Ok(Applied::Replayed(AuthorizeResult::from(&existing)));
            }

            if unit.account().currency() != currency {
                return Err(LedgerError::CurrencyMismatch);
            }
            unit.account_mut().hold(amount)?;

            let record = Transaction::authorization(
                operation_id.clone(),
                account_id,
                amount,
                currency,
                description.clone(),
            );
            let result = AuthorizeResult::from(&record);
            unit.insert(record);
            Ok(Applied::Committed {
                result,
                shortfall: Decimal::ZERO,
            })
        })?;

        self.finish(TransactionKind::Authorize, account_id, &operation_id, applied)
    }

    /// Settles an authorization, charging `amount` (default: the full
    /// authorized amount) and releasing the rest of the hold.
    ///
    /// Capturing an already captured authorization returns the original
    /// capture without touching balances.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - Amount is not positive after rounding.
    /// - [`LedgerError::TransactionNotFound`] - Unknown operation id.
    /// - [`LedgerError::InvalidState`] - Authorization was voided.
    /// - [`LedgerError::AmountExceedsAuthorized`] - Amount above the hold.
    /// - [`LedgerError::ConsistencyViolation`] - Held balance was clamped; the
    ///   capture itself is committed.
    #[instrument(skip(self, request), fields(operation_id = %request.operation_id))]
    pub fn capture(&self, request: CaptureRequest) -> Result<CaptureResult, LedgerError> {
        let requested = request.amount.map(positive_amount).transpose()?;
        let operation_id = request.operation_id;
        let account_id = self.locate(&operation_id)?;

        let applied = self.run(account_id, |unit| {
            let authorization =
                authorization_of(unit, &operation_id, TransactionKind::Capture)?;
            let parent_id = &authorization.operation_id;

            if matches!(
                authorization.status,
                TransactionStatus::Captured | TransactionStatus::Refunded
            ) {
                let capture = child_of(unit, parent_id, TransactionKind::Capture)?;
                return Ok(Applied::Replayed(CaptureResult::new(&capture, parent_id)));
            }

            let status = authorization.status.transition(TransactionKind::Capture)?;
            let amount = requested.unwrap_or(authorization.amount);
            if amount > authorization.amount {
                return Err(LedgerError::AmountExceedsAuthorized {
                    requested: amount,
                    authorized: authorization.amount,
                });
            }

            let shortfall = unit.account_mut().capture(authorization.amount, amount);
            let capture =
                Transaction::child_of(&authorization, TransactionKind::Capture, amount, None);
            let result = CaptureResult::new(&capture, parent_id);
            unit.insert(capture);
            unit.update(authorization.with_status(status));
            Ok(Applied::Committed { result, shortfall })
        })?;

        self.finish(TransactionKind::Capture, account_id, &operation_id, applied)
    }

    /// Releases an authorization's hold without charging it.
    ///
    /// Voiding an already voided authorization returns the original void.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::TransactionNotFound`] - Unknown operation id.
    /// - [`LedgerError::InvalidState`] - Authorization was captured or refunded.
    /// - [`LedgerError::ConsistencyViolation`] - Held balance was clamped; the
    ///   void itself is committed.
    #[instrument(skip(self, request), fields(operation_id = %request.operation_id))]
    pub fn void(&self, request: VoidRequest) -> Result<VoidResult, LedgerError> {
        let operation_id = request.operation_id;
        let account_id = self.locate(&operation_id)?;

        let applied = self.run(account_id, |unit| {
            let authorization = authorization_of(unit, &operation_id, TransactionKind::Void)?;
            let parent_id = &authorization.operation_id;

            if authorization.status == TransactionStatus::Voided {
                let void = child_of(unit, parent_id, TransactionKind::Void)?;
                return Ok(Applied::Replayed(VoidResult::new(&void, parent_id)));
            }

            let status = authorization.status.transition(TransactionKind::Void)?;
            let shortfall = unit.account_mut().release(authorization.amount);
            let void = Transaction::child_of(
                &authorization,
                TransactionKind::Void,
                authorization.amount,
                None,
            );
            let result = VoidResult::new(&void, parent_id);
            unit.insert(void);
            unit.update(authorization.with_status(status));
            Ok(Applied::Committed { result, shortfall })
        })?;

        self.finish(TransactionKind::Void, account_id, &operation_id, applied)
    }

    /// Returns captured funds to the account, `amount` defaulting to the full
    /// captured amount. `operation_id` may name the authorization or its
    /// capture record.
    ///
    /// An authorization is refunded at most once; replays return the existing
    /// refund record.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidExternalId`] - External id is not 22 characters.
    /// - [`LedgerError::InvalidAmount`] - Amount is not positive after rounding.
    /// - [`LedgerError::TransactionNotFound`] - Unknown operation id.
    /// - [`LedgerError::InvalidState`] - Authorization is not captured.
    /// - [`LedgerError::AmountExceedsCaptured`] - Amount above the capture.
    #[instrument(skip(self, request), fields(operation_id = %request.operation_id))]
    pub fn refund(&self, request: RefundRequest) -> Result<RefundResult, LedgerError> {
        let external_id = ExternalId::parse(&request.external_id)?;
        let requested = request.amount.map(positive_amount).transpose()?;
        let operation_id = request.operation_id;
        let account_id = self.locate(&operation_id)?;

        let applied = self.run(account_id, |unit| {
            let authorization = authorization_of(unit, &operation_id, TransactionKind::Refund)?;
            let parent_id = &authorization.operation_id;

            if let Some(refund) = unit.find_child(parent_id, TransactionKind::Refund) {
                return Ok(Applied::Replayed(RefundResult::new(&refund, parent_id)));
            }

            let status = authorization.status.transition(TransactionKind::Refund)?;
            let capture = child_of(unit, parent_id, TransactionKind::Capture)?;
            let amount = requested.unwrap_or(capture.amount);
            if amount > capture.amount {
                return Err(LedgerError::AmountExceedsCaptured {
                    requested: amount,
                    captured: capture.amount,
                });
            }

            // Refunded funds go back to the account balance only; there is
            // no payout leg.
            unit.account_mut().credit(amount);
            let refund = Transaction::child_of(
                &authorization,
                TransactionKind::Refund,
                amount,
                Some(external_id.clone()),
            );
            let result = RefundResult::new(&refund, parent_id);
            unit.insert(refund);
            unit.update(authorization.with_status(status));
            Ok(Applied::Committed {
                result,
                shortfall: Decimal::ZERO,
            })
        })?;

        self.finish(TransactionKind::Refund, account_id, &operation_id, applied)
    }

    /// Balance snapshot of an account.
    pub fn account(&self, account_id: AccountId) -> Result<Option<AccountBalance>, LedgerError> {
        self.store.account(account_id)
    }

    /// Journal record for an operation id.
    pub fn transaction(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<Transaction>, LedgerError> {
        self.store.transaction(operation_id)
    }

    /// All journal records of an account in insertion order.
    pub fn history(&self, account_id: AccountId) -> Result<Vec<Transaction>, LedgerError> {
        self.store.history(account_id)
    }

    /// Finds the account an existing operation belongs to.
    fn locate(&self, operation_id: &OperationId) -> Result<AccountId, LedgerError> {
        self.store
            .transaction(operation_id)?
            .map(|record| record.account_id)
            .ok_or_else(|| LedgerError::TransactionNotFound(operation_id.clone()))
    }

    /// Runs a unit of work, re-running it from the top on transient store
    /// conflicts so the idempotency lookup always sees the latest state.
    fn run<T>(
        &self,
        account_id: AccountId,
        mut work: impl FnMut(&mut UnitOfWork<'_>) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut attempt = 1;
        loop {
            match self.store.transact(account_id, &mut work) {
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts() => {
                    warn!(attempt, error = %e, "transient store conflict, re-running unit of work");
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    fn finish<T>(
        &self,
        kind: TransactionKind,
        account_id: AccountId,
        operation_id: &OperationId,
        applied: Applied<T>,
    ) -> Result<T, LedgerError> {
        match applied {
            Applied::Replayed(result) => {
                debug!(%kind, %operation_id, "already applied, no balance change");
                Ok(result)
            }
            Applied::Committed { shortfall, .. } if shortfall > Decimal::ZERO => {
                error!(
                    %kind,
                    %account_id,
                    %operation_id,
                    %shortfall,
                    "held balance would have gone negative and was clamped to zero"
                );
                Err(LedgerError::ConsistencyViolation {
                    account_id,
                    operation_id: operation_id.clone(),
                    shortfall,
                })
            }
            Applied::Committed { result, .. } => {
                info!(%kind, %account_id, %operation_id, "committed");
                Ok(result)
            }
        }
    }
}

/// Resolves `operation_id` to its authorization record. A refund may also
/// name the capture record, which is followed back to its authorization.
fn authorization_of(
    unit: &UnitOfWork<'_>,
    operation_id: &OperationId,
    attempted: TransactionKind,
) -> Result<Transaction, LedgerError> {
    let record = unit
        .find(operation_id)
        .ok_or_else(|| LedgerError::TransactionNotFound(operation_id.clone()))?;
    match (record.kind, &record.related_operation_id) {
        (TransactionKind::Authorize, _) => Ok(record),
        (TransactionKind::Capture, Some(parent)) if attempted == TransactionKind::Refund => unit
            .find(parent)
            .ok_or_else(|| LedgerError::TransactionNotFound(parent.clone())),
        _ => Err(LedgerError::InvalidState {
            attempted,
            status: record.status,
        }),
    }
}

fn child_of(
    unit: &UnitOfWork<'_>,
    parent: &OperationId,
    kind: TransactionKind,
) -> Result<Transaction, LedgerError> {
    unit.find_child(parent, kind)
        .ok_or_else(|| LedgerError::TransactionNotFound(parent.clone()))
}
