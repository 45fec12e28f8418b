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

//! Error types for ledger operations.
//!
//! [`LedgerError`] covers business rule violations, which are never retried,
//! plus a single [`LedgerError::Storage`] variant for persistence faults.

use crate::base::{AccountId, OperationId};
use crate::transaction::{TransactionKind, TransactionStatus};
use rust_decimal::Decimal;
use thiserror::Error;

/// Failures raised by the persistence boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A concurrent writer won the race; the unit of work may be re-run.
    #[error("write conflict on operation {0}")]
    Conflict(OperationId),

    /// The backing store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether re-running the unit of work may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Coarse classification of a [`LedgerError`], for gateways that map
/// failures to protocol responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    InsufficientFunds,
    AmountExceedsAuthorized,
    AmountExceedsCaptured,
    InvalidAmount,
    InvalidExternalId,
    InvalidRequest,
    Conflict,
    ConsistencyViolation,
    Infrastructure,
}

/// Ledger operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Referenced account does not exist
    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    /// Referenced operation does not exist
    #[error("transaction {0} not found")]
    TransactionNotFound(OperationId),

    /// The transaction's current status does not permit the operation
    #[error("cannot {attempted} a transaction in status {status}")]
    InvalidState {
        attempted: TransactionKind,
        status: TransactionStatus,
    },

    /// Authorization exceeds `balance - held_balance`
    #[error("insufficient available funds")]
    InsufficientFunds,

    /// Capture amount above the authorized amount
    #[error("capture amount {requested} exceeds authorized amount {authorized}")]
    AmountExceedsAuthorized {
        requested: Decimal,
        authorized: Decimal,
    },

    /// Refund amount above the captured amount
    #[error("refund amount {requested} exceeds captured amount {captured}")]
    AmountExceedsCaptured { requested: Decimal, captured: Decimal },

    /// Amount is zero, negative, or rounds to zero
    #[error("invalid amount (must be positive)")]
    InvalidAmount,

    /// Missing or wrong-length external id on a refund
    #[error("external id must be exactly 22 characters")]
    InvalidExternalId,

    /// Currency code is not three ASCII letters
    #[error("invalid currency code")]
    InvalidCurrency,

    /// Authorization currency differs from the account currency
    #[error("currency does not match the account currency")]
    CurrencyMismatch,

    /// Operation id reused with a different payload
    #[error("operation {0} already exists with different parameters")]
    OperationConflict(OperationId),

    /// A release would have driven the held balance negative. The write was
    /// committed with the held balance clamped to zero.
    #[error(
        "consistency violation on account {account_id} during {operation_id}: held balance short by {shortfall}"
    )]
    ConsistencyViolation {
        account_id: AccountId,
        operation_id: OperationId,
        shortfall: Decimal,
    },

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AccountNotFound(_) | Self::TransactionNotFound(_) => ErrorKind::NotFound,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::InsufficientFunds => ErrorKind::InsufficientFunds,
            Self::AmountExceedsAuthorized { .. } => ErrorKind::AmountExceedsAuthorized,
            Self::AmountExceedsCaptured { .. } => ErrorKind::AmountExceedsCaptured,
            Self::InvalidAmount => ErrorKind::InvalidAmount,
            Self::InvalidExternalId => ErrorKind::InvalidExternalId,
            Self::InvalidCurrency | Self::CurrencyMismatch => ErrorKind::InvalidRequest,
            Self::OperationConflict(_) => ErrorKind::Conflict,
            Self::ConsistencyViolation { .. } => ErrorKind::ConsistencyViolation,
            Self::Storage(_) => ErrorKind::Infrastructure,
        }
    }

    /// Stable, machine-readable code. Never carries storage detail.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AccountNotFound(_) => "account_not_found",
            Self::TransactionNotFound(_) => "transaction_not_found",
            Self::InvalidState { .. } => "invalid_state",
            Self::InsufficientFunds => "insufficient_funds",
            Self::AmountExceedsAuthorized { .. } => "amount_exceeds_authorized",
            Self::AmountExceedsCaptured { .. } => "amount_exceeds_captured",
            Self::InvalidAmount => "invalid_amount",
            Self::InvalidExternalId => "invalid_external_id",
            Self::InvalidCurrency => "invalid_currency",
            Self::CurrencyMismatch => "currency_mismatch",
            Self::OperationConflict(_) => "operation_conflict",
            Self::ConsistencyViolation { .. } => "consistency_violation",
            Self::Storage(_) => "ledger_unavailable",
        }
    }

    /// Whether the persistence boundary may re-run the unit of work.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_transient())
    }
}
