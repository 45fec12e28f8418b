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

//! Journal records and the authorization state machine.
//!
//! An authorization record moves through:
//! - [`Authorized`] → [`Captured`] (via capture) or [`Voided`] (via void)
//! - [`Captured`] → [`Refunded`] (via refund)
//!
//! Capture, void and refund each also append a child record in
//! [`Completed`] status, linked back through `related_operation_id`.
//!
//! [`Authorized`]: TransactionStatus::Authorized
//! [`Captured`]: TransactionStatus::Captured
//! [`Voided`]: TransactionStatus::Voided
//! [`Refunded`]: TransactionStatus::Refunded
//! [`Completed`]: TransactionStatus::Completed

use crate::base::{AccountId, Currency, ExternalId, OperationId};
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Authorize,
    Capture,
    Void,
    Refund,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Authorize => "AUTHORIZE",
            Self::Capture => "CAPTURE",
            Self::Void => "VOID",
            Self::Refund => "REFUND",
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Authorized,
    Captured,
    Voided,
    Refunded,
    /// Status of capture, void and refund child records.
    Completed,
}

impl TransactionStatus {
    /// Returns the status an authorization moves to when `kind` is applied.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidState`] for any transition outside the
    /// state machine, including every transition out of a terminal status.
    pub fn transition(self, kind: TransactionKind) -> Result<Self, LedgerError> {
        match (self, kind) {
            (Self::Authorized, TransactionKind::Capture) => Ok(Self::Captured),
            (Self::Authorized, TransactionKind::Void) => Ok(Self::Voided),
            (Self::Captured, TransactionKind::Refund) => Ok(Self::Refunded),
            (status, attempted) => Err(LedgerError::InvalidState { attempted, status }),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Authorized => "AUTHORIZED",
            Self::Captured => "CAPTURED",
            Self::Voided => "VOIDED",
            Self::Refunded => "REFUNDED",
            Self::Completed => "COMPLETED",
        })
    }
}

/// One journal entry.
///
/// Records are never deleted. The only field that changes after insertion
/// is the status of an authorization (plus its `updated_at`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub operation_id: OperationId,
    pub account_id: AccountId,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub currency: Currency,
    pub description: Option<String>,
    pub external_id: Option<ExternalId>,
    pub related_operation_id: Option<OperationId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// A fresh hold in [`TransactionStatus::Authorized`].
    pub fn authorization(
        operation_id: OperationId,
        account_id: AccountId,
        amount: Decimal,
        currency: Currency,
        description: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            operation_id,
            account_id,
            kind: TransactionKind::Authorize,
            status: TransactionStatus::Authorized,
            amount,
            currency,
            description,
            external_id: None,
            related_operation_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A completed capture/void/refund record pointing back at `parent`.
    pub fn child_of(
        parent: &Transaction,
        kind: TransactionKind,
        amount: Decimal,
        external_id: Option<ExternalId>,
    ) -> Self {
        let now = Utc::now();
        Self {
            operation_id: OperationId::generate(),
            account_id: parent.account_id,
            kind,
            status: TransactionStatus::Completed,
            amount,
            currency: parent.currency,
            description: parent.description.clone(),
            external_id,
            related_operation_id: Some(parent.operation_id.clone()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy of this record moved to `status`.
    pub fn with_status(&self, status: TransactionStatus) -> Self {
        Self {
            status,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }
}
