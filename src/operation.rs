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

//! Typed requests accepted by the engine and the results it returns.
//!
//! Requests arrive already parsed by a gateway: accounts are resolved to an
//! [`AccountId`] and amounts are exact decimals. The engine still quantizes
//! amounts and checks external ids itself.

use crate::base::{AccountId, Currency, OperationId};
use crate::transaction::{Transaction, TransactionKind, TransactionStatus};
use rust_decimal::Decimal;
use serde::Serialize;

/// Place a hold on an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizeRequest {
    /// Caller-supplied idempotency key; generated when absent.
    pub operation_id: Option<OperationId>,
    pub account_id: AccountId,
    pub amount: Decimal,
    pub currency: Currency,
    pub description: Option<String>,
}

/// Settle part or all of a hold. `amount` defaults to the authorized amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub operation_id: OperationId,
    pub amount: Option<Decimal>,
}

/// Release a hold without settling it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoidRequest {
    pub operation_id: OperationId,
}

/// Return captured funds. `amount` defaults to the captured amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundRequest {
    pub operation_id: OperationId,
    /// Raw processor reference; must be exactly 22 characters.
    pub external_id: String,
    pub amount: Option<Decimal>,
}

/// Single entry point for gateways that dispatch on operation type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Authorize(AuthorizeRequest),
    Capture(CaptureRequest),
    Void(VoidRequest),
    Refund(RefundRequest),
}

impl Operation {
    pub fn kind(&self) -> TransactionKind {
        match self {
            Self::Authorize(_) => TransactionKind::Authorize,
            Self::Capture(_) => TransactionKind::Capture,
            Self::Void(_) => TransactionKind::Void,
            Self::Refund(_) => TransactionKind::Refund,
        }
    }

    /// The referenced operation id, if the request carries one.
    pub fn operation_id(&self) -> Option<&OperationId> {
        match self {
            Self::Authorize(request) => request.operation_id.as_ref(),
            Self::Capture(request) => Some(&request.operation_id),
            Self::Void(request) => Some(&request.operation_id),
            Self::Refund(request) => Some(&request.operation_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizeResult {
    pub operation_id: OperationId,
    pub account_id: AccountId,
    pub amount: Decimal,
    pub currency: Currency,
    /// Always `AUTHORIZED`, including on replay after the hold was settled.
    pub status: TransactionStatus,
}

impl From<&Transaction> for AuthorizeResult {
    fn from(record: &Transaction) -> Self {
        Self {
            operation_id: record.operation_id.clone(),
            account_id: record.account_id,
            amount: record.amount,
            currency: record.currency,
            status: TransactionStatus::Authorized,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureResult {
    pub operation_id: OperationId,
    pub account_id: AccountId,
    pub amount_captured: Decimal,
    pub status: TransactionStatus,
}

impl CaptureResult {
    pub(crate) fn new(capture: &Transaction, authorization: &OperationId) -> Self {
        Self {
            operation_id: authorization.clone(),
            account_id: capture.account_id,
            amount_captured: capture.amount,
            status: TransactionStatus::Captured,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoidResult {
    pub operation_id: OperationId,
    pub account_id: AccountId,
    pub amount_released: Decimal,
    pub status: TransactionStatus,
}

impl VoidResult {
    pub(crate) fn new(void: &Transaction, authorization: &OperationId) -> Self {
        Self {
            operation_id: authorization.clone(),
            account_id: void.account_id,
            amount_released: void.amount,
            status: TransactionStatus::Voided,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundResult {
    pub operation_id: OperationId,
    pub refund_operation_id: OperationId,
    pub account_id: AccountId,
    pub amount_refunded: Decimal,
    pub status: TransactionStatus,
}

impl RefundResult {
    pub(crate) fn new(refund: &Transaction, authorization: &OperationId) -> Self {
        Self {
            operation_id: authorization.clone(),
            refund_operation_id: refund.operation_id.clone(),
            account_id: refund.account_id,
            amount_refunded: refund.amount,
            status: TransactionStatus::Refunded,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Outcome {
    Authorized(AuthorizeResult),
    Captured(CaptureResult),
    Voided(VoidResult),
    Refunded(RefundResult),
}

impl Outcome {
    pub fn operation_id(&self) -> &OperationId {
        match self {
            Self::Authorized(result) => &result.operation_id,
            Self::Captured(result) => &result.operation_id,
            Self::Voided(result) => &result.operation_id,
            Self::Refunded(result) => &result.operation_id,
        }
    }

    pub fn account_id(&self) -> AccountId {
        match self {
            Self::Authorized(result) => result.account_id,
            Self::Captured(result) => result.account_id,
            Self::Voided(result) => result.account_id,
            Self::Refunded(result) => result.account_id,
        }
    }
}
