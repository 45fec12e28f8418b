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

//! # Card Ledger
//!
//! This library provides the funds ledger of a card-payment processor:
//! authorize (hold) funds on an account, capture all or part of the hold,
//! void it, and refund a capture.
//!
//! ## Core Components
//!
//! - [`Engine`]: Applies operations with idempotent replay and retries
//! - [`AccountBalance`]: Balance and held funds of one account
//! - [`Transaction`]: Journal record and the [`TransactionStatus`] state machine
//! - [`LedgerStore`]: Persistence boundary, with [`InMemoryStore`] as the default
//! - [`LedgerError`]: Typed failures for every rejected operation
//!
//! ## Example
//!
//! ```
//! use card_ledger::{
//!     AccountId, AuthorizeRequest, CaptureRequest, Currency, Engine, OperationId,
//!     TransactionStatus,
//! };
//! use rust_decimal_macros::dec;
//!
//! let engine = Engine::new();
//! let usd = Currency::parse("USD").unwrap();
//! engine.open_account(AccountId(1), usd, dec!(500.00)).unwrap();
//!
//! // Hold $100
//! let auth = engine
//!     .authorize(AuthorizeRequest {
//!         operation_id: Some(OperationId::new("order-1")),
//!         account_id: AccountId(1),
//!         amount: dec!(100.00),
//!         currency: usd,
//!         description: Some("coffee beans".into()),
//!     })
//!     .unwrap();
//! assert_eq!(auth.status, TransactionStatus::Authorized);
//!
//! // Settle the full hold
//! let capture = engine
//!     .capture(CaptureRequest { operation_id: auth.operation_id, amount: None })
//!     .unwrap();
//! assert_eq!(capture.amount_captured, dec!(100.00));
//!
//! let account = engine.account(AccountId(1)).unwrap().unwrap();
//! assert_eq!(account.balance(), dec!(400.00));
//! assert_eq!(account.held(), dec!(0));
//! ```
//!
//! ## Thread Safety
//!
//! The engine is `Sync` and meant to be shared across worker threads. It
//! relies entirely on the store's per-account atomicity.

pub mod account;
mod base;
mod engine;
pub mod error;
pub mod journal;
mod memory;
pub mod money;
mod operation;
pub mod store;
mod transaction;

pub use account::AccountBalance;
pub use base::{AccountId, Currency, ExternalId, OperationId};
pub use engine::Engine;
pub use error::{ErrorKind, LedgerError, StoreError};
pub use journal::{Journal, JournalView};
pub use memory::InMemoryStore;
pub use operation::{
    AuthorizeRequest, AuthorizeResult, CaptureRequest, CaptureResult, Operation, Outcome,
    RefundRequest, RefundResult, VoidRequest, VoidResult,
};
pub use store::{LedgerStore, RetryPolicy, UnitOfWork};
pub use transaction::{Transaction, TransactionKind, TransactionStatus};
