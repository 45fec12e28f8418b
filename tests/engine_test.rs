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

//! Engine public API integration tests.

use card_ledger::{
    AccountId, AuthorizeRequest, CaptureRequest, Currency, Engine, ErrorKind, LedgerError,
    Operation, OperationId, Outcome, RefundRequest, TransactionKind, TransactionStatus,
    VoidRequest,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const EXTERNAL_ID: &str = "EXT0000000000000000001";

fn usd() -> Currency {
    Currency::parse("USD").unwrap()
}

fn engine_with_account(balance: Decimal) -> Engine {
    let engine = Engine::new();
    engine.open_account(AccountId(1), usd(), balance).unwrap();
    engine
}

fn make_authorize(op: &str, amount: Decimal) -> AuthorizeRequest {
    AuthorizeRequest {
        operation_id: Some(OperationId::new(op)),
        account_id: AccountId(1),
        amount,
        currency: usd(),
        description: None,
    }
}

fn make_capture(op: &str, amount: Option<Decimal>) -> CaptureRequest {
    CaptureRequest {
        operation_id: OperationId::new(op),
        amount,
    }
}

fn make_void(op: &str) -> VoidRequest {
    VoidRequest {
        operation_id: OperationId::new(op),
    }
}

fn make_refund(op: &str, external_id: &str, amount: Option<Decimal>) -> RefundRequest {
    RefundRequest {
        operation_id: OperationId::new(op),
        external_id: external_id.to_owned(),
        amount,
    }
}

fn balances(engine: &Engine) -> (Decimal, Decimal) {
    let account = engine.account(AccountId(1)).unwrap().unwrap();
    (account.balance(), account.held())
}

// =============================================================================
// Authorize
// =============================================================================

#[test]
fn authorize_holds_funds() {
    let engine = engine_with_account(dec!(500.00));
    let result = engine.authorize(make_authorize("op-1", dec!(100.00))).unwrap();

    assert_eq!(result.status, TransactionStatus::Authorized);
    assert_eq!(result.amount, dec!(100.00));
    assert_eq!(result.account_id, AccountId(1));
    assert_eq!(balances(&engine), (dec!(500.00), dec!(100.00)));
}

#[test]
fn authorize_beyond_available_fails() {
    let engine = engine_with_account(dec!(500.00));
    engine.authorize(make_authorize("op-1", dec!(450.00))).unwrap();

    let result = engine.authorize(make_authorize("op-2", dec!(100.00)));
    assert_eq!(result, Err(LedgerError::InsufficientFunds));

    // Only the first hold is recorded
    assert_eq!(balances(&engine), (dec!(500.00), dec!(450.00)));
    assert!(engine.transaction(&OperationId::new("op-2")).unwrap().is_none());
}

#[test]
fn authorize_replay_does_not_hold_twice() {
    let engine = engine_with_account(dec!(500.00));
    let first = engine.authorize(make_authorize("op-1", dec!(100.00))).unwrap();
    let second = engine.authorize(make_authorize("op-1", dec!(100.00))).unwrap();

    assert_eq!(first, second);
    assert_eq!(balances(&engine), (dec!(500.00), dec!(100.00)));
}

#[test]
fn authorize_replay_after_settlement_returns_original_result() {
    let engine = engine_with_account(dec!(500.00));
    let first = engine.authorize(make_authorize("op-1", dec!(100.00))).unwrap();
    engine.capture(make_capture("op-1", None)).unwrap();

    let replay = engine.authorize(make_authorize("op-1", dec!(100.00)));
    assert_eq!(replay, Ok(first.clone()));

    engine.refund(make_refund("op-1", EXTERNAL_ID, None)).unwrap();
    let replay = engine.authorize(make_authorize("op-1", dec!(100.00)));
    assert_eq!(replay, Ok(first));

    // The stored record still moves through the state machine
    let record = engine.transaction(&OperationId::new("op-1")).unwrap().unwrap();
    assert_eq!(record.status, TransactionStatus::Refunded);
    assert_eq!(balances(&engine), (dec!(500.00), dec!(0)));
}

#[test]
fn authorize_replay_after_void_returns_original_result() {
    let engine = engine_with_account(dec!(500.00));
    let first = engine.authorize(make_authorize("op-1", dec!(100.00))).unwrap();
    engine.void(make_void("op-1")).unwrap();

    let replay = engine.authorize(make_authorize("op-1", dec!(100.00))).unwrap();

    assert_eq!(replay, first);
    assert_eq!(replay.status, TransactionStatus::Authorized);
    assert_eq!(balances(&engine), (dec!(500.00), dec!(0)));
}

#[test]
fn authorize_replay_with_different_amount_conflicts() {
    let engine = engine_with_account(dec!(500.00));
    engine.authorize(make_authorize("op-1", dec!(100.00))).unwrap();

    let result = engine.authorize(make_authorize("op-1", dec!(99.00)));
    assert_eq!(result, Err(LedgerError::OperationConflict(OperationId::new("op-1"))));
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Conflict);
}

#[test]
fn authorize_without_operation_id_generates_one() {
    let engine = engine_with_account(dec!(500.00));
    let mut request = make_authorize("unused", dec!(10.00));
    request.operation_id = None;

    let first = engine.authorize(request.clone()).unwrap();
    let second = engine.authorize(request).unwrap();

    assert_ne!(first.operation_id, second.operation_id);
    assert_eq!(balances(&engine), (dec!(500.00), dec!(20.00)));
}

#[test]
fn authorize_rejects_non_positive_amounts() {
    let engine = engine_with_account(dec!(500.00));
    for amount in [dec!(0), dec!(-1.00), dec!(0.004)] {
        assert_eq!(
            engine.authorize(make_authorize("op-1", amount)),
            Err(LedgerError::InvalidAmount)
        );
    }
}

#[test]
fn authorize_rounds_amounts_to_cents() {
    let engine = engine_with_account(dec!(500.00));
    let result = engine.authorize(make_authorize("op-1", dec!(10.006))).unwrap();
    assert_eq!(result.amount, dec!(10.01));
    assert_eq!(balances(&engine).1, dec!(10.01));
}

#[test]
fn authorize_unknown_account_fails() {
    let engine = engine_with_account(dec!(500.00));
    let mut request = make_authorize("op-1", dec!(1.00));
    request.account_id = AccountId(42);

    assert_eq!(
        engine.authorize(request),
        Err(LedgerError::AccountNotFound(AccountId(42)))
    );
}

#[test]
fn authorize_in_other_currency_fails() {
    let engine = engine_with_account(dec!(500.00));
    let mut request = make_authorize("op-1", dec!(1.00));
    request.currency = Currency::parse("KZT").unwrap();

    assert_eq!(engine.authorize(request), Err(LedgerError::CurrencyMismatch));
}

#[test]
fn operation_id_is_unique_across_accounts() {
    let engine = engine_with_account(dec!(500.00));
    engine.open_account(AccountId(2), usd(), dec!(500.00)).unwrap();
    engine.authorize(make_authorize("op-1", dec!(10.00))).unwrap();

    let mut request = make_authorize("op-1", dec!(10.00));
    request.account_id = AccountId(2);
    assert_eq!(
        engine.authorize(request),
        Err(LedgerError::OperationConflict(OperationId::new("op-1")))
    );
    assert_eq!(engine.account(AccountId(2)).unwrap().unwrap().held(), dec!(0));
}

// =============================================================================
// Capture
// =============================================================================

#[test]
fn full_capture_spends_the_hold() {
    let engine = engine_with_account(dec!(500.00));
    engine.authorize(make_authorize("op-1", dec!(100.00))).unwrap();

    let result = engine.capture(make_capture("op-1", None)).unwrap();

    assert_eq!(result.status, TransactionStatus::Captured);
    assert_eq!(result.amount_captured, dec!(100.00));
    assert_eq!(result.operation_id, OperationId::new("op-1"));
    assert_eq!(balances(&engine), (dec!(400.00), dec!(0)));
}

#[test]
fn capture_twice_charges_once() {
    let engine = engine_with_account(dec!(500.00));
    engine.authorize(make_authorize("op-1", dec!(100.00))).unwrap();

    let first = engine.capture(make_capture("op-1", None)).unwrap();
    let second = engine.capture(make_capture("op-1", None)).unwrap();

    assert_eq!(first, second);
    assert_eq!(balances(&engine), (dec!(400.00), dec!(0)));
}

#[test]
fn capture_replay_with_other_amount_returns_original() {
    let engine = engine_with_account(dec!(500.00));
    engine.authorize(make_authorize("op-1", dec!(100.00))).unwrap();
    engine.capture(make_capture("op-1", Some(dec!(30.00)))).unwrap();

    let replay = engine.capture(make_capture("op-1", Some(dec!(100.00)))).unwrap();
    assert_eq!(replay.amount_captured, dec!(30.00));
    assert_eq!(balances(&engine), (dec!(470.00), dec!(0)));
}

#[test]
fn partial_capture_releases_the_remainder() {
    let engine = engine_with_account(dec!(500.00));
    engine.authorize(make_authorize("op-1", dec!(100.00))).unwrap();
    engine.authorize(make_authorize("op-2", dec!(50.00))).unwrap();

    let result = engine.capture(make_capture("op-1", Some(dec!(60.00)))).unwrap();

    assert_eq!(result.amount_captured, dec!(60.00));
    // op-2 stays held; op-1's unused 40.00 is free again.
    assert_eq!(balances(&engine), (dec!(440.00), dec!(50.00)));
}

#[test]
fn capture_above_authorized_fails() {
    let engine = engine_with_account(dec!(500.00));
    engine.authorize(make_authorize("op-1", dec!(100.00))).unwrap();

    let result = engine.capture(make_capture("op-1", Some(dec!(100.01))));
    assert_eq!(
        result,
        Err(LedgerError::AmountExceedsAuthorized {
            requested: dec!(100.01),
            authorized: dec!(100.00),
        })
    );
    assert_eq!(balances(&engine), (dec!(500.00), dec!(100.00)));
}

#[test]
fn capture_unknown_operation_fails() {
    let engine = engine_with_account(dec!(500.00));
    assert_eq!(
        engine.capture(make_capture("nope", None)),
        Err(LedgerError::TransactionNotFound(OperationId::new("nope")))
    );
}

#[test]
fn capture_after_void_fails() {
    let engine = engine_with_account(dec!(500.00));
    engine.authorize(make_authorize("op-1", dec!(100.00))).unwrap();
    engine.void(make_void("op-1")).unwrap();

    let result = engine.capture(make_capture("op-1", None));
    assert_eq!(
        result,
        Err(LedgerError::InvalidState {
            attempted: TransactionKind::Capture,
            status: TransactionStatus::Voided,
        })
    );
    assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(balances(&engine), (dec!(500.00), dec!(0)));
}

#[test]
fn capture_succeeds_when_available_is_exhausted() {
    let engine = engine_with_account(dec!(100.00));
    engine.authorize(make_authorize("op-1", dec!(60.00))).unwrap();
    engine.authorize(make_authorize("op-2", dec!(40.00))).unwrap();
    assert_eq!(engine.account(AccountId(1)).unwrap().unwrap().available(), dec!(0));

    engine.capture(make_capture("op-1", None)).unwrap();
    assert_eq!(balances(&engine), (dec!(40.00), dec!(40.00)));
}

// =============================================================================
// Void
// =============================================================================

#[test]
fn void_restores_held_exactly() {
    let engine = engine_with_account(dec!(500.00));
    engine.authorize(make_authorize("op-0", dec!(0.10))).unwrap();
    let before = balances(&engine);

    engine.authorize(make_authorize("op-1", dec!(33.33))).unwrap();
    let result = engine.void(make_void("op-1")).unwrap();

    assert_eq!(result.status, TransactionStatus::Voided);
    assert_eq!(result.amount_released, dec!(33.33));
    assert_eq!(balances(&engine), before);
}

#[test]
fn void_twice_releases_once() {
    let engine = engine_with_account(dec!(500.00));
    engine.authorize(make_authorize("op-1", dec!(100.00))).unwrap();
    engine.authorize(make_authorize("op-2", dec!(50.00))).unwrap();

    let first = engine.void(make_void("op-1")).unwrap();
    let second = engine.void(make_void("op-1")).unwrap();

    assert_eq!(first, second);
    assert_eq!(balances(&engine), (dec!(500.00), dec!(50.00)));
}

#[test]
fn void_after_capture_fails() {
    let engine = engine_with_account(dec!(500.00));
    engine.authorize(make_authorize("op-1", dec!(100.00))).unwrap();
    engine.capture(make_capture("op-1", None)).unwrap();

    assert_eq!(
        engine.void(make_void("op-1")),
        Err(LedgerError::InvalidState {
            attempted: TransactionKind::Void,
            status: TransactionStatus::Captured,
        })
    );
    assert_eq!(balances(&engine), (dec!(400.00), dec!(0)));
}

// =============================================================================
// Refund
// =============================================================================

#[test]
fn refund_requires_22_character_external_id() {
    let engine = engine_with_account(dec!(500.00));
    engine.authorize(make_authorize("op-1", dec!(100.00))).unwrap();
    engine.capture(make_capture("op-1", Some(dec!(100.00)))).unwrap();

    let short = "EXT000000000000000001";
    assert_eq!(short.len(), 21);
    assert_eq!(
        engine.refund(make_refund("op-1", short, None)),
        Err(LedgerError::InvalidExternalId)
    );
    assert_eq!(
        engine.refund(make_refund("op-1", "", None)),
        Err(LedgerError::InvalidExternalId)
    );

    let result = engine.refund(make_refund("op-1", EXTERNAL_ID, None)).unwrap();
    assert_eq!(result.status, TransactionStatus::Refunded);
    assert_eq!(result.amount_refunded, dec!(100.00));
    assert_eq!(balances(&engine), (dec!(500.00), dec!(0)));

    let record = engine.transaction(&OperationId::new("op-1")).unwrap().unwrap();
    assert_eq!(record.status, TransactionStatus::Refunded);
    let refund = engine.transaction(&result.refund_operation_id).unwrap().unwrap();
    assert_eq!(refund.kind, TransactionKind::Refund);
    assert_eq!(refund.status, TransactionStatus::Completed);
    assert_eq!(refund.related_operation_id, Some(OperationId::new("op-1")));
    assert_eq!(refund.external_id.unwrap().as_str(), EXTERNAL_ID);
}

#[test]
fn partial_refund_is_bounded_by_capture() {
    let engine = engine_with_account(dec!(500.00));
    engine.authorize(make_authorize("op-1", dec!(100.00))).unwrap();
    engine.capture(make_capture("op-1", Some(dec!(80.00)))).unwrap();

    assert_eq!(
        engine.refund(make_refund("op-1", EXTERNAL_ID, Some(dec!(90.00)))),
        Err(LedgerError::AmountExceedsCaptured {
            requested: dec!(90.00),
            captured: dec!(80.00),
        })
    );

    let result = engine
        .refund(make_refund("op-1", EXTERNAL_ID, Some(dec!(25.00))))
        .unwrap();
    assert_eq!(result.amount_refunded, dec!(25.00));
    assert_eq!(balances(&engine), (dec!(445.00), dec!(0)));
}

#[test]
fn refund_twice_returns_the_same_record() {
    let engine = engine_with_account(dec!(500.00));
    engine.authorize(make_authorize("op-1", dec!(100.00))).unwrap();
    engine.capture(make_capture("op-1", None)).unwrap();

    let first = engine
        .refund(make_refund("op-1", EXTERNAL_ID, Some(dec!(10.00))))
        .unwrap();
    let second = engine
        .refund(make_refund("op-1", EXTERNAL_ID, Some(dec!(50.00))))
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(balances(&engine), (dec!(410.00), dec!(0)));

    let refunds = engine
        .history(AccountId(1))
        .unwrap()
        .into_iter()
        .filter(|t| t.kind == TransactionKind::Refund)
        .count();
    assert_eq!(refunds, 1);
}

#[test]
fn refund_before_capture_fails() {
    let engine = engine_with_account(dec!(500.00));
    engine.authorize(make_authorize("op-1", dec!(100.00))).unwrap();

    assert_eq!(
        engine.refund(make_refund("op-1", EXTERNAL_ID, None)),
        Err(LedgerError::InvalidState {
            attempted: TransactionKind::Refund,
            status: TransactionStatus::Authorized,
        })
    );
}

#[test]
fn refund_of_voided_fails() {
    let engine = engine_with_account(dec!(500.00));
    engine.authorize(make_authorize("op-1", dec!(100.00))).unwrap();
    engine.void(make_void("op-1")).unwrap();

    let result = engine.refund(make_refund("op-1", EXTERNAL_ID, None));
    assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidState);
}

#[test]
fn refund_may_reference_the_capture_record() {
    let engine = engine_with_account(dec!(500.00));
    engine.authorize(make_authorize("op-1", dec!(100.00))).unwrap();
    engine.capture(make_capture("op-1", None)).unwrap();
    let capture_id = engine
        .history(AccountId(1))
        .unwrap()
        .into_iter()
        .find(|t| t.kind == TransactionKind::Capture)
        .unwrap()
        .operation_id;

    let result = engine
        .refund(make_refund(capture_id.as_str(), EXTERNAL_ID, None))
        .unwrap();
    assert_eq!(result.operation_id, OperationId::new("op-1"));

    // The authorization id now sees the same refund.
    let replay = engine.refund(make_refund("op-1", EXTERNAL_ID, None)).unwrap();
    assert_eq!(replay, result);
}

#[test]
fn capture_still_replays_after_refund() {
    let engine = engine_with_account(dec!(500.00));
    engine.authorize(make_authorize("op-1", dec!(100.00))).unwrap();
    let capture = engine.capture(make_capture("op-1", None)).unwrap();
    engine.refund(make_refund("op-1", EXTERNAL_ID, None)).unwrap();

    assert_eq!(engine.capture(make_capture("op-1", None)).unwrap(), capture);
    assert_eq!(balances(&engine), (dec!(500.00), dec!(0)));
}

// =============================================================================
// Dispatch and journal
// =============================================================================

#[test]
fn process_dispatches_every_operation() {
    let engine = engine_with_account(dec!(500.00));

    let outcomes = [
        Operation::Authorize(make_authorize("op-1", dec!(100.00))),
        Operation::Capture(make_capture("op-1", None)),
        Operation::Refund(make_refund("op-1", EXTERNAL_ID, None)),
        Operation::Authorize(make_authorize("op-2", dec!(5.00))),
        Operation::Void(make_void("op-2")),
    ]
    .into_iter()
    .map(|op| engine.process(op).unwrap())
    .collect::<Vec<_>>();

    assert!(matches!(outcomes[0], Outcome::Authorized(_)));
    assert!(matches!(outcomes[1], Outcome::Captured(_)));
    assert!(matches!(outcomes[2], Outcome::Refunded(_)));
    assert!(matches!(outcomes[4], Outcome::Voided(_)));
    assert!(outcomes.iter().all(|o| o.account_id() == AccountId(1)));
    assert_eq!(outcomes[4].operation_id(), &OperationId::new("op-2"));
}

#[test]
fn history_records_every_step() {
    let engine = engine_with_account(dec!(500.00));
    engine.authorize(make_authorize("op-1", dec!(100.00))).unwrap();
    engine.capture(make_capture("op-1", Some(dec!(70.00)))).unwrap();
    engine.refund(make_refund("op-1", EXTERNAL_ID, None)).unwrap();

    let history = engine.history(AccountId(1)).unwrap();
    let kinds: Vec<_> = history.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        [
            TransactionKind::Authorize,
            TransactionKind::Capture,
            TransactionKind::Refund
        ]
    );
    assert_eq!(history[0].status, TransactionStatus::Refunded);
    assert_eq!(history[1].amount, dec!(70.00));
    assert_eq!(history[2].amount, dec!(70.00));
    assert!(history.iter().all(|t| t.amount > Decimal::ZERO));
}
