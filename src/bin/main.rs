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

use card_ledger::{
    AccountId, AuthorizeRequest, CaptureRequest, Currency, Engine, LedgerError, Operation,
    OperationId, RefundRequest, RetryPolicy, VoidRequest,
};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Card Ledger - Replay settlement operations against a set of accounts
///
/// Opens the accounts listed in the accounts CSV, applies every operation in
/// the input CSV, and writes the final balances to stdout. Logs go to stderr
/// and are filtered with RUST_LOG (default: info).
#[derive(Parser, Debug)]
#[command(name = "card-ledger")]
#[command(about = "Replays authorize/capture/void/refund CSVs through the ledger", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: type,account,operation,amount,currency,external_id,description
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Path to CSV file with accounts to open
    ///
    /// Expected format: account,currency,balance
    #[arg(long, value_name = "FILE")]
    accounts: PathBuf,

    /// Attempts per operation when the store reports a write conflict
    #[arg(long, default_value_t = RetryPolicy::DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn main() {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let engine = Engine::new().with_retry_policy(RetryPolicy::new(args.max_attempts));

    let accounts = match File::open(&args.accounts) {
        Ok(f) => f,
        Err(e) => {
            error!(path = %args.accounts.display(), error = %e, "cannot open accounts file");
            process::exit(1);
        }
    };
    if let Err(e) = load_accounts(&engine, BufReader::new(accounts)) {
        error!(error = %e, "cannot read accounts");
        process::exit(1);
    }

    let input = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            error!(path = %args.input.display(), error = %e, "cannot open operations file");
            process::exit(1);
        }
    };
    match process_operations(&engine, BufReader::new(input)) {
        Ok(summary) => info!(
            applied = summary.applied,
            rejected = summary.rejected,
            "operations processed"
        ),
        Err(e) => {
            error!(error = %e, "cannot read operations");
            process::exit(1);
        }
    }

    if let Err(e) = write_accounts(&engine, std::io::stdout()) {
        error!(error = %e, "cannot write balances");
        process::exit(1);
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Why an operations row was not applied.
#[derive(Debug, Error)]
enum RowError {
    #[error("unknown operation type '{0}'")]
    UnknownType(String),

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl RowError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownType(_) => "unknown_type",
            Self::MissingField(_) => "missing_field",
            Self::Ledger(e) => e.code(),
        }
    }
}

/// Raw CSV record of the accounts file.
#[derive(Debug, Deserialize)]
struct AccountRecord {
    account: u32,
    currency: String,
    balance: Decimal,
}

/// Raw CSV record matching the operations format.
///
/// Fields: `type, account, operation, amount, currency, external_id, description`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    op_type: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    account: Option<u32>,
    #[serde(default)]
    operation: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    external_id: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl CsvRecord {
    /// Converts a CSV record into a typed [`Operation`].
    fn into_operation(self) -> Result<Operation, RowError> {
        let operation_id = self.operation.map(OperationId::new);
        let referenced = || operation_id.clone().ok_or(RowError::MissingField("operation"));

        match self.op_type.to_lowercase().as_str() {
            "authorize" => Ok(Operation::Authorize(AuthorizeRequest {
                operation_id: operation_id.clone(),
                account_id: AccountId(self.account.ok_or(RowError::MissingField("account"))?),
                amount: self.amount.ok_or(LedgerError::InvalidAmount)?,
                currency: Currency::parse(self.currency.as_deref().unwrap_or_default())?,
                description: self.description,
            })),
            "capture" => Ok(Operation::Capture(CaptureRequest {
                operation_id: referenced()?,
                amount: self.amount,
            })),
            "void" => Ok(Operation::Void(VoidRequest {
                operation_id: referenced()?,
            })),
            "refund" => Ok(Operation::Refund(RefundRequest {
                operation_id: referenced()?,
                external_id: self.external_id.unwrap_or_default(),
                amount: self.amount,
            })),
            other => Err(RowError::UnknownType(other.to_owned())),
        }
    }
}

/// Opens every account listed in a CSV reader.
///
/// Malformed rows are skipped with a warning.
///
/// # Errors
///
/// Returns a CSV error if the reader fails.
fn load_accounts<R: Read>(engine: &Engine, reader: R) -> Result<usize, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(reader);

    let mut opened = 0;
    for result in rdr.deserialize::<AccountRecord>() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "skipping malformed account row");
                continue;
            }
        };
        let opened_account = Currency::parse(&record.currency).and_then(|currency| {
            engine.open_account(AccountId(record.account), currency, record.balance)
        });
        match opened_account {
            Ok(_) => opened += 1,
            Err(e) => warn!(account = record.account, code = e.code(), error = %e, "skipping account"),
        }
    }
    Ok(opened)
}

/// Counts of applied and rejected operation rows.
#[derive(Debug, Default, PartialEq, Eq)]
struct Summary {
    applied: usize,
    rejected: usize,
}

/// Applies operations from a CSV reader, in order.
///
/// Rejected operations and malformed rows are logged with their stable
/// error code and do not stop processing.
///
/// # Errors
///
/// Returns a CSV error if the reader fails.
fn process_operations<R: Read>(engine: &Engine, reader: R) -> Result<Summary, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All) // Handle whitespace in fields like " capture "
        .flexible(true) // Allow trailing optional fields to be left out
        .has_headers(true)
        .from_reader(reader);

    let mut summary = Summary::default();
    for result in rdr.deserialize::<CsvRecord>() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "skipping malformed row");
                summary.rejected += 1;
                continue;
            }
        };
        let applied = record
            .into_operation()
            .and_then(|operation| engine.process(operation).map_err(RowError::from));
        match applied {
            Ok(outcome) => {
                info!(operation_id = %outcome.operation_id(), account_id = %outcome.account_id(), "operation applied");
                summary.applied += 1;
            }
            Err(e) => {
                warn!(code = e.code(), error = %e, "operation rejected");
                summary.rejected += 1;
            }
        }
    }
    Ok(summary)
}

/// Writes account balances as CSV with two decimal places.
///
/// Columns: `account, currency, balance, held, available`
///
/// # Errors
///
/// Returns a CSV error if writing fails.
fn write_accounts<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for account in engine.store().accounts() {
        wtr.serialize(&account)?;
    }
    wtr.flush()?;
    Ok(())
}
