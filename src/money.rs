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

//! Monetary amount handling.
//!
//! All amounts carry two fractional digits and are rounded (banker's
//! rounding) before they are compared or stored.

use crate::error::LedgerError;
use rust_decimal::Decimal;

pub const DECIMAL_PRECISION: u32 = 2;

/// Rounds a value to ledger precision.
pub fn quantize(value: Decimal) -> Decimal {
    value.round_dp(DECIMAL_PRECISION)
}

/// Quantizes an amount and checks it is strictly positive.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidAmount`] for zero, negative, or sub-cent
/// amounts that round to zero.
pub fn positive_amount(value: Decimal) -> Result<Decimal, LedgerError> {
    let amount = quantize(value);
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount);
    }
    Ok(amount)
}
