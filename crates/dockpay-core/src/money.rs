//! Minor-unit money helpers.
//!
//! All ledger and fee arithmetic is done in `i64` minor units (cents). Decimal
//! values only appear at the edge where a provider or a cart sends a decimal
//! string such as `"19.99"`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::MoneyError;

/// Default currency used when a cart item does not declare one.
pub const DEFAULT_CURRENCY: &str = "usd";

/// Convert a major-unit decimal (dollars) into minor units (cents).
///
/// Rounds half away from zero, so `19.995` becomes `2000`.
///
/// # Errors
///
/// Returns `MoneyError::OutOfRange` if the result does not fit in `i64`.
pub fn to_minor_units(value: Decimal) -> Result<i64, MoneyError> {
    value
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|v| v.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|v| v.to_i64())
        .ok_or_else(|| MoneyError::OutOfRange(value.to_string()))
}

/// Parse a decimal string (`"10.00"`) into minor units.
///
/// # Errors
///
/// Returns `MoneyError::InvalidAmount` if the string is not a decimal.
pub fn parse_minor_units(value: &str) -> Result<i64, MoneyError> {
    let decimal: Decimal = value
        .trim()
        .parse()
        .map_err(|_| MoneyError::InvalidAmount(value.to_string()))?;
    to_minor_units(decimal)
}

/// Render minor units as a two-decimal string (`1999` → `"19.99"`).
#[must_use]
pub fn format_minor_units(cents: i64) -> String {
    Decimal::new(cents, 2).to_string()
}

/// Normalize a currency code to the lowercase form providers expect.
#[must_use]
pub fn normalize_currency(code: &str) -> String {
    let code = code.trim();
    if code.is_empty() {
        DEFAULT_CURRENCY.to_string()
    } else {
        code.to_ascii_lowercase()
    }
}
