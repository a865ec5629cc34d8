//! Checkout fee calculation.
//!
//! Turns a cart of priced items into the exact amounts submitted to Stripe
//! when a checkout session is created:
//!
//! - each item is charged `round(unit × 100) × quantity` cents
//! - every complete $50.00 of the cart adds a flat $3.00 fee, sent as its own
//!   line item
//! - the platform takes 2% of the pre-fee total as an application fee, which is
//!   not a line item
//!
//! Arithmetic is integer cents end-to-end; the decimal unit price is converted
//! once, at the edge.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::FeeError;
use crate::money::{normalize_currency, to_minor_units};

// ============================================================================
// Constants
// ============================================================================

/// Size of one fee tier in cents ($50.00).
pub const FEE_TIER_CENTS: i64 = 5000;

/// Flat fee charged per complete tier in cents ($3.00).
pub const FEE_PER_TIER_CENTS: i64 = 300;

/// Application fee percentage taken on the pre-fee total.
pub const APPLICATION_FEE_PERCENT: i64 = 2;

/// Name of the synthetic fee line item.
pub const FEE_ITEM_NAME: &str = "Fees";

/// Money as sent by the storefront: a currency code and a decimal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money {
    /// ISO currency code (any case).
    #[serde(default)]
    pub currency_code: String,
    /// Decimal major-unit value; accepts `"19.99"` or `19.99`.
    pub value: Decimal,
}

/// One item of a storefront cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLineItem {
    /// Display name.
    pub name: String,
    /// Unit price.
    pub unit_amount: Money,
    /// Quantity; accepts `"2"` or `2`.
    #[serde(deserialize_with = "int_or_string")]
    pub quantity: i64,
    /// Stock keeping unit, forwarded as product metadata.
    #[serde(default)]
    pub sku: String,
    /// Optional description.
    #[serde(default)]
    pub description: String,
}

/// A line item ready to submit to the provider, in cents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricedLineItem {
    /// Display name.
    pub name: String,
    /// SKU, empty for the fee item.
    pub sku: String,
    /// Description, empty for the fee item.
    pub description: String,
    /// Lowercase currency code.
    pub currency: String,
    /// Unit price in cents.
    pub unit_amount_cents: i64,
    /// Quantity.
    pub quantity: i64,
    /// `unit_amount_cents × quantity`.
    pub amount_cents: i64,
}

/// The computed checkout amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutQuote {
    /// Cart items, followed by the fee item when one applies.
    pub line_items: Vec<PricedLineItem>,
    /// Sum of the cart items, excluding the flat fee.
    pub total_cents: i64,
    /// Flat tier fee (0 when no fee item was added).
    pub fee_cents: i64,
    /// Platform application fee on `total_cents`.
    pub application_fee_cents: i64,
    /// Currency shared by all items.
    pub currency: String,
}

impl CheckoutQuote {
    /// Total the customer pays, including the flat fee. `None` on overflow.
    #[must_use]
    pub const fn charged_cents(&self) -> Option<i64> {
        self.total_cents.checked_add(self.fee_cents)
    }
}

/// Flat fee for a pre-fee total: $3.00 per complete $50.00.
#[must_use]
pub const fn tier_fee(total_cents: i64) -> i64 {
    (total_cents / FEE_TIER_CENTS) * FEE_PER_TIER_CENTS
}

/// Application fee for a pre-fee total, rounded down. `None` on overflow.
#[must_use]
pub const fn application_fee(total_cents: i64) -> Option<i64> {
    match total_cents.checked_mul(APPLICATION_FEE_PERCENT) {
        Some(scaled) => Some(scaled / 100),
        None => None,
    }
}

/// Compute line items, total, flat fee and application fee for a cart.
///
/// # Errors
///
/// Returns a [`FeeError`] for an empty cart, a non-positive quantity, a
/// negative price, mixed currencies, or arithmetic overflow.
pub fn quote(cart: &[CartLineItem]) -> Result<CheckoutQuote, FeeError> {
    let Some(first) = cart.first() else {
        return Err(FeeError::EmptyCart);
    };
    let currency = normalize_currency(&first.unit_amount.currency_code);

    let mut line_items = Vec::with_capacity(cart.len() + 1);
    let mut total_cents: i64 = 0;

    for item in cart {
        let item_currency = normalize_currency(&item.unit_amount.currency_code);
        if item_currency != currency {
            return Err(FeeError::MixedCurrency {
                expected: currency,
                found: item_currency,
            });
        }
        if item.quantity <= 0 {
            return Err(FeeError::InvalidQuantity {
                item: item.name.clone(),
                quantity: item.quantity,
            });
        }

        let unit_amount_cents = to_minor_units(item.unit_amount.value)?;
        if unit_amount_cents < 0 {
            return Err(FeeError::NegativePrice {
                item: item.name.clone(),
            });
        }

        let amount_cents = unit_amount_cents
            .checked_mul(item.quantity)
            .ok_or(FeeError::Overflow)?;
        total_cents = total_cents
            .checked_add(amount_cents)
            .ok_or(FeeError::Overflow)?;

        line_items.push(PricedLineItem {
            name: item.name.clone(),
            sku: item.sku.clone(),
            description: item.description.trim().to_string(),
            currency: currency.clone(),
            unit_amount_cents,
            quantity: item.quantity,
            amount_cents,
        });
    }

    let fee_cents = tier_fee(total_cents);
    let application_fee_cents = application_fee(total_cents).ok_or(FeeError::Overflow)?;
    total_cents.checked_add(fee_cents).ok_or(FeeError::Overflow)?;

    if fee_cents > 0 {
        line_items.push(PricedLineItem {
            name: FEE_ITEM_NAME.to_string(),
            sku: String::new(),
            description: String::new(),
            currency: currency.clone(),
            unit_amount_cents: fee_cents,
            quantity: 1,
            amount_cents: fee_cents,
        });
    }

    Ok(CheckoutQuote {
        line_items,
        total_cents,
        fee_cents,
        application_fee_cents,
        currency,
    })
}

/// Accept an integer encoded either as a JSON number or a JSON string.
pub(crate) fn int_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Int(i64),
        Str(String),
    }

    match IntOrString::deserialize(deserializer)? {
        IntOrString::Int(n) => Ok(n),
        IntOrString::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
