//! Key encoding utilities for `RocksDB`.
//!
//! Keys put the account scope first so every record of a merchant shares a
//! prefix, and line items sort under their payment:
//!
//! ```text
//! payments:   account \0 payment_id
//! line_items: account \0 payment_id \0 line_item_id
//! ```
//!
//! Identifier newtypes reject control characters, so no segment can contain
//! the separator.

use dockpay_core::{LineItemId, PaymentKey};

const SEP: u8 = 0;

/// Create a payment key.
#[must_use]
pub fn payment_key(key: &PaymentKey) -> Vec<u8> {
    let account = key.account.as_bytes();
    let payment = key.payment_id.as_bytes();
    let mut out = Vec::with_capacity(account.len() + payment.len() + 1);
    out.extend_from_slice(account);
    out.push(SEP);
    out.extend_from_slice(payment);
    out
}

/// Create a prefix for iterating all line items of a payment.
#[must_use]
pub fn line_items_prefix(key: &PaymentKey) -> Vec<u8> {
    let mut out = payment_key(key);
    out.push(SEP);
    out
}

/// Create a line item key.
#[must_use]
pub fn line_item_key(key: &PaymentKey, line_item: &LineItemId) -> Vec<u8> {
    let mut out = line_items_prefix(key);
    out.extend_from_slice(line_item.as_bytes());
    out
}
