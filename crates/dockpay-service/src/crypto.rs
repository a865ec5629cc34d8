//! Cryptographic utilities for webhook verification.
//!
//! Shared helpers for the HMAC scheme Stripe signs webhooks with. PayPal's
//! certificate-based scheme lives in [`crate::paypal::verify`].

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 and return the hex-encoded result (64 characters).
///
/// # Errors
///
/// Returns `InvalidLength` if the key is rejected. HMAC accepts keys of any
/// size per RFC 2104, so this only fails on a broken `hmac` implementation.
pub fn hmac_sha256_hex(secret: &str, message: &str) -> Result<String, hmac::digest::InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time string comparison to prevent timing attacks.
///
/// Returns early only on a length mismatch, which leaks nothing about the
/// content of a fixed-length signature.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
