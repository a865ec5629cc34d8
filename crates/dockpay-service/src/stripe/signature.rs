//! `Stripe-Signature` header verification.

use crate::crypto::{constant_time_eq, hmac_sha256_hex};

use super::StripeError;

/// Default age, in seconds, beyond which a signed payload is rejected.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Verify a `Stripe-Signature` header against the raw payload.
///
/// The header has the form `t=timestamp,v1=signature[,v1=signature...]`.
/// Any `v1` entry matching `HMAC-SHA256(secret, "{t}.{payload}")` is accepted
/// as long as `t` is within `tolerance_secs` of `now`.
///
/// # Errors
///
/// Returns `StripeError::InvalidSignature` if the header is malformed,
/// stale, or carries no matching signature.
pub fn verify_signature(
    secret: &str,
    payload: &str,
    header: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), StripeError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", ts)) => timestamp = Some(ts),
            Some(("v1", sig)) => signatures.push(sig),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(StripeError::InvalidSignature)?;
    let issued: i64 = timestamp
        .parse()
        .map_err(|_| StripeError::InvalidSignature)?;
    if now.abs_diff(issued) > tolerance_secs.unsigned_abs() {
        tracing::debug!(issued, now, "Stripe signature outside tolerance");
        return Err(StripeError::InvalidSignature);
    }

    let expected = hmac_sha256_hex(secret, &format!("{timestamp}.{payload}"))
        .map_err(|e| StripeError::Configuration(e.to_string()))?;

    if signatures.iter().any(|sig| constant_time_eq(&expected, sig)) {
        Ok(())
    } else {
        Err(StripeError::InvalidSignature)
    }
}
