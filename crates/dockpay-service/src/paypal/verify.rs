//! PayPal transmission signature verification.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ring::signature::{self, UnparsedPublicKey, VerificationAlgorithm};

use super::cert::{SignatureAlgorithm, SigningCertificate};

/// Uncompressed P-256 point length.
const P256_POINT_LEN: usize = 65;
/// Uncompressed P-384 point length.
const P384_POINT_LEN: usize = 97;

/// Build the string PayPal signs: `id|time|webhook_id|crc32(body)`, with the
/// checksum rendered as an unsigned decimal.
#[must_use]
pub fn signed_message(transmission_id: &str, timestamp: &str, webhook_id: &str, body: &[u8]) -> String {
    format!(
        "{transmission_id}|{timestamp}|{webhook_id}|{}",
        crc32fast::hash(body)
    )
}

/// Check a PayPal transmission signature.
///
/// Returns `false` if the certificate is absent, the signature is not valid
/// base64, the certificate's algorithm is unsupported, or the signature does
/// not match.
#[must_use]
pub fn verify(
    certificate: Option<&SigningCertificate>,
    transmission_id: &str,
    timestamp: &str,
    webhook_id: &str,
    signature_b64: &str,
    body: &[u8],
) -> bool {
    let Some(certificate) = certificate else {
        return false;
    };
    let Ok(signature) = STANDARD.decode(signature_b64.trim()) else {
        return false;
    };
    let Some(algorithm) = algorithm_for(certificate) else {
        tracing::warn!(
            algorithm = ?certificate.algorithm,
            subject = %certificate.subject,
            "Unsupported certificate signature algorithm"
        );
        return false;
    };

    let message = signed_message(transmission_id, timestamp, webhook_id, body);
    UnparsedPublicKey::new(algorithm, &certificate.public_key)
        .verify(message.as_bytes(), &signature)
        .is_ok()
}

fn algorithm_for(certificate: &SigningCertificate) -> Option<&'static dyn VerificationAlgorithm> {
    let key_len = certificate.public_key.len();
    let algorithm: &'static dyn VerificationAlgorithm = match (&certificate.algorithm, key_len) {
        (SignatureAlgorithm::RsaSha256, _) => &signature::RSA_PKCS1_2048_8192_SHA256,
        (SignatureAlgorithm::RsaSha384, _) => &signature::RSA_PKCS1_2048_8192_SHA384,
        (SignatureAlgorithm::RsaSha512, _) => &signature::RSA_PKCS1_2048_8192_SHA512,
        (SignatureAlgorithm::EcdsaSha256, P256_POINT_LEN) => &signature::ECDSA_P256_SHA256_ASN1,
        (SignatureAlgorithm::EcdsaSha256, P384_POINT_LEN) => &signature::ECDSA_P384_SHA256_ASN1,
        (SignatureAlgorithm::EcdsaSha384, P256_POINT_LEN) => &signature::ECDSA_P256_SHA384_ASN1,
        (SignatureAlgorithm::EcdsaSha384, P384_POINT_LEN) => &signature::ECDSA_P384_SHA384_ASN1,
        (SignatureAlgorithm::Ed25519, _) => &signature::ED25519,
        _ => return None,
    };
    Some(algorithm)
}
