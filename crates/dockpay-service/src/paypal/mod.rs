//! PayPal webhook authentication.
//!
//! PayPal signs each notification with the private key of a certificate it
//! hosts. The notification names the certificate URL in a header; the
//! [`CertificateResolver`] fetches it and [`verify`] checks the signature over
//! `transmission_id|timestamp|webhook_id|crc32(body)`.

pub mod cert;
pub mod verify;

pub use cert::{CertificateError, CertificateResolver, SignatureAlgorithm, SigningCertificate};
pub use verify::{signed_message, verify};

use axum::http::HeaderMap;

/// Header carrying the base64 signature.
pub const TRANSMISSION_SIG: &str = "paypal-transmission-sig";
/// Header carrying the signing certificate URL.
pub const CERT_URL: &str = "paypal-cert-url";
/// Header carrying the transmission id.
pub const TRANSMISSION_ID: &str = "paypal-transmission-id";
/// Header carrying the transmission timestamp.
pub const TRANSMISSION_TIME: &str = "paypal-transmission-time";

/// Out-of-band metadata PayPal sends with a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    /// Transmission id.
    pub id: String,
    /// Transmission timestamp, verbatim.
    pub time: String,
    /// Signing certificate URL.
    pub cert_url: String,
    /// Base64 signature.
    pub signature: String,
}

impl Transmission {
    /// Read the transmission headers.
    ///
    /// # Errors
    ///
    /// Returns the name of the first missing or non-ASCII header.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, &'static str> {
        let get = |name: &'static str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or(name)
        };

        Ok(Self {
            signature: get(TRANSMISSION_SIG)?,
            cert_url: get(CERT_URL)?,
            id: get(TRANSMISSION_ID)?,
            time: get(TRANSMISSION_TIME)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_all_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(TRANSMISSION_SIG, HeaderValue::from_static("c2ln"));
        headers.insert(CERT_URL, HeaderValue::from_static("https://api.paypal.com/cert.pem"));
        headers.insert(TRANSMISSION_ID, HeaderValue::from_static("tx-1"));
        headers.insert(TRANSMISSION_TIME, HeaderValue::from_static("2024-01-01T00:00:00Z"));

        let transmission = Transmission::from_headers(&headers).unwrap();
        assert_eq!(transmission.id, "tx-1");
        assert_eq!(transmission.signature, "c2ln");
    }

    #[test]
    fn missing_header_is_named() {
        let mut headers = HeaderMap::new();
        headers.insert(TRANSMISSION_SIG, HeaderValue::from_static("c2ln"));
        assert_eq!(Transmission::from_headers(&headers), Err(CERT_URL));
    }
}
