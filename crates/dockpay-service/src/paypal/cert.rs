//! Signing certificate retrieval.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use reqwest::{Client, Url};
use x509_parser::pem::parse_x509_pem;

/// Error type for certificate resolution.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CertificateError {
    /// The certificate could not be retrieved.
    #[error("certificate fetch failed: {0}")]
    Fetch(String),

    /// The document is not a PEM-encoded X.509 certificate.
    #[error("certificate decode failed: {0}")]
    Decode(String),

    /// The certificate URL is not on the allowlist.
    #[error("untrusted certificate url: {0}")]
    UntrustedUrl(String),
}

/// Signature algorithm declared by a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// `sha256WithRSAEncryption`
    RsaSha256,
    /// `sha384WithRSAEncryption`
    RsaSha384,
    /// `sha512WithRSAEncryption`
    RsaSha512,
    /// `ecdsa-with-SHA256`
    EcdsaSha256,
    /// `ecdsa-with-SHA384`
    EcdsaSha384,
    /// `Ed25519`
    Ed25519,
    /// Anything else, by OID. Never verifies.
    Unsupported(String),
}

impl SignatureAlgorithm {
    fn from_oid(oid: &str) -> Self {
        match oid {
            "1.2.840.113549.1.1.11" => Self::RsaSha256,
            "1.2.840.113549.1.1.12" => Self::RsaSha384,
            "1.2.840.113549.1.1.13" => Self::RsaSha512,
            "1.2.840.10045.4.3.2" => Self::EcdsaSha256,
            "1.2.840.10045.4.3.3" => Self::EcdsaSha384,
            "1.3.101.112" => Self::Ed25519,
            other => Self::Unsupported(other.to_string()),
        }
    }
}

/// The parts of a certificate needed to verify a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningCertificate {
    /// Subject distinguished name.
    pub subject: String,
    /// Declared signature algorithm.
    pub algorithm: SignatureAlgorithm,
    /// Subject public key, as carried in the `subjectPublicKey` bit string.
    pub public_key: Vec<u8>,
    /// End of validity.
    pub not_after: Option<DateTime<Utc>>,
}

/// Parse a PEM-encoded X.509 certificate.
///
/// # Errors
///
/// Returns `CertificateError::Decode` if the input is not PEM or the PEM body
/// is not an X.509 certificate.
pub fn parse_pem(pem: &[u8]) -> Result<SigningCertificate, CertificateError> {
    let (_, pem) = parse_x509_pem(pem).map_err(|e| CertificateError::Decode(e.to_string()))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| CertificateError::Decode(e.to_string()))?;

    Ok(SigningCertificate {
        subject: cert.subject().to_string(),
        algorithm: SignatureAlgorithm::from_oid(&cert.signature_algorithm.algorithm.to_id_string()),
        public_key: cert.public_key().subject_public_key.data.to_vec(),
        not_after: DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0),
    })
}

/// Fetches signing certificates, optionally caching them by URL.
pub struct CertificateResolver {
    client: Client,
    allowed_hosts: Vec<String>,
    cache: Option<Cache<String, Arc<SigningCertificate>>>,
}

impl CertificateResolver {
    /// Maximum number of cached certificates.
    const CACHE_CAPACITY: u64 = 64;

    /// Create a resolver.
    ///
    /// An empty `allowed_hosts` accepts any host; a zero `cache_ttl` fetches on
    /// every call.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        timeout: Duration,
        allowed_hosts: Vec<String>,
        cache_ttl: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        let cache = (!cache_ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(Self::CACHE_CAPACITY)
                .time_to_live(cache_ttl)
                .build()
        });

        Ok(Self {
            client,
            allowed_hosts,
            cache,
        })
    }

    /// Resolve the certificate at `url`.
    ///
    /// Concurrent cache misses for the same URL share one fetch.
    ///
    /// # Errors
    ///
    /// - `UntrustedUrl` if the URL does not parse or its host is not allowed.
    /// - `Fetch` on network failure or a non-2xx status.
    /// - `Decode` if the body is not a PEM certificate.
    pub async fn resolve(&self, url: &str) -> Result<Arc<SigningCertificate>, CertificateError> {
        let url = self.check_url(url)?;

        match &self.cache {
            Some(cache) => cache
                .try_get_with(url.to_string(), self.fetch(url))
                .await
                .map_err(|e| (*e).clone()),
            None => self.fetch(url).await,
        }
    }

    fn check_url(&self, raw: &str) -> Result<Url, CertificateError> {
        let url = Url::parse(raw).map_err(|_| CertificateError::UntrustedUrl(raw.to_string()))?;
        let host = url.host_str().unwrap_or_default();

        if !matches!(url.scheme(), "https" | "http") {
            return Err(CertificateError::UntrustedUrl(raw.to_string()));
        }
        if !self.allowed_hosts.is_empty()
            && !self.allowed_hosts.iter().any(|h| h.eq_ignore_ascii_case(host))
        {
            return Err(CertificateError::UntrustedUrl(raw.to_string()));
        }
        Ok(url)
    }

    async fn fetch(&self, url: Url) -> Result<Arc<SigningCertificate>, CertificateError> {
        tracing::debug!(url = %url, "Fetching PayPal signing certificate");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| CertificateError::Fetch(e.to_string()))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| CertificateError::Fetch(e.to_string()))?;

        parse_pem(&body).map(Arc::new)
    }
}
