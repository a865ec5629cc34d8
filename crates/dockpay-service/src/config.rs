//! Service configuration.

use serde::Deserialize;
use std::path::Path;

/// PayPal hosts allowed to serve webhook signing certificates.
pub const DEFAULT_PAYPAL_CERT_HOSTS: &[&str] = &[
    "api.paypal.com",
    "api-m.paypal.com",
    "api.sandbox.paypal.com",
    "api-m.sandbox.paypal.com",
];

/// Service configuration loaded from environment variables.
///
/// Built once at startup and carried in `AppState`; nothing reads the
/// environment after that.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/dockpay").
    pub data_dir: String,

    /// Storefront URL, used for checkout redirects when the request carries
    /// no `x-calendar-origin` header.
    pub frontend_url: String,

    /// Public URL of this service, used for links in customer receipts.
    pub public_base_url: String,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Timeout for every outbound call (certificates, Stripe, `SendGrid`, Twilio).
    pub upstream_timeout_seconds: u64,

    /// PayPal webhook id, part of every signed PayPal message.
    pub paypal_webhook_id: Option<String>,

    /// Hosts allowed to serve PayPal signing certificates. Empty disables the check.
    pub paypal_cert_hosts: Vec<String>,

    /// How long a fetched certificate is reused. 0 disables caching.
    pub cert_cache_ttl_seconds: u64,

    /// Stripe API key (optional).
    pub stripe_api_key: Option<String>,

    /// Stripe webhook secret (optional).
    pub stripe_webhook_secret: Option<String>,

    /// Stripe API base URL.
    pub stripe_api_base: String,

    /// `SendGrid` API key (optional; emails are only logged without it).
    pub sendgrid_api_key: Option<String>,

    /// `SendGrid` API base URL.
    pub sendgrid_api_base: String,

    /// Twilio API base URL.
    pub twilio_api_base: String,

    /// Sender address of merchant purchase alerts.
    pub notify_from: String,

    /// JSON file listing merchants (optional).
    pub merchants_file: Option<String>,
}

/// Stripe secrets file structure.
#[derive(Debug, Deserialize)]
struct StripeSecrets {
    api_key: String,
    #[serde(default)]
    webhook_secret: Option<String>,
}

/// PayPal secrets file structure.
#[derive(Debug, Deserialize)]
struct PayPalSecrets {
    webhook_id: String,
}

/// `SendGrid` secrets file structure.
#[derive(Debug, Deserialize)]
struct SendGridSecrets {
    api_key: String,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        // Secrets files take precedence over environment variables
        let (stripe_api_key, stripe_webhook_secret) = load_stripe_secrets();
        let paypal_webhook_id = load_secrets_file::<PayPalSecrets>("paypal")
            .map(|s| s.webhook_id)
            .or_else(|| std::env::var("PAYPAL_WEBHOOK_ID").ok());
        let sendgrid_api_key = load_secrets_file::<SendGridSecrets>("sendgrid")
            .map(|s| s.api_key)
            .or_else(|| std::env::var("SENDGRID_API_KEY").ok());

        Self {
            listen_addr: env_or("LISTEN_ADDR", defaults.listen_addr),
            data_dir: env_or("DATA_DIR", defaults.data_dir),
            frontend_url: env_or("FRONTEND_URL", defaults.frontend_url),
            public_base_url: env_or("PUBLIC_BASE_URL", defaults.public_base_url),
            cors_origins: env_list("CORS_ORIGINS").unwrap_or(defaults.cors_origins),
            max_body_bytes: env_parse("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(defaults.request_timeout_seconds),
            upstream_timeout_seconds: env_parse("UPSTREAM_TIMEOUT_SECONDS")
                .unwrap_or(defaults.upstream_timeout_seconds),
            paypal_webhook_id,
            paypal_cert_hosts: env_list("PAYPAL_CERT_HOSTS").unwrap_or(defaults.paypal_cert_hosts),
            cert_cache_ttl_seconds: env_parse("CERT_CACHE_TTL_SECONDS")
                .unwrap_or(defaults.cert_cache_ttl_seconds),
            stripe_api_key,
            stripe_webhook_secret,
            stripe_api_base: env_or("STRIPE_API_BASE", defaults.stripe_api_base),
            sendgrid_api_key,
            sendgrid_api_base: env_or("SENDGRID_API_BASE", defaults.sendgrid_api_base),
            twilio_api_base: env_or("TWILIO_API_BASE", defaults.twilio_api_base),
            notify_from: env_or("NOTIFY_FROM", defaults.notify_from),
            merchants_file: std::env::var("MERCHANTS_FILE").ok(),
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Comma-separated list. An empty variable yields an empty list.
fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|s| {
        s.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

/// Load Stripe secrets from file or environment.
fn load_stripe_secrets() -> (Option<String>, Option<String>) {
    if let Some(secrets) = load_secrets_file::<StripeSecrets>("stripe") {
        return (Some(secrets.api_key), secrets.webhook_secret);
    }

    tracing::debug!("Stripe secrets file not found, using environment variables");
    (
        std::env::var("STRIPE_API_KEY").ok(),
        std::env::var("STRIPE_WEBHOOK_SECRET").ok(),
    )
}

/// Load `.secrets/<name>.json` from the working directory or its parent.
fn load_secrets_file<T: serde::de::DeserializeOwned>(name: &str) -> Option<T> {
    let secret_paths = [
        format!(".secrets/{name}.json"),
        format!("../.secrets/{name}.json"),
    ];

    for path in &secret_paths {
        match read_secrets_file(path) {
            Ok(secrets) => {
                tracing::info!(path = %path, "Loaded {name} secrets from file");
                return Some(secrets);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path, error = %e, "Ignoring unreadable secrets file"),
        }
    }
    None
}

/// Load secrets from a JSON file.
fn read_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/dockpay".into(),
            frontend_url: "http://localhost:3000".into(),
            public_base_url: "http://localhost:8080".into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            upstream_timeout_seconds: 10,
            paypal_webhook_id: None,
            paypal_cert_hosts: DEFAULT_PAYPAL_CERT_HOSTS
                .iter()
                .map(|h| (*h).to_string())
                .collect(),
            cert_cache_ttl_seconds: 3600,
            stripe_api_key: None,
            stripe_webhook_secret: None,
            stripe_api_base: "https://api.stripe.com/v1".into(),
            sendgrid_api_key: None,
            sendgrid_api_base: "https://api.sendgrid.com".into(),
            twilio_api_base: "https://api.twilio.com".into(),
            notify_from: "donotreply@dockpay.app".into(),
            merchants_file: None,
        }
    }
}
