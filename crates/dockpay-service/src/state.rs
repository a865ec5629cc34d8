//! Application state.

use std::sync::Arc;
use std::time::Duration;

use dockpay_store::Store;

use crate::config::ServiceConfig;
use crate::merchants::MerchantRegistry;
use crate::notify::{HttpNotifier, LogNotifier, Notifier};
use crate::paypal::CertificateResolver;
use crate::reconcile::Reconciler;
use crate::stripe::{PaymentsApi, StripeClient};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Known merchants.
    pub merchants: Arc<MerchantRegistry>,

    /// PayPal signing certificate resolver.
    pub certificates: Arc<CertificateResolver>,

    /// Stripe API client (optional).
    pub stripe: Option<Arc<dyn PaymentsApi>>,

    /// Email and SMS delivery.
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn new(
        store: Arc<dyn Store>,
        config: ServiceConfig,
        merchants: MerchantRegistry,
    ) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_secs(config.upstream_timeout_seconds);

        let certificates = CertificateResolver::new(
            timeout,
            config.paypal_cert_hosts.clone(),
            Duration::from_secs(config.cert_cache_ttl_seconds),
        )?;

        if config.paypal_webhook_id.is_none() {
            tracing::warn!("PayPal webhook id not configured - PayPal webhooks will be rejected");
        }

        // Create Stripe client if configured
        let stripe = config.stripe_api_key.as_ref().and_then(|key| {
            match StripeClient::new(key, &config.stripe_api_base, timeout) {
                Ok(client) => {
                    tracing::info!(api_base = %config.stripe_api_base, "Stripe integration enabled");
                    Some(Arc::new(client) as Arc<dyn PaymentsApi>)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create Stripe client");
                    None
                }
            }
        });

        if stripe.is_none() {
            tracing::warn!("Stripe not configured - checkout and session follow-ups unavailable");
        }

        let notifier: Arc<dyn Notifier> = match &config.sendgrid_api_key {
            Some(key) => {
                tracing::info!("SendGrid email delivery enabled");
                Arc::new(HttpNotifier::new(
                    key,
                    &config.sendgrid_api_base,
                    &config.twilio_api_base,
                    timeout,
                )?)
            }
            None => {
                tracing::warn!("SendGrid not configured - notifications will only be logged");
                Arc::new(LogNotifier)
            }
        };

        tracing::info!(merchants = merchants.len(), "Merchant registry loaded");

        Ok(Self {
            store,
            config,
            merchants: Arc::new(merchants),
            certificates: Arc::new(certificates),
            stripe,
            notifier,
        })
    }

    /// Replace the Stripe client.
    #[must_use]
    pub fn with_payments(mut self, payments: Arc<dyn PaymentsApi>) -> Self {
        self.stripe = Some(payments);
        self
    }

    /// Replace the notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Check if Stripe is configured.
    #[must_use]
    pub fn has_stripe(&self) -> bool {
        self.stripe.is_some()
    }

    /// Reconciler over this state's store, Stripe client and notifier.
    #[must_use]
    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.store.clone(),
            self.stripe.clone(),
            self.notifier.clone(),
            self.config.public_base_url.clone(),
            self.config.notify_from.clone(),
        )
    }
}
