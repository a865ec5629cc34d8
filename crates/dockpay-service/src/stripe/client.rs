//! Stripe API client implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};

use dockpay_core::stripe::{CheckoutSession, LineItem, PaymentIntent, StripeList};
use dockpay_core::{AccountId, PLATFORM_ACCOUNT};

use super::types::{NewCheckoutSession, StripeErrorResponse};
use super::PaymentsApi;

/// Error type for Stripe operations.
#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stripe API returned an error.
    #[error("Stripe API error: {error_type} - {message}")]
    Api {
        /// Error type.
        error_type: String,
        /// Error message.
        message: String,
        /// Error code.
        code: Option<String>,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid webhook signature.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Stripe API client.
#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl StripeClient {
    /// Page size used when draining list endpoints.
    const PAGE_LIMIT: &'static str = "100";

    /// Expansions for a checkout session lookup: the charge with its receipt,
    /// the payment method and the first page of line items.
    const SESSION_EXPAND: [(&'static str, &'static str); 3] = [
        ("expand[]", "payment_intent.latest_charge"),
        ("expand[]", "payment_intent.payment_method"),
        ("expand[]", "line_items"),
    ];

    /// Create a new Stripe client.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Stripe secret API key (`sk_test_...` or `sk_live_...`)
    /// * `base_url` - API root, e.g. `https://api.stripe.com/v1`
    /// * `timeout` - Bound on every request
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StripeError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(StripeError::Configuration("empty API key".into()));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Authenticated request scoped to `account`.
    ///
    /// Connected accounts are addressed with the `Stripe-Account` header; the
    /// platform scope sends none.
    fn request(&self, method: reqwest::Method, path: &str, account: &AccountId) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None);

        if account.as_str() == PLATFORM_ACCOUNT {
            builder
        } else {
            builder.header("Stripe-Account", account.as_str())
        }
    }

    async fn line_items_page(
        &self,
        account: &AccountId,
        session_id: &str,
        starting_after: Option<&str>,
    ) -> Result<StripeList<LineItem>, StripeError> {
        let mut query = vec![
            ("limit", Self::PAGE_LIMIT),
            ("expand[]", "data.price.product"),
        ];
        if let Some(cursor) = starting_after {
            query.push(("starting_after", cursor));
        }

        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/checkout/sessions/{session_id}/line_items"),
                account,
            )
            .query(&query)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, StripeError> {
        let status = response.status();

        if status.is_success() {
            let body = response.bytes().await?;
            return Ok(serde_json::from_slice(&body)?);
        }

        // Try to parse error response
        let error_body: Result<StripeErrorResponse, _> = response.json().await;

        match error_body {
            Ok(stripe_error) => Err(StripeError::Api {
                error_type: stripe_error.error.error_type,
                message: stripe_error.error.message,
                code: stripe_error.error.code,
            }),
            Err(_) => Err(StripeError::Api {
                error_type: "unknown".to_string(),
                message: format!("HTTP {status}"),
                code: None,
            }),
        }
    }
}

#[async_trait]
impl PaymentsApi for StripeClient {
    async fn get_payment_intent(
        &self,
        account: &AccountId,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent, StripeError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/payment_intents/{payment_intent_id}"),
                account,
            )
            .query(&[("expand[]", "latest_charge")])
            .send()
            .await?;

        self.handle_response(response).await
    }

    async fn list_line_items(
        &self,
        account: &AccountId,
        session_id: &str,
    ) -> Result<Vec<LineItem>, StripeError> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .line_items_page(account, session_id, cursor.as_deref())
                .await?;
            let next = if page.has_more {
                page.data.last().map(|item| item.id.clone())
            } else {
                None
            };
            items.extend(page.data);
            match next {
                Some(last) => cursor = Some(last),
                None => break,
            }
        }

        tracing::debug!(
            session_id = %session_id,
            account = %account,
            count = items.len(),
            "Fetched checkout line items"
        );
        Ok(items)
    }

    async fn create_checkout_session(
        &self,
        account: &AccountId,
        session: &NewCheckoutSession,
    ) -> Result<CheckoutSession, StripeError> {
        tracing::debug!(
            account = %account,
            total_cents = session.quote.total_cents,
            fee_cents = session.quote.fee_cents,
            application_fee_cents = session.quote.application_fee_cents,
            "Creating Stripe checkout session"
        );

        let response = self
            .request(reqwest::Method::POST, "/checkout/sessions", account)
            .form(&session.form())
            .send()
            .await?;

        self.handle_response(response).await
    }

    async fn get_checkout_session(
        &self,
        account: &AccountId,
        session_id: &str,
    ) -> Result<CheckoutSession, StripeError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/checkout/sessions/{session_id}"),
                account,
            )
            .query(&Self::SESSION_EXPAND)
            .send()
            .await?;

        self.handle_response(response).await
    }
}
