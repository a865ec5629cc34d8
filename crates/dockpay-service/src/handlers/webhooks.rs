//! Webhook handlers for PayPal and Stripe.
//!
//! Each handler authenticates the notification, decodes it into a
//! [`PaymentEvent`](dockpay_core::PaymentEvent) and hands it to the
//! reconciler. Verification and decoding failures are client errors (400);
//! failures of the store, Stripe or the notifier are reported as 424 so the
//! provider redelivers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use dockpay_core::{MerchantConfig, PaymentEvent};

use crate::error::ApiError;
use crate::paypal::{self, Transmission};
use crate::state::AppState;
use crate::stripe::{verify_signature, DEFAULT_TOLERANCE_SECS};

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was processed.
    pub received: bool,
    /// `applied`, `unchanged` or `ignored`.
    pub outcome: &'static str,
    /// Line items recorded for the first time.
    pub line_items_added: usize,
    /// Emails and text messages delivered.
    pub notifications_sent: usize,
}

/// Handle PayPal webhooks.
pub async fn paypal_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let webhook_id = state
        .config
        .paypal_webhook_id
        .as_deref()
        .ok_or_else(|| ApiError::Internal("PayPal webhook id not configured".into()))?;

    let transmission = Transmission::from_headers(&headers).map_err(|header| {
        tracing::warn!(header, "PayPal webhook missing header");
        ApiError::BadRequest(format!("Missing {header} header"))
    })?;

    let certificate = state
        .certificates
        .resolve(&transmission.cert_url)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, cert_url = %transmission.cert_url, "PayPal certificate unavailable");
            ApiError::BadRequest("Unable to resolve signing certificate".into())
        })?;

    if !paypal::verify(
        Some(&certificate),
        &transmission.id,
        &transmission.time,
        webhook_id,
        &transmission.signature,
        &body,
    ) {
        tracing::warn!(transmission_id = %transmission.id, "Invalid PayPal webhook signature");
        return Err(ApiError::BadRequest("Invalid webhook signature".into()));
    }

    let event = dockpay_core::paypal::decode(&body).map_err(|e| {
        tracing::warn!(error = %e, transmission_id = %transmission.id, "Malformed PayPal webhook");
        ApiError::from(e)
    })?;

    reconcile(&state, &event).await
}

/// Handle Stripe webhooks.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    // Verify signature if webhook_secret is configured
    if let Some(secret) = &state.config.stripe_webhook_secret {
        let signature = headers
            .get("stripe-signature")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::BadRequest("Missing Stripe signature".into()))?;

        verify_signature(
            secret,
            &body,
            signature,
            DEFAULT_TOLERANCE_SECS,
            chrono::Utc::now().timestamp(),
        )
        .map_err(|e| {
            tracing::warn!(error = %e, "Invalid Stripe webhook signature");
            ApiError::BadRequest("Invalid webhook signature".into())
        })?;
    } else {
        tracing::warn!("Stripe webhook_secret not configured - skipping signature verification");
    }

    let event = dockpay_core::stripe::decode(body.as_bytes()).map_err(|e| {
        tracing::warn!(error = %e, "Malformed Stripe webhook");
        ApiError::from(e)
    })?;

    reconcile(&state, &event).await
}

async fn reconcile(state: &AppState, event: &PaymentEvent) -> Result<Json<WebhookResponse>, ApiError> {
    tracing::info!(
        provider = %event.provider(),
        event_type = %event.kind(),
        event_id = %event.event_id(),
        "Received webhook"
    );

    let merchant: Option<&MerchantConfig> = event
        .payment_key()
        .and_then(|key| state.merchants.for_account(&key.account));

    let result = state.reconciler().apply(event, merchant).await.map_err(|e| {
        tracing::error!(
            error = %e,
            provider = %event.provider(),
            event_type = %event.kind(),
            event_id = %event.event_id(),
            payment_key = ?event.payment_key().map(|k| k.to_string()),
            "Reconciliation failed"
        );
        ApiError::from(e)
    })?;

    Ok(Json(WebhookResponse {
        received: true,
        outcome: result.outcome.as_str(),
        line_items_added: result.line_items_added,
        notifications_sent: result.notifications_sent,
    }))
}
