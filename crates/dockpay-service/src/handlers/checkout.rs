//! Stripe checkout handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use dockpay_core::stripe::CheckoutSession;
use dockpay_core::{quote, AccountId, CartLineItem, MerchantConfig};

use crate::error::ApiError;
use crate::state::AppState;
use crate::stripe::{NewCheckoutSession, PaymentsApi};

/// Header naming the storefront page to return to after checkout.
pub const ORIGIN_HEADER: &str = "x-calendar-origin";

/// Placeholder Stripe replaces with the session id in redirect URLs.
const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

/// Checkout creation response.
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    /// Checkout session id, for the client-side redirect.
    pub id: String,
}

/// Create a Stripe checkout session for a cart.
pub async fn create_checkout(
    State(state): State<Arc<AppState>>,
    Path(merchant_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let merchant = super::merchant(&state, &merchant_id)?;
    let account = connected_account(merchant)?;

    let cart: Vec<CartLineItem> = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid cart: {e}")))?;
    let quote = quote(&cart)?;

    let stripe = stripe_client(&state)?;

    let origin = headers
        .get(ORIGIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(&state.config.frontend_url);

    let session = NewCheckoutSession {
        success_url: redirect_url(origin, "success"),
        cancel_url: redirect_url(origin, "cancelled"),
        quote,
    };

    let created = stripe
        .create_checkout_session(account, &session)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, merchant_id = %merchant.id, "Failed to create checkout session");
            ApiError::from(e)
        })?;

    tracing::info!(
        merchant_id = %merchant.id,
        account = %account,
        session_id = %created.id,
        total_cents = session.quote.total_cents,
        fee_cents = session.quote.fee_cents,
        "Checkout session created"
    );

    Ok(Json(CheckoutResponse { id: created.id }))
}

/// Retrieve a checkout session on the merchant's account.
///
/// The session comes back with its payment intent, latest charge, payment
/// method and first page of line items expanded.
pub async fn get_checkout(
    State(state): State<Arc<AppState>>,
    Path((merchant_id, session_id)): Path<(String, String)>,
) -> Result<Json<CheckoutSession>, ApiError> {
    let merchant = super::merchant(&state, &merchant_id)?;
    let account = connected_account(merchant)?;
    let stripe = stripe_client(&state)?;

    let session = stripe.get_checkout_session(account, &session_id).await?;
    Ok(Json(session))
}

fn connected_account(merchant: &MerchantConfig) -> Result<&AccountId, ApiError> {
    merchant.stripe_account.as_ref().ok_or_else(|| {
        ApiError::NotFound(format!("Merchant {} has no Stripe account", merchant.id))
    })
}

fn stripe_client(state: &AppState) -> Result<&Arc<dyn PaymentsApi>, ApiError> {
    state
        .stripe
        .as_ref()
        .ok_or_else(|| ApiError::FailedDependency("Stripe not configured".into()))
}

fn redirect_url(origin: &str, status: &str) -> String {
    let separator = if origin.contains('?') { '&' } else { '?' };
    format!("{origin}{separator}status={status}&stripe_session_id={SESSION_ID_PLACEHOLDER}")
}
