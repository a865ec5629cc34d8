//! Reconciled payment lookup.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use dockpay_core::{LineItemRecord, PaymentId, PaymentKey, PaymentRecord};

use crate::error::ApiError;
use crate::state::AppState;

/// A payment with its purchased items.
#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    /// Payment id.
    pub id: String,
    /// `paypal` or `stripe`.
    pub provider: String,
    /// Amount in cents.
    pub amount_cents: i64,
    /// Amount formatted as dollars.
    pub amount_formatted: String,
    /// Currency.
    pub currency: String,
    /// Payer email.
    pub email: String,
    /// Payer name.
    pub name: String,
    /// `created`, `succeeded` or `refunded`.
    pub status: String,
    /// Hosted receipt.
    pub receipt_url: Option<String>,
    /// Created timestamp (ISO 8601).
    pub created_at: String,
    /// Purchased items.
    pub line_items: Vec<LineItemResponse>,
}

/// One purchased item.
#[derive(Debug, Serialize)]
pub struct LineItemResponse {
    /// Line item id.
    pub id: String,
    /// Quantity.
    pub quantity: i64,
    /// SKU.
    pub sku: String,
    /// Product name.
    pub name: String,
    /// Product description.
    pub description: String,
    /// Unit price in cents.
    pub unit_price_cents: i64,
    /// Line total in cents.
    pub amount_cents: i64,
}

impl From<&LineItemRecord> for LineItemResponse {
    fn from(item: &LineItemRecord) -> Self {
        Self {
            id: item.id.to_string(),
            quantity: item.quantity,
            sku: item.sku.clone(),
            name: item.name.clone(),
            description: item.description.clone(),
            unit_price_cents: item.unit_price_cents,
            amount_cents: item.amount_cents,
        }
    }
}

impl PaymentResponse {
    fn new(payment: &PaymentRecord, items: &[LineItemRecord]) -> Self {
        Self {
            id: payment.payment_id.to_string(),
            provider: payment.provider.to_string(),
            amount_cents: payment.amount_cents,
            amount_formatted: format!("${}", dockpay_core::format_minor_units(payment.amount_cents)),
            currency: payment.currency.clone(),
            email: payment.email.clone(),
            name: payment.name.clone(),
            status: payment.status.to_string(),
            receipt_url: payment.receipt_url.clone(),
            created_at: payment.created_at.to_rfc3339(),
            line_items: items.iter().map(LineItemResponse::from).collect(),
        }
    }
}

/// Get a reconciled payment of a merchant.
///
/// The payment is looked up under each account the merchant owns. A store
/// failure is a `424`.
pub async fn get_payment(
    State(state): State<Arc<AppState>>,
    Path((merchant_id, payment_id)): Path<(String, String)>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let merchant = super::merchant(&state, &merchant_id)?;
    let payment_id = PaymentId::new(payment_id)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let accounts = [&merchant.stripe_account, &merchant.paypal_merchant_id];
    for account in accounts.into_iter().flatten() {
        let key = PaymentKey::new(payment_id.clone(), account.clone());
        if let Some(payment) = state.store.get_payment(&key)? {
            let items = state.store.list_line_items(&key)?;
            return Ok(Json(PaymentResponse::new(&payment, &items)));
        }
    }

    Err(ApiError::NotFound(format!("Payment not found: {payment_id}")))
}
