//! Stripe API request and error types.
//!
//! Resource objects (`PaymentIntent`, `CheckoutSession`, `LineItem`) are
//! shared with the webhook decoder and live in `dockpay_core::stripe`.

use serde::Deserialize;

use dockpay_core::CheckoutQuote;

/// Stripe API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorResponse {
    /// Error details.
    pub error: StripeErrorDetail,
}

/// Stripe error detail.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorDetail {
    /// Error type.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message.
    #[serde(default)]
    pub message: String,
    /// Error code.
    #[serde(default)]
    pub code: Option<String>,
    /// Parameter that caused the error.
    #[serde(default)]
    pub param: Option<String>,
}

/// A hosted checkout to create for a priced cart.
#[derive(Debug, Clone)]
pub struct NewCheckoutSession {
    /// Priced cart, fee line included.
    pub quote: CheckoutQuote,
    /// Redirect after payment.
    pub success_url: String,
    /// Redirect after cancellation.
    pub cancel_url: String,
}

/// Description attached to every payment created through checkout.
pub const PAYMENT_DESCRIPTION: &str = "Ticket Purchase";

impl NewCheckoutSession {
    /// Form-encoded body for `POST /checkout/sessions`.
    ///
    /// The quote's application fee is collected by the platform; the
    /// remainder settles on the connected account.
    #[must_use]
    pub fn form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
            (
                "payment_intent_data[application_fee_amount]".to_string(),
                self.quote.application_fee_cents.to_string(),
            ),
            (
                "payment_intent_data[description]".to_string(),
                PAYMENT_DESCRIPTION.to_string(),
            ),
        ];

        for (i, item) in self.quote.line_items.iter().enumerate() {
            let prefix = format!("line_items[{i}]");
            form.push((format!("{prefix}[price_data][currency]"), item.currency.clone()));
            form.push((
                format!("{prefix}[price_data][product_data][name]"),
                item.name.clone(),
            ));
            if !item.sku.is_empty() {
                form.push((
                    format!("{prefix}[price_data][product_data][metadata][sku]"),
                    item.sku.clone(),
                ));
            }
            if !item.description.is_empty() {
                form.push((
                    format!("{prefix}[price_data][product_data][description]"),
                    item.description.clone(),
                ));
            }
            form.push((
                format!("{prefix}[price_data][unit_amount]"),
                item.unit_amount_cents.to_string(),
            ));
            form.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
        }

        form
    }
}
