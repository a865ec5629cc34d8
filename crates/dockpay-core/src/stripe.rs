//! Stripe webhook payloads.
//!
//! Stripe wraps every object in an event envelope. The envelope `type` decides
//! how `data.object` must be decoded:
//!
//! | `type` | object |
//! |---|---|
//! | `payment_intent.succeeded` | [`PaymentIntent`] |
//! | `checkout.session.completed` | [`CheckoutSession`] |
//! | `charge.refunded` | [`Charge`] |
//!
//! Other types decode to [`PaymentEvent::Unrecognized`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::event::{PaymentEvent, UnrecognizedEvent};
use crate::ids::{AccountId, EventId, PaymentId, PaymentKey};
use crate::ledger::Provider;

const PROVIDER: &str = "stripe";

/// Event type for a succeeded payment intent.
pub const PAYMENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";
/// Event type for a completed checkout session.
pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
/// Event type for a refunded charge.
pub const CHARGE_REFUNDED: &str = "charge.refunded";

#[derive(Debug, Clone, Deserialize)]
struct Envelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    account: Option<String>,
    #[serde(default)]
    created: i64,
    data: EnvelopeData,
}

#[derive(Debug, Clone, Deserialize)]
struct EnvelopeData {
    object: serde_json::Value,
}

/// A decoded Stripe event carrying a typed object.
#[derive(Debug, Clone)]
pub struct StripeEvent<T> {
    /// Event id (`evt_…`).
    pub id: EventId,
    /// Connected account the event belongs to, or the platform scope.
    pub account: AccountId,
    /// When Stripe created the event.
    pub created: DateTime<Utc>,
    /// The typed `data.object`.
    pub object: T,
}

/// A Stripe field that is either an id or, when expanded, the full object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    /// Unexpanded id.
    Id(String),
    /// Expanded object.
    Object(Box<T>),
}

/// Objects carrying a Stripe id.
pub trait Identified {
    /// The object id.
    fn id(&self) -> &str;
}

impl<T: Identified> Expandable<T> {
    /// The id, whether expanded or not.
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Object(object) => object.id(),
        }
    }

    /// The expanded object, if present.
    pub fn object(&self) -> Option<&T> {
        match self {
            Self::Id(_) => None,
            Self::Object(object) => Some(object),
        }
    }
}

/// Stripe list response wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeList<T> {
    /// Object type (always "list").
    #[serde(default)]
    pub object: String,
    /// Data items.
    pub data: Vec<T>,
    /// Whether there are more items.
    #[serde(default)]
    pub has_more: bool,
    /// URL for the list endpoint.
    #[serde(default)]
    pub url: Option<String>,
}

/// Billing details captured on a charge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingDetails {
    /// Billing email.
    #[serde(default)]
    pub email: Option<String>,
    /// Billing name.
    #[serde(default)]
    pub name: Option<String>,
    /// Billing phone.
    #[serde(default)]
    pub phone: Option<String>,
}

/// Stripe `Charge` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    /// Charge id (`ch_…`).
    pub id: String,
    /// Amount in cents.
    #[serde(default)]
    pub amount: i64,
    /// Amount refunded in cents.
    #[serde(default)]
    pub amount_refunded: i64,
    /// Currency.
    #[serde(default)]
    pub currency: String,
    /// Whether the charge is fully refunded.
    #[serde(default)]
    pub refunded: bool,
    /// Payment intent the charge belongs to.
    #[serde(default)]
    pub payment_intent: Option<Expandable<PaymentIntent>>,
    /// Hosted receipt.
    #[serde(default)]
    pub receipt_url: Option<String>,
    /// Billing details.
    #[serde(default)]
    pub billing_details: BillingDetails,
    /// Created timestamp (Unix).
    #[serde(default)]
    pub created: i64,
}

impl Identified for Charge {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Stripe `PaymentIntent` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Payment intent id (`pi_…`).
    pub id: String,
    /// Amount in cents.
    #[serde(default)]
    pub amount: i64,
    /// Currency (e.g., "usd").
    #[serde(default)]
    pub currency: String,
    /// Status (succeeded, processing, canceled, ...).
    #[serde(default)]
    pub status: String,
    /// Created timestamp (Unix).
    #[serde(default)]
    pub created: i64,
    /// Receipt email.
    #[serde(default)]
    pub receipt_email: Option<String>,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Charges (API versions before 2022-11-15).
    #[serde(default)]
    pub charges: Option<StripeList<Charge>>,
    /// Latest charge (newer API versions).
    #[serde(default)]
    pub latest_charge: Option<Expandable<Charge>>,
    /// Payment method used.
    #[serde(default)]
    pub payment_method: Option<Expandable<PaymentMethod>>,
    /// Metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Identified for PaymentIntent {
    fn id(&self) -> &str {
        &self.id
    }
}

impl PaymentIntent {
    /// The charge carrying billing details, if any was included.
    #[must_use]
    pub fn primary_charge(&self) -> Option<&Charge> {
        self.charges
            .as_ref()
            .and_then(|list| list.data.first())
            .or_else(|| self.latest_charge.as_ref().and_then(Expandable::object))
    }

    /// Payer email: billing email first, then the receipt email.
    #[must_use]
    pub fn payer_email(&self) -> Option<&str> {
        self.primary_charge()
            .and_then(|c| c.billing_details.email.as_deref())
            .or(self.receipt_email.as_deref())
            .filter(|e| !e.is_empty())
    }

    /// Payer name from the billing details.
    #[must_use]
    pub fn payer_name(&self) -> Option<&str> {
        self.primary_charge()
            .and_then(|c| c.billing_details.name.as_deref())
            .filter(|n| !n.is_empty())
    }

    /// Hosted receipt URL of the primary charge.
    #[must_use]
    pub fn receipt_url(&self) -> Option<&str> {
        self.primary_charge().and_then(|c| c.receipt_url.as_deref())
    }
}

/// Card summary on a payment method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetails {
    /// Card brand, e.g. `visa`.
    #[serde(default)]
    pub brand: String,
    /// Last four digits.
    #[serde(default)]
    pub last4: String,
}

/// Stripe `PaymentMethod` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    /// Payment method id (`pm_…`).
    pub id: String,
    /// Method type, e.g. `card`.
    #[serde(default, rename = "type")]
    pub method_type: String,
    /// Card summary, for card payments.
    #[serde(default)]
    pub card: Option<CardDetails>,
    /// Billing details.
    #[serde(default)]
    pub billing_details: BillingDetails,
}

impl Identified for PaymentMethod {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Customer details collected by Checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    /// Customer email.
    #[serde(default)]
    pub email: Option<String>,
    /// Customer name.
    #[serde(default)]
    pub name: Option<String>,
}

/// Stripe Checkout session object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Session id (`cs_…`).
    pub id: String,
    /// Checkout URL to redirect the user to.
    #[serde(default)]
    pub url: Option<String>,
    /// Payment status (`paid`, `unpaid`, `no_payment_required`).
    #[serde(default)]
    pub payment_status: Option<String>,
    /// Session status.
    #[serde(default)]
    pub status: Option<String>,
    /// Total amount in cents.
    #[serde(default)]
    pub amount_total: Option<i64>,
    /// Currency.
    #[serde(default)]
    pub currency: Option<String>,
    /// Payment intent created by the session.
    #[serde(default)]
    pub payment_intent: Option<Expandable<PaymentIntent>>,
    /// Customer details collected during checkout.
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    /// First page of line items, when expanded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_items: Option<StripeList<LineItem>>,
    /// Metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    /// Whether Stripe reports the session as paid.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some("paid")
    }
}

/// Stripe product, as expanded on a line item price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product id.
    pub id: String,
    /// Product name.
    #[serde(default)]
    pub name: String,
    /// Product description, if the storefront sent one.
    #[serde(default)]
    pub description: Option<String>,
    /// Metadata (`sku` is set at checkout creation).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Identified for Product {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Stripe price, as attached to a line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Price id.
    pub id: String,
    /// Unit amount in cents.
    #[serde(default)]
    pub unit_amount: Option<i64>,
    /// Currency.
    #[serde(default)]
    pub currency: String,
    /// Product, expanded when requested.
    #[serde(default)]
    pub product: Option<Expandable<Product>>,
}

/// One line item of a checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Line item id (`li_…`).
    pub id: String,
    /// Quantity.
    #[serde(default)]
    pub quantity: i64,
    /// Line total in cents.
    #[serde(default)]
    pub amount_total: i64,
    /// Currency.
    #[serde(default)]
    pub currency: String,
    /// Description (defaults to the product name).
    #[serde(default)]
    pub description: Option<String>,
    /// Price.
    #[serde(default)]
    pub price: Option<Price>,
}

impl Identified for LineItem {
    fn id(&self) -> &str {
        &self.id
    }
}

impl LineItem {
    fn product(&self) -> Option<&Product> {
        self.price
            .as_ref()
            .and_then(|p| p.product.as_ref())
            .and_then(Expandable::object)
    }

    /// Product name, falling back to the description.
    #[must_use]
    pub fn name(&self) -> String {
        self.product()
            .map(|p| p.name.clone())
            .filter(|n| !n.is_empty())
            .or_else(|| self.description.clone())
            .unwrap_or_default()
    }

    /// Product description, empty if none.
    ///
    /// The line item's own `description` is not used: Stripe fills it with
    /// the product name.
    #[must_use]
    pub fn product_description(&self) -> String {
        self.product()
            .and_then(|p| p.description.clone())
            .unwrap_or_default()
    }

    /// SKU stored on the product metadata.
    #[must_use]
    pub fn sku(&self) -> String {
        self.product()
            .and_then(|p| p.metadata.get("sku").cloned())
            .unwrap_or_default()
    }

    /// Unit price in cents.
    #[must_use]
    pub fn unit_amount(&self) -> i64 {
        self.price
            .as_ref()
            .and_then(|p| p.unit_amount)
            .unwrap_or_default()
    }
}

impl<T> StripeEvent<T> {
    fn key_for(&self, payment_intent: Option<&str>) -> Option<PaymentKey> {
        let id = PaymentId::new(payment_intent?).ok()?;
        Some(PaymentKey::new(id, self.account.clone()))
    }
}

impl StripeEvent<PaymentIntent> {
    /// Ledger key of the payment intent.
    #[must_use]
    pub fn payment_key(&self) -> Option<PaymentKey> {
        self.key_for(Some(&self.object.id))
    }
}

impl StripeEvent<CheckoutSession> {
    /// Ledger key of the payment completed by this session.
    #[must_use]
    pub fn payment_key(&self) -> Option<PaymentKey> {
        self.key_for(self.object.payment_intent.as_ref().map(Expandable::id))
    }
}

impl StripeEvent<Charge> {
    /// Ledger key of the payment the charge belongs to.
    #[must_use]
    pub fn payment_key(&self) -> Option<PaymentKey> {
        self.key_for(self.object.payment_intent.as_ref().map(Expandable::id))
    }
}

/// Decode a raw Stripe event body.
///
/// # Errors
///
/// Returns `DecodeError::MalformedPayload` if the envelope is not valid JSON,
/// `data.object` does not match the declared `type`, or the object lacks the
/// identifier reconciliation is keyed on.
pub fn decode(body: &[u8]) -> Result<PaymentEvent, DecodeError> {
    let envelope: Envelope =
        serde_json::from_slice(body).map_err(|e| DecodeError::malformed(PROVIDER, e.to_string()))?;

    match envelope.event_type.as_str() {
        PAYMENT_INTENT_SUCCEEDED => {
            let intent: PaymentIntent = decode_object(&envelope)?;
            require_id(&intent.id, "payment intent id")?;
            Ok(PaymentEvent::StripePaymentIntentSucceeded(wrap(envelope, intent)?))
        }
        CHECKOUT_SESSION_COMPLETED => {
            let session: CheckoutSession = decode_object(&envelope)?;
            require_id(
                session.payment_intent.as_ref().map_or("", Expandable::id),
                "checkout session payment_intent",
            )?;
            Ok(PaymentEvent::StripeCheckoutSessionCompleted(wrap(envelope, session)?))
        }
        CHARGE_REFUNDED => {
            let charge: Charge = decode_object(&envelope)?;
            require_id(
                charge.payment_intent.as_ref().map_or("", Expandable::id),
                "charge payment_intent",
            )?;
            Ok(PaymentEvent::StripeChargeRefunded(wrap(envelope, charge)?))
        }
        other => Ok(PaymentEvent::Unrecognized(UnrecognizedEvent {
            provider: Provider::Stripe,
            discriminator: other.to_string(),
            event_id: envelope.id,
        })),
    }
}

fn require_id(id: &str, what: &str) -> Result<(), DecodeError> {
    if id.trim().is_empty() {
        Err(DecodeError::malformed(PROVIDER, format!("missing {what}")))
    } else {
        Ok(())
    }
}

fn decode_object<T: serde::de::DeserializeOwned>(envelope: &Envelope) -> Result<T, DecodeError> {
    T::deserialize(&envelope.data.object).map_err(|e| {
        DecodeError::malformed(PROVIDER, format!("{} object: {e}", envelope.event_type))
    })
}

fn wrap<T>(envelope: Envelope, object: T) -> Result<StripeEvent<T>, DecodeError> {
    let id = EventId::new(envelope.id).map_err(|e| DecodeError::malformed(PROVIDER, e.to_string()))?;
    let account = envelope
        .account
        .and_then(|a| AccountId::new(a).ok())
        .unwrap_or_else(AccountId::platform);
    let created = DateTime::from_timestamp(envelope.created, 0).unwrap_or_else(Utc::now);
    Ok(StripeEvent {
        id,
        account,
        created,
        object,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: &str, object: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_1",
            "type": event_type,
            "account": "acct_123",
            "created": 1_700_000_000,
            "data": {"object": object}
        }))
        .unwrap()
    }

    #[test]
    fn decodes_payment_intent_with_charges() {
        let body = event(
            PAYMENT_INTENT_SUCCEEDED,
            json!({
                "id": "pi_1",
                "amount": 2500,
                "currency": "usd",
                "status": "succeeded",
                "created": 1_700_000_000,
                "charges": {"object": "list", "has_more": false, "data": [{
                    "id": "ch_1",
                    "receipt_url": "https://pay.stripe.com/receipts/1",
                    "billing_details": {"email": "jo@example.com", "name": "Jo"}
                }]}
            }),
        );

        let PaymentEvent::StripePaymentIntentSucceeded(event) = decode(&body).unwrap() else {
            panic!("expected payment intent event");
        };
        assert_eq!(event.account.as_str(), "acct_123");
        assert_eq!(event.created.timestamp(), 1_700_000_000);
        assert_eq!(event.object.payer_email(), Some("jo@example.com"));
        assert_eq!(event.object.payer_name(), Some("Jo"));
        assert_eq!(
            event.object.receipt_url(),
            Some("https://pay.stripe.com/receipts/1")
        );
    }

    #[test]
    fn expanded_checkout_session_exposes_charge_method_and_items() {
        let session: CheckoutSession = serde_json::from_value(json!({
            "id": "cs_1",
            "payment_status": "paid",
            "payment_intent": {
                "id": "pi_1",
                "amount": 5300,
                "latest_charge": {
                    "id": "ch_1",
                    "receipt_url": "https://pay.stripe.com/receipts/1",
                    "billing_details": {"email": "jo@example.com", "name": "Jo"}
                },
                "payment_method": {
                    "id": "pm_1",
                    "type": "card",
                    "card": {"brand": "visa", "last4": "4242"}
                }
            },
            "line_items": {"object": "list", "has_more": false, "data": [
                {"id": "li_1", "quantity": 2, "amount_total": 5000, "description": "Harbor Tour"}
            ]}
        }))
        .unwrap();

        let intent = session.payment_intent.as_ref().and_then(Expandable::object).unwrap();
        assert_eq!(intent.receipt_url(), Some("https://pay.stripe.com/receipts/1"));
        let method = intent.payment_method.as_ref().and_then(Expandable::object).unwrap();
        assert_eq!(method.method_type, "card");
        assert_eq!(method.card.as_ref().unwrap().last4, "4242");
        assert_eq!(session.line_items.as_ref().unwrap().data[0].name(), "Harbor Tour");
    }

    #[test]
    fn payment_intent_falls_back_to_latest_charge_and_receipt_email() {
        let body = event(
            PAYMENT_INTENT_SUCCEEDED,
            json!({"id": "pi_2", "receipt_email": "r@example.com", "latest_charge": "ch_9"}),
        );
        let PaymentEvent::StripePaymentIntentSucceeded(event) = decode(&body).unwrap() else {
            panic!("expected payment intent event");
        };
        assert_eq!(event.object.payer_email(), Some("r@example.com"));
        assert!(event.object.payer_name().is_none());
    }

    #[test]
    fn decodes_checkout_session_with_unexpanded_intent() {
        let body = event(
            CHECKOUT_SESSION_COMPLETED,
            json!({"id": "cs_1", "payment_status": "paid", "payment_intent": "pi_7"}),
        );
        let PaymentEvent::StripeCheckoutSessionCompleted(event) = decode(&body).unwrap() else {
            panic!("expected checkout event");
        };
        assert!(event.object.is_paid());
        assert_eq!(event.payment_key().unwrap().to_string(), "pi_7@acct_123");
    }

    #[test]
    fn checkout_session_without_intent_is_malformed() {
        let body = event(CHECKOUT_SESSION_COMPLETED, json!({"id": "cs_1"}));
        assert!(matches!(
            decode(&body),
            Err(DecodeError::MalformedPayload { provider: "stripe", .. })
        ));
    }

    #[test]
    fn decodes_refunded_charge() {
        let body = event(
            CHARGE_REFUNDED,
            json!({"id": "ch_1", "refunded": true, "amount_refunded": 2500, "payment_intent": "pi_1"}),
        );
        let PaymentEvent::StripeChargeRefunded(event) = decode(&body).unwrap() else {
            panic!("expected refund event");
        };
        assert_eq!(
            event.object.payment_intent.as_ref().map(Expandable::id),
            Some("pi_1")
        );
    }

    #[test]
    fn wrong_shape_for_known_type_is_malformed() {
        let body = event(PAYMENT_INTENT_SUCCEEDED, json!({"amount": "lots"}));
        assert!(decode(&body).is_err());
    }

    #[test]
    fn unknown_type_is_unrecognized() {
        let body = event("customer.created", json!({"id": "cus_1"}));
        assert!(matches!(
            decode(&body).unwrap(),
            PaymentEvent::Unrecognized(UnrecognizedEvent { provider: Provider::Stripe, .. })
        ));
    }

    #[test]
    fn missing_account_uses_platform_scope() {
        let body = serde_json::to_vec(&json!({
            "id": "evt_2",
            "type": PAYMENT_INTENT_SUCCEEDED,
            "data": {"object": {"id": "pi_3"}}
        }))
        .unwrap();
        let PaymentEvent::StripePaymentIntentSucceeded(event) = decode(&body).unwrap() else {
            panic!("expected payment intent event");
        };
        assert_eq!(event.account, AccountId::platform());
    }

    #[test]
    fn line_item_reads_expanded_product() {
        let item: LineItem = serde_json::from_value(json!({
            "id": "li_1",
            "quantity": 2,
            "amount_total": 5000,
            "currency": "usd",
            "description": "Adult ticket",
            "price": {
                "id": "price_1",
                "unit_amount": 2500,
                "currency": "usd",
                "product": {
                    "id": "prod_1",
                    "name": "Sunset cruise",
                    "description": "Two hours on the bay",
                    "metadata": {"sku": "SUN-1"}
                }
            }
        }))
        .unwrap();
        assert_eq!(item.name(), "Sunset cruise");
        assert_eq!(item.product_description(), "Two hours on the bay");
        assert_eq!(item.sku(), "SUN-1");
        assert_eq!(item.unit_amount(), 2500);

        let bare: LineItem = serde_json::from_value(json!({
            "id": "li_2", "description": "Parking", "price": {"id": "price_2", "product": "prod_2"}
        }))
        .unwrap();
        assert_eq!(bare.name(), "Parking");
        assert_eq!(bare.product_description(), "");
        assert_eq!(bare.sku(), "");
    }
}
