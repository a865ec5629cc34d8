//! PayPal webhook payloads.
//!
//! A PayPal notification is an envelope whose `resource_type` selects the shape
//! of the embedded `resource`:
//!
//! - `payment` → [`Payment`], whose transactions carry a list of
//!   heterogeneous related resources. Each entry is a single-key object such as
//!   `{"sale": {...}}` or `{"authorization": {...}}`; only sales are decoded,
//!   every other kind is skipped.
//! - `sale` → [`Sale`]
//!
//! Any other `resource_type` decodes to [`PaymentEvent::Unrecognized`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::error::{DecodeError, MoneyError};
use crate::event::{PaymentEvent, UnrecognizedEvent};
use crate::ids::{AccountId, EventId, PaymentId, PaymentKey};
use crate::ledger::{PaymentStatus, Provider};
use crate::money::{normalize_currency, parse_minor_units};

const PROVIDER: &str = "paypal";

/// The outer PayPal notification.
#[derive(Debug, Clone, Deserialize)]
struct Envelope {
    id: String,
    #[serde(default)]
    create_time: Option<DateTime<Utc>>,
    resource_type: String,
    #[serde(default)]
    event_type: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    resource: serde_json::Value,
}

/// A decoded PayPal notification carrying a typed resource.
#[derive(Debug, Clone)]
pub struct PayPalEvent<T> {
    /// Notification id.
    pub id: EventId,
    /// PayPal event type, e.g. `PAYMENTS.PAYMENT.CREATED`.
    pub event_type: String,
    /// Human readable summary.
    pub summary: String,
    /// When PayPal created the notification.
    pub create_time: Option<DateTime<Utc>>,
    /// The typed resource.
    pub resource: T,
}

/// Amount as PayPal sends it: a decimal string and a currency.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Amount {
    /// Decimal total, e.g. `"30.11"`.
    pub total: String,
    /// Currency code.
    #[serde(default)]
    pub currency: String,
}

impl Amount {
    /// The total in cents.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError` if `total` is not a decimal.
    pub fn cents(&self) -> Result<i64, MoneyError> {
        parse_minor_units(&self.total)
    }
}

/// Merchant receiving the funds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Payee {
    /// PayPal merchant id.
    #[serde(default)]
    pub merchant_id: Option<String>,
    /// Merchant email.
    #[serde(default)]
    pub email: Option<String>,
}

/// Payer details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PayerInfo {
    /// Payer email.
    #[serde(default)]
    pub email: Option<String>,
    /// Given name.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Family name.
    #[serde(default)]
    pub last_name: Option<String>,
    /// PayPal payer id.
    #[serde(default)]
    pub payer_id: Option<String>,
    /// Phone.
    #[serde(default)]
    pub phone: Option<String>,
    /// Country code.
    #[serde(default)]
    pub country_code: Option<String>,
}

impl PayerInfo {
    /// First and last name joined, if any part is present.
    #[must_use]
    pub fn full_name(&self) -> Option<String> {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!name.is_empty()).then_some(name)
    }
}

/// Payer section of a payment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Payer {
    /// Funding method, e.g. `paypal`.
    #[serde(default)]
    pub payment_method: Option<String>,
    /// Payer verification status.
    #[serde(default)]
    pub status: Option<String>,
    /// Payer details.
    #[serde(default)]
    pub payer_info: PayerInfo,
}

/// Fee PayPal charged on a sale.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Currency {
    /// Decimal value.
    pub value: String,
    /// Currency code.
    #[serde(default)]
    pub currency: String,
}

/// A PayPal sale: the capture of funds for a payment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Sale {
    /// Sale id.
    pub id: String,
    /// Sale state: `completed`, `pending`, `refunded`, ...
    #[serde(default)]
    pub state: String,
    /// Amount captured.
    pub amount: Amount,
    /// Payment mode, e.g. `INSTANT_TRANSFER`.
    #[serde(default)]
    pub payment_mode: Option<String>,
    /// Fee PayPal withheld.
    #[serde(default)]
    pub transaction_fee: Option<Currency>,
    /// Payment the sale belongs to.
    #[serde(default)]
    pub parent_payment: Option<String>,
    /// Merchant invoice number.
    #[serde(default)]
    pub invoice_number: Option<String>,
    /// Creation time.
    #[serde(default)]
    pub create_time: Option<DateTime<Utc>>,
    /// Last update time.
    #[serde(default)]
    pub update_time: Option<DateTime<Utc>>,
}

/// A related resource embedded in a transaction. Only sales are recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelatedResource {
    /// A sale capturing the transaction.
    Sale(Sale),
}

/// One purchased item of a transaction's item list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransactionItem {
    /// Item name.
    #[serde(default)]
    pub name: String,
    /// Merchant SKU.
    #[serde(default)]
    pub sku: Option<String>,
    /// Decimal unit price.
    #[serde(default)]
    pub price: Option<String>,
    /// Currency code.
    #[serde(default)]
    pub currency: Option<String>,
    /// Quantity; PayPal sends it as a string.
    #[serde(default = "one", deserialize_with = "crate::fees::int_or_string")]
    pub quantity: i64,
    /// Item description.
    #[serde(default)]
    pub description: Option<String>,
}

const fn one() -> i64 {
    1
}

/// Items of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ItemList {
    /// Items, in cart order.
    #[serde(default)]
    pub items: Vec<TransactionItem>,
}

/// One transaction of a payment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Transaction {
    /// Transaction amount.
    pub amount: Amount,
    /// Receiving merchant.
    #[serde(default)]
    pub payee: Payee,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Soft descriptor shown on statements.
    #[serde(default)]
    pub soft_descriptor: Option<String>,
    /// Purchased items.
    #[serde(default)]
    pub item_list: ItemList,
    /// Recognized related resources, in payload order.
    #[serde(default, deserialize_with = "related_resources")]
    pub related_resources: Vec<RelatedResource>,
}

/// A PayPal payment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Payment {
    /// Payment id, e.g. `PAY-…`.
    pub id: String,
    /// Payment state: `created`, `approved`, `failed`.
    #[serde(default)]
    pub state: String,
    /// Payment intent: `sale`, `authorize`, `order`.
    #[serde(default)]
    pub intent: Option<String>,
    /// Cart id.
    #[serde(default)]
    pub cart: Option<String>,
    /// Payer.
    #[serde(default)]
    pub payer: Payer,
    /// Transactions.
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    /// Creation time.
    #[serde(default)]
    pub create_time: Option<DateTime<Utc>>,
    /// Last update time.
    #[serde(default)]
    pub update_time: Option<DateTime<Utc>>,
}

impl Payment {
    /// Account scope: the first transaction's payee merchant id, else the platform.
    #[must_use]
    pub fn account(&self) -> AccountId {
        self.transactions
            .iter()
            .find_map(|t| t.payee.merchant_id.as_deref())
            .and_then(|id| AccountId::new(id).ok())
            .unwrap_or_else(AccountId::platform)
    }

    /// Ledger key of this payment.
    ///
    /// # Errors
    ///
    /// Returns `IdError` if the payment id is blank.
    pub fn key(&self) -> Result<PaymentKey, crate::ids::IdError> {
        Ok(PaymentKey::new(PaymentId::new(&self.id)?, self.account()))
    }

    /// All sales across all transactions.
    pub fn sales(&self) -> impl Iterator<Item = &Sale> {
        self.transactions
            .iter()
            .flat_map(|t| t.related_resources.iter())
            .map(|r| match r {
                RelatedResource::Sale(sale) => sale,
            })
    }

    /// Purchased items across all transactions.
    pub fn items(&self) -> impl Iterator<Item = &TransactionItem> {
        self.transactions.iter().flat_map(|t| t.item_list.items.iter())
    }

    /// Settlement status implied by the payment state and its sales.
    #[must_use]
    pub fn settlement_status(&self) -> PaymentStatus {
        if self.sales().any(|s| s.state == "refunded") {
            PaymentStatus::Refunded
        } else if self.state == "approved" || self.sales().any(|s| s.state == "completed") {
            PaymentStatus::Succeeded
        } else {
            PaymentStatus::Created
        }
    }

    /// Sum of the transaction totals in cents.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError` if a total is not a decimal or the sum overflows.
    pub fn total_cents(&self) -> Result<i64, MoneyError> {
        self.transactions.iter().try_fold(0i64, |acc, t| {
            let cents = t.amount.cents()?;
            acc.checked_add(cents)
                .ok_or_else(|| MoneyError::OutOfRange(t.amount.total.clone()))
        })
    }

    /// Currency of the first transaction.
    #[must_use]
    pub fn currency(&self) -> Option<String> {
        self.transactions
            .first()
            .map(|t| normalize_currency(&t.amount.currency))
    }
}

/// Keep `sale` entries of a `related_resources` list and skip the rest.
///
/// A `sale` entry that does not decode as a [`Sale`] is an error.
fn related_resources<'de, D>(deserializer: D) -> Result<Vec<RelatedResource>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries: Option<Vec<serde_json::Map<String, serde_json::Value>>> =
        Option::deserialize(deserializer)?;

    let mut resources = Vec::new();
    for entry in entries.unwrap_or_default() {
        for (kind, value) in entry {
            if kind == "sale" {
                let sale = Sale::deserialize(value).map_err(serde::de::Error::custom)?;
                resources.push(RelatedResource::Sale(sale));
            }
        }
    }
    Ok(resources)
}

/// Decode a raw PayPal notification body.
///
/// # Errors
///
/// Returns `DecodeError::MalformedPayload` if the envelope is not valid JSON,
/// or the resource does not match its declared `resource_type`.
pub fn decode(body: &[u8]) -> Result<PaymentEvent, DecodeError> {
    let envelope: Envelope =
        serde_json::from_slice(body).map_err(|e| DecodeError::malformed(PROVIDER, e.to_string()))?;

    match envelope.resource_type.as_str() {
        "payment" => {
            let payment: Payment = decode_resource(&envelope)?;
            if payment.id.trim().is_empty() {
                return Err(DecodeError::malformed(PROVIDER, "payment without id"));
            }
            Ok(PaymentEvent::PayPalPaymentCompleted(wrap(envelope, payment)?))
        }
        "sale" => {
            let sale: Sale = decode_resource(&envelope)?;
            Ok(PaymentEvent::PayPalSaleCompleted(wrap(envelope, sale)?))
        }
        other => Ok(PaymentEvent::Unrecognized(UnrecognizedEvent {
            provider: Provider::PayPal,
            discriminator: other.to_string(),
            event_id: envelope.id,
        })),
    }
}

fn decode_resource<T: serde::de::DeserializeOwned>(envelope: &Envelope) -> Result<T, DecodeError> {
    T::deserialize(&envelope.resource).map_err(|e| {
        DecodeError::malformed(
            PROVIDER,
            format!("{} resource: {e}", envelope.resource_type),
        )
    })
}

fn wrap<T>(envelope: Envelope, resource: T) -> Result<PayPalEvent<T>, DecodeError> {
    let id = EventId::new(envelope.id).map_err(|e| DecodeError::malformed(PROVIDER, e.to_string()))?;
    Ok(PayPalEvent {
        id,
        event_type: envelope.event_type,
        summary: envelope.summary,
        create_time: envelope.create_time,
        resource,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payment_body(related: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "WH-2WR32451HC0233532-67976317FL4543714",
            "create_time": "2014-10-23T17:23:52Z",
            "resource_type": "payment",
            "event_type": "PAYMENTS.PAYMENT.CREATED",
            "summary": "A payment was created",
            "resource": {
                "id": "PAY-1B56960729604235TKQQIYVY",
                "state": "approved",
                "intent": "sale",
                "create_time": "2014-10-23T17:22:56Z",
                "payer": {
                    "payment_method": "paypal",
                    "payer_info": {
                        "email": "buyer@example.com",
                        "first_name": "Betsy",
                        "last_name": "Buyer",
                        "payer_id": "CR87QHB7JTRSC"
                    }
                },
                "transactions": [{
                    "amount": {"total": "30.11", "currency": "USD"},
                    "payee": {"merchant_id": "MERCH123", "email": "seller@example.com"},
                    "description": "Sunset cruise",
                    "item_list": {"items": [
                        {"name": "Adult", "sku": "SUN-A", "price": "20.11", "currency": "USD",
                         "quantity": "1", "description": "Upper deck"},
                        {"name": "Child", "price": "10.00", "currency": "USD", "quantity": 1}
                    ]},
                    "related_resources": related
                }]
            }
        }))
        .unwrap()
    }

    #[test]
    fn sale_related_resource_is_extracted() {
        let body = payment_body(json!([
            {"sale": {"id": "36C38912MN9658832", "state": "completed",
                      "amount": {"total": "30.11", "currency": "USD"},
                      "parent_payment": "PAY-1B56960729604235TKQQIYVY"}}
        ]));

        let PaymentEvent::PayPalPaymentCompleted(event) = decode(&body).unwrap() else {
            panic!("expected payment event");
        };
        let sales: Vec<_> = event.resource.sales().collect();
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].id, "36C38912MN9658832");
        assert_eq!(sales[0].amount.cents().unwrap(), 3011);
        assert_eq!(event.event_type, "PAYMENTS.PAYMENT.CREATED");
    }

    #[test]
    fn other_related_resources_are_skipped() {
        let body = payment_body(json!([
            {"authorization": {"id": "AUTH-1", "state": "authorized"}},
            {"refund": {"id": "REF-1"}},
            {"sale": {"id": "SALE-1", "state": "completed",
                      "amount": {"total": "1.00", "currency": "USD"}}}
        ]));

        let PaymentEvent::PayPalPaymentCompleted(event) = decode(&body).unwrap() else {
            panic!("expected payment event");
        };
        let transaction = &event.resource.transactions[0];
        assert_eq!(transaction.related_resources.len(), 1);
        assert!(matches!(
            &transaction.related_resources[0],
            RelatedResource::Sale(s) if s.id == "SALE-1"
        ));
    }

    #[test]
    fn only_unknown_related_resources_yields_empty_collection() {
        let body = payment_body(json!([{"order": {"id": "O-1"}}]));
        let PaymentEvent::PayPalPaymentCompleted(event) = decode(&body).unwrap() else {
            panic!("expected payment event");
        };
        assert!(event.resource.transactions[0].related_resources.is_empty());
    }

    #[test]
    fn malformed_sale_entry_is_an_error() {
        let body = payment_body(json!([{"sale": {"state": "completed"}}]));
        assert!(matches!(
            decode(&body),
            Err(DecodeError::MalformedPayload { provider: "paypal", .. })
        ));
    }

    #[test]
    fn payment_helpers() {
        let body = payment_body(json!([]));
        let PaymentEvent::PayPalPaymentCompleted(event) = decode(&body).unwrap() else {
            panic!("expected payment event");
        };
        let payment = &event.resource;
        assert_eq!(payment.account().as_str(), "MERCH123");
        assert_eq!(payment.total_cents().unwrap(), 3011);
        assert_eq!(payment.currency().as_deref(), Some("usd"));
        assert_eq!(payment.settlement_status(), PaymentStatus::Succeeded);
        let items: Vec<_> = payment.items().collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].quantity, 1);
        assert_eq!(items[0].description.as_deref(), Some("Upper deck"));
        assert_eq!(items[1].name, "Child");
        assert!(items[1].description.is_none());
        assert_eq!(
            payment.payer.payer_info.full_name().as_deref(),
            Some("Betsy Buyer")
        );
    }

    #[test]
    fn sale_resource_type_decodes_sale() {
        let body = serde_json::to_vec(&json!({
            "id": "WH-1",
            "resource_type": "sale",
            "event_type": "PAYMENT.SALE.COMPLETED",
            "resource": {"id": "SALE-9", "state": "completed",
                         "amount": {"total": "12.00", "currency": "USD"}}
        }))
        .unwrap();
        let PaymentEvent::PayPalSaleCompleted(event) = decode(&body).unwrap() else {
            panic!("expected sale event");
        };
        assert_eq!(event.resource.id, "SALE-9");
    }

    #[test]
    fn unknown_resource_type_is_unrecognized() {
        let body = br#"{"id":"WH-2","resource_type":"dispute","resource":{"x":1}}"#;
        let event = decode(body).unwrap();
        assert!(matches!(
            event,
            PaymentEvent::Unrecognized(UnrecognizedEvent { ref discriminator, .. }) if discriminator == "dispute"
        ));
    }

    #[test]
    fn invalid_json_is_malformed() {
        assert!(decode(b"{not json").is_err());
        assert!(decode(br#"{"id":"WH-3"}"#).is_err());
        assert!(decode(br#"{"id":"WH-4","resource_type":"payment","resource":{"state":"approved"}}"#).is_err());
    }
}
