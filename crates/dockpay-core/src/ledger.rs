//! Settlement ledger records.
//!
//! A [`PaymentRecord`] is written only by the reconciler, always through an
//! upsert keyed by [`PaymentKey`]. Re-applying the same [`PaymentUpdate`] leaves
//! the record unchanged, and status never moves backwards:
//!
//! ```text
//! unseen -> created -> succeeded -> refunded
//! ```
//!
//! A stale `succeeded` delivered after a refund is merged for its details but
//! keeps the record `refunded`.
//!
//! Each record also remembers which [`Notification`]s were delivered for it.
//! Markers are written only after a delivery succeeds, so a failed delivery
//! is retried when the provider redelivers the event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, LineItemId, PaymentId, PaymentKey};

/// Payment provider a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// PayPal REST webhooks.
    #[serde(rename = "paypal")]
    PayPal,
    /// Stripe Connect webhooks.
    Stripe,
}

impl Provider {
    /// Lowercase provider name used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PayPal => "paypal",
            Self::Stripe => "stripe",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settlement status of a payment.
///
/// Variants are declared in transition order; the derived `Ord` is the order
/// the reconciler relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Payment exists at the provider but has not settled.
    Created,
    /// Payment settled.
    Succeeded,
    /// Payment refunded. Terminal.
    Refunded,
}

impl PaymentStatus {
    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Refunded)
    }

    /// Lowercase status name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Succeeded => "succeeded",
            Self::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message the reconciler delivers at most once per successful attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notification {
    /// Receipt email to the customer.
    Receipt,
    /// Purchase alert email to the merchant.
    MerchantAlert,
    /// Purchase text message to the merchant.
    MerchantSms,
}

impl Notification {
    /// Lowercase name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Receipt => "receipt",
            Self::MerchantAlert => "merchant_alert",
            Self::MerchantSms => "merchant_sms",
        }
    }
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row in the payment ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Provider payment identifier.
    pub payment_id: PaymentId,
    /// Merchant account scope.
    pub account: AccountId,
    /// Provider the payment belongs to.
    pub provider: Provider,
    /// Amount in cents, 0 until known.
    pub amount_cents: i64,
    /// Lowercase currency code, empty until known.
    pub currency: String,
    /// Payer email, empty until known.
    pub email: String,
    /// Payer name, empty until known.
    pub name: String,
    /// Settlement status.
    pub status: PaymentStatus,
    /// Provider receipt URL, if any.
    pub receipt_url: Option<String>,
    /// Checkout session that completed this payment, once recorded.
    pub checkout_session_id: Option<String>,
    /// When the payment was created at the provider.
    pub created_at: DateTime<Utc>,
    /// When this row was last written.
    pub updated_at: DateTime<Utc>,
    /// When the customer receipt was delivered.
    #[serde(default)]
    pub receipt_sent_at: Option<DateTime<Utc>>,
    /// When the merchant alert email was delivered.
    #[serde(default)]
    pub alert_sent_at: Option<DateTime<Utc>>,
    /// When the merchant text message was delivered.
    #[serde(default)]
    pub sms_sent_at: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    /// The record's composite key.
    #[must_use]
    pub fn key(&self) -> PaymentKey {
        PaymentKey::new(self.payment_id.clone(), self.account.clone())
    }

    /// Build a fresh record from the first update seen for a key.
    #[must_use]
    pub fn from_update(update: &PaymentUpdate, now: DateTime<Utc>) -> Self {
        let mut record = Self {
            payment_id: update.key.payment_id.clone(),
            account: update.key.account.clone(),
            provider: update.provider,
            amount_cents: 0,
            currency: String::new(),
            email: String::new(),
            name: String::new(),
            status: update.status,
            receipt_url: None,
            checkout_session_id: None,
            created_at: update.created_at.unwrap_or(now),
            updated_at: now,
            receipt_sent_at: None,
            alert_sent_at: None,
            sms_sent_at: None,
        };
        record.merge(update, now);
        record
    }

    /// When `kind` was delivered, if it was.
    #[must_use]
    pub fn sent_at(&self, kind: Notification) -> Option<DateTime<Utc>> {
        match kind {
            Notification::Receipt => self.receipt_sent_at,
            Notification::MerchantAlert => self.alert_sent_at,
            Notification::MerchantSms => self.sms_sent_at,
        }
    }

    /// Whether `kind` was already delivered.
    #[must_use]
    pub fn notified(&self, kind: Notification) -> bool {
        self.sent_at(kind).is_some()
    }

    /// Record the delivery of `kind`. The first marker wins.
    ///
    /// Returns whether the marker was newly set.
    pub fn mark_notified(&mut self, kind: Notification, at: DateTime<Utc>) -> bool {
        let slot = match kind {
            Notification::Receipt => &mut self.receipt_sent_at,
            Notification::MerchantAlert => &mut self.alert_sent_at,
            Notification::MerchantSms => &mut self.sms_sent_at,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(at);
        self.updated_at = at;
        true
    }

    /// Whether the customer receipt is due and not yet delivered.
    #[must_use]
    pub fn receipt_due(&self) -> bool {
        self.status == PaymentStatus::Succeeded && !self.notified(Notification::Receipt)
    }

    /// Merge an update into this record.
    ///
    /// Known fields overwrite, `created_at` keeps the earliest value, the
    /// checkout session is set once and status only advances. Returns whether
    /// anything changed.
    pub fn merge(&mut self, update: &PaymentUpdate, now: DateTime<Utc>) -> bool {
        let before = self.clone();

        if update.status > self.status {
            self.status = update.status;
        }
        if let Some(amount) = update.amount_cents {
            self.amount_cents = amount;
        }
        merge_text(&mut self.currency, update.currency.as_deref());
        merge_text(&mut self.email, update.email.as_deref());
        merge_text(&mut self.name, update.name.as_deref());
        if let Some(url) = update.receipt_url.as_deref().filter(|u| !u.is_empty()) {
            self.receipt_url = Some(url.to_string());
        }
        if self.checkout_session_id.is_none() {
            self.checkout_session_id.clone_from(&update.checkout_session_id);
        }
        if let Some(created) = update.created_at {
            if created < self.created_at {
                self.created_at = created;
            }
        }

        let changed = *self != before;
        if changed {
            self.updated_at = now;
        }
        changed
    }
}

fn merge_text(field: &mut String, incoming: Option<&str>) {
    if let Some(value) = incoming.filter(|v| !v.trim().is_empty()) {
        if field != value {
            *field = value.to_string();
        }
    }
}

/// Fields an event contributes to a payment record.
///
/// `None` means "not carried by this event" and leaves the stored value alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentUpdate {
    /// Record key.
    pub key: PaymentKey,
    /// Provider.
    pub provider: Provider,
    /// Status the event asserts.
    pub status: PaymentStatus,
    /// Amount in cents.
    pub amount_cents: Option<i64>,
    /// Currency code.
    pub currency: Option<String>,
    /// Payer email.
    pub email: Option<String>,
    /// Payer name.
    pub name: Option<String>,
    /// Receipt URL.
    pub receipt_url: Option<String>,
    /// Completed checkout session.
    pub checkout_session_id: Option<String>,
    /// Provider creation time.
    pub created_at: Option<DateTime<Utc>>,
}

impl PaymentUpdate {
    /// An update carrying only a status.
    #[must_use]
    pub const fn status_only(key: PaymentKey, provider: Provider, status: PaymentStatus) -> Self {
        Self {
            key,
            provider,
            status,
            amount_cents: None,
            currency: None,
            email: None,
            name: None,
            receipt_url: None,
            checkout_session_id: None,
            created_at: None,
        }
    }
}

/// Result of an atomic payment upsert: the row before and after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted {
    /// Stored record before the write, `None` if the key was unseen.
    pub previous: Option<PaymentRecord>,
    /// Stored record after the write.
    pub current: PaymentRecord,
}

impl Upserted {
    /// Apply `update` to `previous` the way every store must.
    #[must_use]
    pub fn apply(previous: Option<PaymentRecord>, update: &PaymentUpdate, now: DateTime<Utc>) -> Self {
        let current = match &previous {
            Some(existing) => {
                let mut record = existing.clone();
                record.merge(update, now);
                record
            }
            None => PaymentRecord::from_update(update, now),
        };
        Self { previous, current }
    }

    /// Whether this write moved the record into `status`.
    #[must_use]
    pub fn entered(&self, status: PaymentStatus) -> bool {
        self.current.status == status
            && self.previous.as_ref().map_or(true, |p| p.status != status)
    }

    /// Whether this write is the first to record the checkout completion.
    #[must_use]
    pub fn checkout_recorded(&self) -> bool {
        self.current.checkout_session_id.is_some()
            && self
                .previous
                .as_ref()
                .map_or(true, |p| p.checkout_session_id.is_none())
    }

    /// Whether the stored row changed at all.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.previous.as_ref() != Some(&self.current)
    }
}

/// One purchased item of a completed checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemRecord {
    /// Provider line item id.
    pub id: LineItemId,
    /// Payment the item belongs to.
    pub payment_id: PaymentId,
    /// Merchant account scope.
    pub account: AccountId,
    /// Quantity purchased.
    pub quantity: i64,
    /// SKU from the product metadata.
    pub sku: String,
    /// Product name.
    pub name: String,
    /// Product description, empty if none.
    #[serde(default)]
    pub description: String,
    /// Unit price in cents.
    pub unit_price_cents: i64,
    /// Line total in cents.
    pub amount_cents: i64,
    /// Lowercase currency code.
    pub currency: String,
}

impl LineItemRecord {
    /// Key of the payment this item belongs to.
    #[must_use]
    pub fn payment_key(&self) -> PaymentKey {
        PaymentKey::new(self.payment_id.clone(), self.account.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key() -> PaymentKey {
        PaymentKey::new(
            PaymentId::new("pi_1").unwrap(),
            AccountId::new("acct_1").unwrap(),
        )
    }

    fn succeeded() -> PaymentUpdate {
        PaymentUpdate {
            amount_cents: Some(2500),
            currency: Some("usd".into()),
            email: Some("jo@example.com".into()),
            name: Some("Jo".into()),
            created_at: Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap()),
            ..PaymentUpdate::status_only(key(), Provider::Stripe, PaymentStatus::Succeeded)
        }
    }

    #[test]
    fn status_order_matches_transitions() {
        assert!(PaymentStatus::Created < PaymentStatus::Succeeded);
        assert!(PaymentStatus::Succeeded < PaymentStatus::Refunded);
        assert!(PaymentStatus::Refunded.is_terminal());
    }

    #[test]
    fn first_update_creates_record() {
        let now = Utc::now();
        let upserted = Upserted::apply(None, &succeeded(), now);
        assert!(upserted.entered(PaymentStatus::Succeeded));
        assert_eq!(upserted.current.amount_cents, 2500);
        assert_eq!(upserted.current.email, "jo@example.com");
        assert_eq!(upserted.current.created_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn reapplying_same_update_is_a_no_op() {
        let now = Utc::now();
        let first = Upserted::apply(None, &succeeded(), now);
        let second = Upserted::apply(Some(first.current.clone()), &succeeded(), Utc::now());
        assert!(!second.changed());
        assert!(!second.entered(PaymentStatus::Succeeded));
        assert_eq!(second.current, first.current);
    }

    #[test]
    fn stale_success_never_regresses_refund() {
        let now = Utc::now();
        let refunded = Upserted::apply(
            None,
            &PaymentUpdate::status_only(key(), Provider::Stripe, PaymentStatus::Refunded),
            now,
        );
        assert_eq!(refunded.current.status, PaymentStatus::Refunded);

        let late = Upserted::apply(Some(refunded.current), &succeeded(), now);
        assert_eq!(late.current.status, PaymentStatus::Refunded);
        assert!(!late.entered(PaymentStatus::Succeeded));
        // Details from the late event are still filled in.
        assert_eq!(late.current.amount_cents, 2500);
    }

    #[test]
    fn empty_fields_do_not_erase_known_values() {
        let now = Utc::now();
        let mut record = PaymentRecord::from_update(&succeeded(), now);
        let blank = PaymentUpdate {
            email: Some(String::new()),
            ..PaymentUpdate::status_only(key(), Provider::Stripe, PaymentStatus::Created)
        };
        assert!(!record.merge(&blank, now));
        assert_eq!(record.email, "jo@example.com");
        assert_eq!(record.status, PaymentStatus::Succeeded);
    }

    #[test]
    fn checkout_session_recorded_once() {
        let now = Utc::now();
        let with_session = PaymentUpdate {
            checkout_session_id: Some("cs_1".into()),
            ..succeeded()
        };
        let first = Upserted::apply(None, &with_session, now);
        assert!(first.checkout_recorded());

        let again = Upserted::apply(Some(first.current), &with_session, now);
        assert!(!again.checkout_recorded());

        let other = PaymentUpdate {
            checkout_session_id: Some("cs_2".into()),
            ..succeeded()
        };
        let third = Upserted::apply(Some(again.current), &other, now);
        assert_eq!(third.current.checkout_session_id.as_deref(), Some("cs_1"));
    }

    #[test]
    fn notification_markers_survive_merges() {
        let now = Utc::now();
        let mut record = PaymentRecord::from_update(&succeeded(), now);
        assert!(record.receipt_due());
        assert!(!record.notified(Notification::MerchantAlert));

        assert!(record.mark_notified(Notification::Receipt, now));
        assert!(!record.mark_notified(Notification::Receipt, Utc::now()));
        assert_eq!(record.sent_at(Notification::Receipt), Some(now));
        assert!(!record.receipt_due());

        // a redelivered update neither clears nor changes the marker
        assert!(!record.merge(&succeeded(), Utc::now()));
        assert_eq!(record.sent_at(Notification::Receipt), Some(now));
    }

    #[test]
    fn refunded_payment_owes_no_receipt() {
        let record = PaymentRecord::from_update(
            &PaymentUpdate::status_only(key(), Provider::Stripe, PaymentStatus::Refunded),
            Utc::now(),
        );
        assert!(!record.receipt_due());
    }

    #[test]
    fn records_without_markers_still_decode() {
        let mut value = serde_json::to_value(PaymentRecord::from_update(&succeeded(), Utc::now())).unwrap();
        let fields = value.as_object_mut().unwrap();
        fields.remove("receipt_sent_at");
        fields.remove("alert_sent_at");
        fields.remove("sms_sent_at");
        let record: PaymentRecord = serde_json::from_value(value).unwrap();
        assert!(record.receipt_due());
    }

    #[test]
    fn created_at_keeps_earliest() {
        let now = Utc::now();
        let mut record = PaymentRecord::from_update(&succeeded(), now);
        let later = PaymentUpdate {
            created_at: Some(Utc.timestamp_opt(1_800_000_000, 0).unwrap()),
            ..succeeded()
        };
        record.merge(&later, now);
        assert_eq!(record.created_at.timestamp(), 1_700_000_000);
    }
}
