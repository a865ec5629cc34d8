//! Event reconciliation.
//!
//! Applies a decoded [`PaymentEvent`] to the ledger and delivers the
//! notifications the resulting record owes. Every write is an upsert keyed by
//! provider identifiers, so a redelivered event converges on the same rows.
//!
//! | Event                          | Ledger write                        | Notifications              |
//! |--------------------------------|-------------------------------------|----------------------------|
//! | PayPal payment                 | payment, status from state/sales    | receipt, alert, SMS        |
//! | PayPal sale                    | none                                | none                       |
//! | Stripe `payment_intent.succeeded` | payment, succeeded               | receipt                    |
//! | Stripe `checkout.session.completed` | payment and its line items     | receipt (if paid), alert, SMS |
//! | Stripe `charge.refunded`       | payment, refunded                   | none                       |
//!
//! A receipt is owed while the payment is `succeeded`; the merchant alert and
//! SMS are owed once the checkout is recorded (or, for PayPal, once the payment
//! succeeded). Each delivery is marked on the record right after it succeeds,
//! and marked notifications are never sent again. A delivery that fails is
//! retried by the next redelivery of the event.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;

use dockpay_core::paypal::{Payment, PayPalEvent};
use dockpay_core::stripe::{Charge, CheckoutSession, LineItem, PaymentIntent, StripeEvent};
use dockpay_core::{
    normalize_currency, LineItemId, LineItemRecord, MerchantConfig, Notification, PaymentEvent,
    PaymentKey, PaymentRecord, PaymentStatus, PaymentUpdate, Provider, Upserted,
};
use dockpay_store::{Store, StoreError};

use crate::notify::{self, Notifier, NotifyError, PurchasedItem};
use crate::stripe::{PaymentsApi, StripeError};

/// Error type for reconciliation.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The ledger write failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A follow-up Stripe call failed.
    #[error("payment provider error: {0}")]
    Payments(#[from] StripeError),

    /// Notification delivery failed after the ledger was updated.
    #[error("notification error: {0}")]
    Notify(#[from] NotifyError),

    /// The event needs a Stripe follow-up call but no client is configured.
    #[error("payment provider API not configured")]
    PaymentsUnavailable,

    /// The event lacks data reconciliation depends on.
    #[error("malformed event: {0}")]
    Malformed(String),
}

impl ReconcileError {
    /// Whether the failure lies with a dependency rather than the event.
    #[must_use]
    pub const fn is_upstream(&self) -> bool {
        !matches!(self, Self::Malformed(_))
    }
}

/// What applying an event did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// At least one row was created or changed.
    Applied,
    /// The event was already reflected in the ledger.
    Unchanged,
    /// The event carries nothing to reconcile.
    Ignored,
}

impl Outcome {
    /// Lowercase name, as reported to the webhook caller.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Unchanged => "unchanged",
            Self::Ignored => "ignored",
        }
    }
}

/// Result of reconciling one event.
#[derive(Debug, Clone)]
pub struct ReconciliationResult {
    /// Effect on the ledger.
    pub outcome: Outcome,
    /// The payment record after the write.
    pub payment: Option<PaymentRecord>,
    /// Line items seen for the first time.
    pub line_items_added: usize,
    /// Emails and text messages delivered.
    pub notifications_sent: usize,
}

impl ReconciliationResult {
    const fn ignored() -> Self {
        Self {
            outcome: Outcome::Ignored,
            payment: None,
            line_items_added: 0,
            notifications_sent: 0,
        }
    }
}

/// Applies decoded events to the ledger.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn Store>,
    payments: Option<Arc<dyn PaymentsApi>>,
    notifier: Arc<dyn Notifier>,
    public_base_url: String,
    notify_from: String,
}

impl Reconciler {
    /// Create a reconciler.
    pub fn new(
        store: Arc<dyn Store>,
        payments: Option<Arc<dyn PaymentsApi>>,
        notifier: Arc<dyn Notifier>,
        public_base_url: impl Into<String>,
        notify_from: impl Into<String>,
    ) -> Self {
        Self {
            store,
            payments,
            notifier,
            public_base_url: public_base_url.into(),
            notify_from: notify_from.into(),
        }
    }

    /// Apply an event.
    ///
    /// `merchant` addresses notifications; without it the ledger is still
    /// updated and notifications are skipped.
    ///
    /// Ledger writes made before a failing step are kept. Redelivery of the
    /// same event completes the remaining writes and the notifications not yet
    /// marked as delivered.
    #[instrument(
        skip_all,
        fields(provider = %event.provider(), event_type = %event.kind(), event_id = %event.event_id())
    )]
    pub async fn apply(
        &self,
        event: &PaymentEvent,
        merchant: Option<&MerchantConfig>,
    ) -> Result<ReconciliationResult, ReconcileError> {
        let result = match event {
            PaymentEvent::PayPalPaymentCompleted(e) => self.paypal_payment(e, merchant).await?,
            PaymentEvent::PayPalSaleCompleted(e) => {
                tracing::info!(
                    sale_id = %e.resource.id,
                    state = %e.resource.state,
                    parent_payment = ?e.resource.parent_payment,
                    "PayPal sale notification, nothing to reconcile"
                );
                ReconciliationResult::ignored()
            }
            PaymentEvent::StripePaymentIntentSucceeded(e) => {
                self.payment_intent_succeeded(e, merchant).await?
            }
            PaymentEvent::StripeCheckoutSessionCompleted(e) => {
                self.checkout_completed(e, merchant).await?
            }
            PaymentEvent::StripeChargeRefunded(e) => self.charge_refunded(e)?,
            PaymentEvent::Unrecognized(e) => {
                tracing::debug!(discriminator = %e.discriminator, "Unhandled event type");
                ReconciliationResult::ignored()
            }
        };

        tracing::info!(
            outcome = result.outcome.as_str(),
            payment_id = ?result.payment.as_ref().map(|p| p.payment_id.as_str()),
            account = ?result.payment.as_ref().map(|p| p.account.as_str()),
            line_items_added = result.line_items_added,
            notifications_sent = result.notifications_sent,
            "Event reconciled"
        );
        Ok(result)
    }

    // ========================================================================
    // PayPal
    // ========================================================================

    async fn paypal_payment(
        &self,
        event: &PayPalEvent<Payment>,
        merchant: Option<&MerchantConfig>,
    ) -> Result<ReconciliationResult, ReconcileError> {
        let payment = &event.resource;
        let key = payment
            .key()
            .map_err(|e| ReconcileError::Malformed(e.to_string()))?;
        let amount = payment
            .total_cents()
            .map_err(|e| ReconcileError::Malformed(e.to_string()))?;
        let payer = &payment.payer.payer_info;

        let update = PaymentUpdate {
            amount_cents: Some(amount),
            currency: payment.currency(),
            email: payer.email.clone(),
            name: payer.full_name(),
            created_at: payment.create_time.or(event.create_time),
            ..PaymentUpdate::status_only(key, Provider::PayPal, payment.settlement_status())
        };

        let upserted = self.store.upsert_payment(&update)?;
        let paid = upserted.current.status == PaymentStatus::Succeeded;
        let items: Vec<PurchasedItem> = payment.items().map(PurchasedItem::from).collect();
        let sent = self.notify(merchant, &upserted.current, &items, paid).await?;

        Ok(Self::result(&upserted, 0, sent))
    }

    // ========================================================================
    // Stripe
    // ========================================================================

    async fn payment_intent_succeeded(
        &self,
        event: &StripeEvent<PaymentIntent>,
        merchant: Option<&MerchantConfig>,
    ) -> Result<ReconciliationResult, ReconcileError> {
        let key = event
            .payment_key()
            .ok_or_else(|| ReconcileError::Malformed("payment intent without id".into()))?;
        let update = intent_update(key, &event.object, PaymentStatus::Succeeded);

        let upserted = self.store.upsert_payment(&update)?;
        let sent = self.notify(merchant, &upserted.current, &[], false).await?;

        Ok(Self::result(&upserted, 0, sent))
    }

    async fn checkout_completed(
        &self,
        event: &StripeEvent<CheckoutSession>,
        merchant: Option<&MerchantConfig>,
    ) -> Result<ReconciliationResult, ReconcileError> {
        let key = event.payment_key().ok_or_else(|| {
            ReconcileError::Malformed("checkout session without payment intent".into())
        })?;
        let session = &event.object;
        let payments = self
            .payments
            .as_ref()
            .ok_or(ReconcileError::PaymentsUnavailable)?;

        // Both follow-up calls complete before anything is written.
        let intent = payments
            .get_payment_intent(&key.account, key.payment_id.as_str())
            .await?;
        let items = payments.list_line_items(&key.account, &session.id).await?;

        let status = if session.is_paid() || intent.status == "succeeded" {
            PaymentStatus::Succeeded
        } else {
            PaymentStatus::Created
        };
        let mut update = intent_update(key.clone(), &intent, status);
        update.checkout_session_id = Some(session.id.clone());
        if let Some(details) = &session.customer_details {
            update.email = update.email.or_else(|| details.email.clone());
            update.name = update.name.or_else(|| details.name.clone());
        }

        let records = items
            .iter()
            .map(|item| line_item_record(&key, item, &intent.currency))
            .collect::<Result<Vec<_>, _>>()?;

        let upserted = self.store.upsert_payment(&update)?;
        if upserted.current.status.is_terminal() && status != upserted.current.status {
            tracing::info!(
                payment_id = %key.payment_id,
                account = %key.account,
                "Checkout completed for a refunded payment, status kept"
            );
        }
        let mut added = 0;
        for record in &records {
            if self.store.upsert_line_item(record)? {
                added += 1;
            }
        }

        if upserted.checkout_recorded() {
            tracing::debug!(payment_id = %key.payment_id, session_id = %session.id, "Checkout recorded");
        }
        let items: Vec<PurchasedItem> = records.iter().map(PurchasedItem::from).collect();
        let checkout_recorded = upserted.current.checkout_session_id.is_some();
        let sent = self.notify(merchant, &upserted.current, &items, checkout_recorded).await?;

        Ok(Self::result(&upserted, added, sent))
    }

    fn charge_refunded(
        &self,
        event: &StripeEvent<Charge>,
    ) -> Result<ReconciliationResult, ReconcileError> {
        let key = event
            .payment_key()
            .ok_or_else(|| ReconcileError::Malformed("charge without payment intent".into()))?;

        let update = PaymentUpdate {
            currency: Some(normalize_currency(&event.object.currency)).filter(|c| !c.is_empty()),
            ..PaymentUpdate::status_only(key, Provider::Stripe, PaymentStatus::Refunded)
        };
        let upserted = self.store.upsert_payment(&update)?;

        if upserted.previous.is_none() {
            tracing::warn!(
                payment_id = %upserted.current.payment_id,
                account = %upserted.current.account,
                charge_id = %event.object.id,
                "Refund for a payment with no prior record"
            );
        }

        Ok(Self::result(&upserted, 0, 0))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Deliver what `payment` owes and has not been marked as delivered.
    ///
    /// `purchase_due` says whether the merchant alert and SMS are owed.
    async fn notify(
        &self,
        merchant: Option<&MerchantConfig>,
        payment: &PaymentRecord,
        items: &[PurchasedItem],
        purchase_due: bool,
    ) -> Result<usize, ReconcileError> {
        let mut pending = Vec::new();
        if payment.receipt_due() {
            pending.push(Notification::Receipt);
        }
        if purchase_due {
            pending.extend(
                [Notification::MerchantAlert, Notification::MerchantSms]
                    .into_iter()
                    .filter(|kind| !payment.notified(*kind)),
            );
        }
        if pending.is_empty() {
            return Ok(0);
        }
        let Some(merchant) = merchant else {
            tracing::warn!(
                payment_id = %payment.payment_id,
                account = %payment.account,
                "No merchant configured for account, skipping notifications"
            );
            return Ok(0);
        };

        let key = payment.key();
        let mut sent = 0;
        for kind in pending {
            let delivered = match kind {
                Notification::Receipt => {
                    match notify::customer_receipt(merchant, payment, &self.public_base_url) {
                        Some(receipt) => {
                            self.notifier.send_email(&receipt).await?;
                            true
                        }
                        None => {
                            tracing::warn!(
                                payment_id = %payment.payment_id,
                                "Payment has no customer email, skipping receipt"
                            );
                            false
                        }
                    }
                }
                Notification::MerchantAlert => {
                    let alert = notify::purchase_alert(merchant, payment, items, &self.notify_from);
                    self.notifier.send_email(&alert).await?;
                    true
                }
                Notification::MerchantSms => match notify::purchase_sms(merchant, payment) {
                    Some(sms) => {
                        self.notifier.send_sms(&sms).await?;
                        true
                    }
                    None => false,
                },
            };
            if delivered {
                self.store.mark_notified(&key, kind, Utc::now())?;
                tracing::debug!(payment_id = %payment.payment_id, notification = %kind, "Notification delivered");
                sent += 1;
            }
        }
        Ok(sent)
    }

    fn result(upserted: &Upserted, line_items_added: usize, sent: usize) -> ReconciliationResult {
        let outcome = if upserted.changed() || line_items_added > 0 || sent > 0 {
            Outcome::Applied
        } else {
            Outcome::Unchanged
        };
        ReconciliationResult {
            outcome,
            payment: Some(upserted.current.clone()),
            line_items_added,
            notifications_sent: sent,
        }
    }
}

fn intent_update(key: PaymentKey, intent: &PaymentIntent, status: PaymentStatus) -> PaymentUpdate {
    PaymentUpdate {
        amount_cents: Some(intent.amount),
        currency: Some(normalize_currency(&intent.currency)).filter(|c| !c.is_empty()),
        email: intent.payer_email().map(str::to_string),
        name: intent.payer_name().map(str::to_string),
        receipt_url: intent.receipt_url().map(str::to_string),
        created_at: DateTime::<Utc>::from_timestamp(intent.created, 0).filter(|_| intent.created > 0),
        ..PaymentUpdate::status_only(key, Provider::Stripe, status)
    }
}

fn line_item_record(
    key: &PaymentKey,
    item: &LineItem,
    fallback_currency: &str,
) -> Result<LineItemRecord, ReconcileError> {
    let id = LineItemId::new(&item.id).map_err(|e| ReconcileError::Malformed(e.to_string()))?;
    let currency = if item.currency.is_empty() {
        fallback_currency
    } else {
        &item.currency
    };

    Ok(LineItemRecord {
        id,
        payment_id: key.payment_id.clone(),
        account: key.account.clone(),
        quantity: item.quantity,
        sku: item.sku(),
        name: item.name(),
        description: item.product_description(),
        unit_price_cents: item.unit_amount(),
        amount_cents: item.amount_total,
        currency: normalize_currency(currency),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use dockpay_core::{AccountId, MerchantId, PaymentId};
    use dockpay_store::MemoryStore;
    use serde_json::json;

    use crate::notify::{EmailMessage, SmsMessage};
    use crate::stripe::NewCheckoutSession;

    #[derive(Default)]
    struct RecordingNotifier {
        emails: Mutex<Vec<EmailMessage>>,
        sms: Mutex<Vec<SmsMessage>>,
        /// Emails to reject before delivering again.
        email_outages: Mutex<usize>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_email(&self, message: &EmailMessage) -> Result<(), NotifyError> {
            let mut outages = self.email_outages.lock().unwrap();
            if *outages > 0 {
                *outages -= 1;
                return Err(NotifyError::Rejected {
                    service: "sendgrid",
                    status: 503,
                    body: "down".into(),
                });
            }
            self.emails.lock().unwrap().push(message.clone());
            Ok(())
        }

        async fn send_sms(&self, message: &SmsMessage) -> Result<(), NotifyError> {
            self.sms.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct FakeStripe {
        intent: PaymentIntent,
        pages: Vec<Vec<LineItem>>,
    }

    #[async_trait]
    impl PaymentsApi for FakeStripe {
        async fn get_payment_intent(
            &self,
            _account: &AccountId,
            _id: &str,
        ) -> Result<PaymentIntent, StripeError> {
            Ok(self.intent.clone())
        }

        async fn list_line_items(
            &self,
            _account: &AccountId,
            _session_id: &str,
        ) -> Result<Vec<LineItem>, StripeError> {
            Ok(self.pages.concat())
        }

        async fn create_checkout_session(
            &self,
            _account: &AccountId,
            _session: &NewCheckoutSession,
        ) -> Result<CheckoutSession, StripeError> {
            Err(StripeError::Configuration("unused".into()))
        }

        async fn get_checkout_session(
            &self,
            _account: &AccountId,
            _id: &str,
        ) -> Result<CheckoutSession, StripeError> {
            Err(StripeError::Configuration("unused".into()))
        }
    }

    fn merchant() -> MerchantConfig {
        MerchantConfig {
            id: MerchantId::new("harbor").unwrap(),
            email_name: "Harbor Cruises".into(),
            email_from: "tickets@harbor.test".into(),
            email_content: String::new(),
            stripe_account: Some(AccountId::new("acct_harbor").unwrap()),
            paypal_merchant_id: Some(AccountId::new("HARBORPP").unwrap()),
            send_sms: false,
            notify_number: None,
            twilio: None,
        }
    }

    fn intent() -> PaymentIntent {
        serde_json::from_value(json!({
            "id": "pi_1",
            "amount": 5300,
            "currency": "usd",
            "status": "succeeded",
            "created": 1_700_000_000,
            "latest_charge": {
                "id": "ch_1",
                "amount": 5300,
                "currency": "usd",
                "receipt_url": "https://pay.stripe.test/receipts/r_1",
                "billing_details": {"email": "ana@example.test", "name": "Ana"}
            }
        }))
        .unwrap()
    }

    fn line_item(id: &str) -> LineItem {
        serde_json::from_value(json!({
            "id": id,
            "quantity": 2,
            "amount_total": 5000,
            "currency": "usd",
            "price": {
                "id": "price_1",
                "unit_amount": 2500,
                "currency": "usd",
                "product": {
                    "id": "prod_1",
                    "name": "Harbor Tour",
                    "description": "Departs 7pm",
                    "metadata": {"sku": "TOUR-1"}
                }
            }
        }))
        .unwrap()
    }

    fn decode_stripe(value: &serde_json::Value) -> PaymentEvent {
        dockpay_core::stripe::decode(&serde_json::to_vec(value).unwrap()).unwrap()
    }

    fn checkout_event() -> PaymentEvent {
        decode_stripe(&json!({
            "id": "evt_cs",
            "type": "checkout.session.completed",
            "account": "acct_harbor",
            "created": 1_700_000_100,
            "data": {"object": {
                "id": "cs_1",
                "payment_status": "paid",
                "payment_intent": "pi_1"
            }}
        }))
    }

    fn refund_event(payment_intent: &str) -> PaymentEvent {
        decode_stripe(&json!({
            "id": "evt_rf",
            "type": "charge.refunded",
            "account": "acct_harbor",
            "created": 1_700_000_200,
            "data": {"object": {"id": "ch_1", "payment_intent": payment_intent, "refunded": true}}
        }))
    }

    fn setup() -> (Reconciler, Arc<MemoryStore>, Arc<RecordingNotifier>) {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let stripe = FakeStripe {
            intent: intent(),
            pages: vec![vec![line_item("li_1"), line_item("li_2")], vec![line_item("li_3")]],
        };
        let reconciler = Reconciler::new(
            store.clone(),
            Some(Arc::new(stripe)),
            notifier.clone(),
            "https://dock.test",
            "noreply@dock.test",
        );
        (reconciler, store, notifier)
    }

    fn key(id: &str) -> PaymentKey {
        PaymentKey::new(PaymentId::new(id).unwrap(), AccountId::new("acct_harbor").unwrap())
    }

    #[tokio::test]
    async fn checkout_redelivery_is_idempotent() {
        let (reconciler, store, notifier) = setup();
        let merchant = merchant();
        let event = checkout_event();

        let first = reconciler.apply(&event, Some(&merchant)).await.unwrap();
        assert_eq!(first.outcome, Outcome::Applied);
        assert_eq!(first.line_items_added, 3);
        // receipt + merchant alert
        assert_eq!(first.notifications_sent, 2);

        let second = reconciler.apply(&event, Some(&merchant)).await.unwrap();
        assert_eq!(second.outcome, Outcome::Unchanged);
        assert_eq!(second.line_items_added, 0);
        assert_eq!(second.notifications_sent, 0);

        assert_eq!(store.list_line_items(&key("pi_1")).unwrap().len(), 3);
        assert_eq!(notifier.emails.lock().unwrap().len(), 2);

        let payment = store.get_payment(&key("pi_1")).unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Succeeded);
        assert_eq!(payment.email, "ana@example.test");
        assert_eq!(payment.checkout_session_id.as_deref(), Some("cs_1"));
        assert!(payment.notified(Notification::Receipt));
        assert!(payment.notified(Notification::MerchantAlert));

        let items = store.list_line_items(&key("pi_1")).unwrap();
        assert_eq!(items[0].description, "Departs 7pm");
        let emails = notifier.emails.lock().unwrap();
        assert!(emails[1].html.contains("<li>2 Harbor Tour Departs 7pm</li>"));
    }

    #[tokio::test]
    async fn failed_delivery_is_retried_on_redelivery() {
        let (reconciler, store, notifier) = setup();
        let merchant = merchant();
        let event = checkout_event();
        *notifier.email_outages.lock().unwrap() = 1;

        let err = reconciler.apply(&event, Some(&merchant)).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Notify(_)));
        assert!(err.is_upstream());
        let payment = store.get_payment(&key("pi_1")).unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Succeeded);
        assert!(!payment.notified(Notification::Receipt));

        let retry = reconciler.apply(&event, Some(&merchant)).await.unwrap();
        assert_eq!(retry.outcome, Outcome::Applied);
        assert_eq!(retry.line_items_added, 0);
        assert_eq!(retry.notifications_sent, 2);

        let again = reconciler.apply(&event, Some(&merchant)).await.unwrap();
        assert_eq!(again.outcome, Outcome::Unchanged);
        assert_eq!(again.notifications_sent, 0);
        assert_eq!(notifier.emails.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn alert_failure_does_not_resend_receipt() {
        let (reconciler, store, notifier) = setup();
        let merchant = merchant();
        let event = checkout_event();
        // the receipt goes out, then the alert fails
        reconciler
            .apply(
                &decode_stripe(&json!({
                    "id": "evt_pi",
                    "type": "payment_intent.succeeded",
                    "account": "acct_harbor",
                    "data": {"object": intent()}
                })),
                Some(&merchant),
            )
            .await
            .unwrap();
        *notifier.email_outages.lock().unwrap() = 1;
        assert!(reconciler.apply(&event, Some(&merchant)).await.is_err());

        let retry = reconciler.apply(&event, Some(&merchant)).await.unwrap();
        assert_eq!(retry.notifications_sent, 1);

        let recipients: Vec<_> = notifier
            .emails
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.to.email.clone())
            .collect();
        assert_eq!(recipients, ["ana@example.test", "tickets@harbor.test"]);
        let payment = store.get_payment(&key("pi_1")).unwrap().unwrap();
        assert!(payment.notified(Notification::MerchantAlert));
    }

    #[tokio::test]
    async fn notifications_wait_for_a_known_merchant() {
        let (reconciler, store, notifier) = setup();
        let event = checkout_event();

        let unaddressed = reconciler.apply(&event, None).await.unwrap();
        assert_eq!(unaddressed.notifications_sent, 0);
        let payment = store.get_payment(&key("pi_1")).unwrap().unwrap();
        assert!(payment.receipt_due());

        let addressed = reconciler.apply(&event, Some(&merchant())).await.unwrap();
        assert_eq!(addressed.notifications_sent, 2);
        assert_eq!(notifier.emails.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn receipt_sent_once_across_intent_and_checkout() {
        let (reconciler, _store, notifier) = setup();
        let merchant = merchant();
        let intent_event = decode_stripe(&json!({
            "id": "evt_pi",
            "type": "payment_intent.succeeded",
            "account": "acct_harbor",
            "created": 1_700_000_050,
            "data": {"object": intent()}
        }));

        let first = reconciler.apply(&intent_event, Some(&merchant)).await.unwrap();
        assert_eq!(first.notifications_sent, 1);

        let checkout = reconciler.apply(&checkout_event(), Some(&merchant)).await.unwrap();
        // alert only; the receipt went out with the intent
        assert_eq!(checkout.notifications_sent, 1);

        let emails = notifier.emails.lock().unwrap();
        assert_eq!(emails.len(), 2);
        assert_eq!(emails[0].to.email, "ana@example.test");
        assert_eq!(emails[1].to.email, "tickets@harbor.test");
    }

    #[tokio::test]
    async fn refund_of_unseen_payment_creates_refunded_record() {
        let (reconciler, store, _) = setup();

        let result = reconciler.apply(&refund_event("pi_unseen"), None).await.unwrap();
        assert_eq!(result.outcome, Outcome::Applied);

        let payment = store.get_payment(&key("pi_unseen")).unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn late_success_does_not_regress_refund() {
        let (reconciler, store, notifier) = setup();
        let merchant = merchant();

        reconciler.apply(&refund_event("pi_1"), Some(&merchant)).await.unwrap();
        let late = reconciler.apply(&checkout_event(), Some(&merchant)).await.unwrap();

        let payment = store.get_payment(&key("pi_1")).unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Refunded);
        assert_eq!(payment.email, "ana@example.test");
        // no receipt for a refunded payment; the checkout alert still goes out
        assert_eq!(late.notifications_sent, 1);
        assert_eq!(notifier.emails.lock().unwrap()[0].to.email, "tickets@harbor.test");
    }

    #[tokio::test]
    async fn checkout_without_client_is_upstream_failure() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = Reconciler::new(
            store.clone(),
            None,
            Arc::new(RecordingNotifier::default()),
            "https://dock.test",
            "noreply@dock.test",
        );

        let err = reconciler.apply(&checkout_event(), None).await.unwrap_err();
        assert!(matches!(err, ReconcileError::PaymentsUnavailable));
        assert!(err.is_upstream());
        assert!(store.get_payment(&key("pi_1")).unwrap().is_none());
    }

    #[tokio::test]
    async fn paypal_payment_notifies_on_success() {
        let (reconciler, store, notifier) = setup();
        let mut merchant = merchant();
        merchant.send_sms = true;
        merchant.notify_number = Some("+15550100".into());
        merchant.twilio = Some(dockpay_core::TwilioCredentials {
            account_sid: "AC1".into(),
            auth_token: "t".into(),
            from_number: "+15550199".into(),
        });

        let body = serde_json::to_vec(&json!({
            "id": "WH-1",
            "create_time": "2024-05-01T12:00:00Z",
            "resource_type": "payment",
            "event_type": "PAYMENTS.PAYMENT.CREATED",
            "summary": "Payment created",
            "resource": {
                "id": "PAY-1",
                "state": "approved",
                "payer": {"payer_info": {"email": "bo@example.test", "first_name": "Bo", "last_name": "Li"}},
                "transactions": [{
                    "amount": {"total": "53.00", "currency": "USD"},
                    "payee": {"merchant_id": "HARBORPP"},
                    "item_list": {"items": [
                        {"name": "Harbor Tour", "quantity": "2", "price": "25.00",
                         "currency": "USD", "description": "Departs 7pm"}
                    ]},
                    "related_resources": []
                }]
            }
        }))
        .unwrap();
        let event = dockpay_core::paypal::decode(&body).unwrap();

        let first = reconciler.apply(&event, Some(&merchant)).await.unwrap();
        assert_eq!(first.notifications_sent, 3);
        let again = reconciler.apply(&event, Some(&merchant)).await.unwrap();
        assert_eq!(again.notifications_sent, 0);

        let key = PaymentKey::new(PaymentId::new("PAY-1").unwrap(), AccountId::new("HARBORPP").unwrap());
        let payment = store.get_payment(&key).unwrap().unwrap();
        assert_eq!(payment.amount_cents, 5300);
        assert_eq!(payment.name, "Bo Li");
        assert!(payment.notified(Notification::MerchantSms));
        assert_eq!(notifier.sms.lock().unwrap().len(), 1);

        let emails = notifier.emails.lock().unwrap();
        assert_eq!(emails[1].to.email, "tickets@harbor.test");
        assert!(emails[1].html.contains("<li>2 Harbor Tour Departs 7pm</li>"));
    }

    #[tokio::test]
    async fn unrecognized_and_sale_are_ignored() {
        let (reconciler, _, _) = setup();
        let unknown = decode_stripe(&json!({
            "id": "evt_x",
            "type": "customer.created",
            "data": {"object": {}}
        }));
        let result = reconciler.apply(&unknown, None).await.unwrap();
        assert_eq!(result.outcome, Outcome::Ignored);
        assert!(result.payment.is_none());
    }

    #[test]
    fn only_malformed_is_a_client_error() {
        assert!(!ReconcileError::Malformed("x".into()).is_upstream());
        assert!(ReconcileError::PaymentsUnavailable.is_upstream());
    }
}
