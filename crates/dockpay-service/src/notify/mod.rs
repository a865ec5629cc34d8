//! Customer and merchant notifications.
//!
//! Delivery goes through the [`Notifier`] trait. [`HttpNotifier`] sends email
//! through `SendGrid` and SMS through Twilio; [`LogNotifier`] only logs and is
//! used when no `SendGrid` key is configured.

pub mod http;

pub use http::HttpNotifier;

use async_trait::async_trait;

use dockpay_core::paypal::TransactionItem;
use dockpay_core::{LineItemRecord, MerchantConfig, PaymentRecord, TwilioCredentials};

/// Subject of every purchase email.
pub const PURCHASE_SUBJECT: &str = "Tickets Purchased";

/// Display name of the alert sender.
const ALERT_SENDER_NAME: &str = "Do Not Reply";

/// Error type for notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The delivery service rejected the message.
    #[error("{service} rejected message: HTTP {status}: {body}")]
    Rejected {
        /// `sendgrid` or `twilio`.
        service: &'static str,
        /// Response status.
        status: u16,
        /// Response body, for the log.
        body: String,
    },
}

/// An email address with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// Email address.
    pub email: String,
    /// Display name; may be empty.
    pub name: String,
}

impl Address {
    /// Create an address.
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
        }
    }
}

/// A rendered HTML email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    /// Sender.
    pub from: Address,
    /// Recipient.
    pub to: Address,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html: String,
}

/// A text message sent with a merchant's own Twilio account.
#[derive(Debug, Clone)]
pub struct SmsMessage {
    /// Destination number.
    pub to: String,
    /// Message text.
    pub body: String,
    /// Sending account.
    pub credentials: TwilioCredentials,
}

/// One line of a purchase alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchasedItem {
    /// Quantity purchased.
    pub quantity: i64,
    /// Item name.
    pub name: String,
    /// Item description, empty if none.
    pub description: String,
}

impl From<&LineItemRecord> for PurchasedItem {
    fn from(item: &LineItemRecord) -> Self {
        Self {
            quantity: item.quantity,
            name: item.name.clone(),
            description: item.description.clone(),
        }
    }
}

impl From<&TransactionItem> for PurchasedItem {
    fn from(item: &TransactionItem) -> Self {
        Self {
            quantity: item.quantity,
            name: item.name.clone(),
            description: item.description.clone().unwrap_or_default(),
        }
    }
}

/// Message delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver an email.
    async fn send_email(&self, message: &EmailMessage) -> Result<(), NotifyError>;

    /// Deliver a text message.
    async fn send_sms(&self, message: &SmsMessage) -> Result<(), NotifyError>;
}

/// Notifier that logs messages instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_email(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        tracing::info!(
            from = %message.from.email,
            to = %message.to.email,
            subject = %message.subject,
            "Email delivery not configured, logging only"
        );
        Ok(())
    }

    async fn send_sms(&self, message: &SmsMessage) -> Result<(), NotifyError> {
        tracing::info!(to = %message.to, body = %message.body, "SMS delivery not configured, logging only");
        Ok(())
    }
}

// ============================================================================
// Message composition
// ============================================================================

/// Receipt sent to the customer when a payment succeeds.
///
/// Returns `None` when the payment carries no customer email.
#[must_use]
pub fn customer_receipt(
    merchant: &MerchantConfig,
    payment: &PaymentRecord,
    public_base_url: &str,
) -> Option<EmailMessage> {
    if payment.email.trim().is_empty() {
        return None;
    }

    let mut html = merchant.email_content.clone();
    html.push_str("<br /><br />");
    if let Some(receipt) = payment.receipt_url.as_deref() {
        let receipt = escape_html(receipt);
        html.push_str(&format!(
            "Your receipt can be accessed <a href='{receipt}'>here</a>.<br />\
             If clicking on that doesn't work, copy and paste the following URL into \
             your browser to access your receipt: {receipt}.<br /><br />"
        ));
    }
    let passes = format!(
        "{}/info/{}/passes/{}",
        public_base_url.trim_end_matches('/'),
        merchant.id,
        payment.payment_id
    );
    html.push_str(&format!(
        "You can download your boarding passes here: <a href='{}'>Click Here</a><br />",
        escape_html(&passes)
    ));

    Some(EmailMessage {
        from: Address::new(&merchant.email_from, &merchant.email_name),
        to: Address::new(&payment.email, &payment.name),
        subject: PURCHASE_SUBJECT.to_string(),
        html,
    })
}

/// Purchase alert sent to the merchant, listing the purchased items.
#[must_use]
pub fn purchase_alert(
    merchant: &MerchantConfig,
    payment: &PaymentRecord,
    items: &[PurchasedItem],
    notify_from: &str,
) -> EmailMessage {
    let payer = escape_html(&payment.name);
    let email = escape_html(&payment.email);

    let mut html = format!(
        "Tickets Purchased By: {payer} <a href='mailto:{email}'>{email}</a><br /><br /><ul>"
    );
    for item in items {
        html.push_str(&format!("<li>{} {}", item.quantity, escape_html(&item.name)));
        if !item.description.trim().is_empty() {
            html.push(' ');
            html.push_str(&escape_html(item.description.trim()));
        }
        html.push_str("</li>");
    }
    html.push_str("</ul>");

    EmailMessage {
        from: Address::new(notify_from, ALERT_SENDER_NAME),
        to: Address::new(&merchant.email_from, &merchant.email_name),
        subject: PURCHASE_SUBJECT.to_string(),
        html,
    }
}

/// SMS alert for merchants that opted in.
#[must_use]
pub fn purchase_sms(merchant: &MerchantConfig, payment: &PaymentRecord) -> Option<SmsMessage> {
    let (number, credentials) = merchant.sms_target()?;
    Some(SmsMessage {
        to: number.to_string(),
        body: format!("Tickets Purchased by {}", payment.name),
        credentials: credentials.clone(),
    })
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
