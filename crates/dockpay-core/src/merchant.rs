//! Merchant configuration.
//!
//! Merchants are configured outside this system; dockpay only reads them to
//! scope checkouts and to address notifications.

use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, MerchantId};

/// Twilio credentials used for a merchant's SMS alerts.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwilioCredentials {
    /// Account SID.
    pub account_sid: String,
    /// Auth token.
    pub auth_token: String,
    /// Sending phone number.
    pub from_number: String,
}

impl std::fmt::Debug for TwilioCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioCredentials")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .field("from_number", &self.from_number)
            .finish()
    }
}

/// A merchant known to the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantConfig {
    /// Local merchant id, used in checkout URLs.
    pub id: MerchantId,
    /// Display name used as the sender name.
    pub email_name: String,
    /// Merchant address: sender of receipts and recipient of purchase alerts.
    pub email_from: String,
    /// HTML prepended to customer receipts.
    #[serde(default)]
    pub email_content: String,
    /// Stripe connected account.
    #[serde(default)]
    pub stripe_account: Option<AccountId>,
    /// PayPal payee merchant id.
    #[serde(default)]
    pub paypal_merchant_id: Option<AccountId>,
    /// Whether to text `notify_number` on each purchase.
    #[serde(default)]
    pub send_sms: bool,
    /// Phone number receiving purchase alerts.
    #[serde(default)]
    pub notify_number: Option<String>,
    /// Twilio credentials for purchase alerts.
    #[serde(default)]
    pub twilio: Option<TwilioCredentials>,
}

impl MerchantConfig {
    /// Whether this merchant owns the given account scope.
    #[must_use]
    pub fn owns(&self, account: &AccountId) -> bool {
        self.stripe_account.as_ref() == Some(account)
            || self.paypal_merchant_id.as_ref() == Some(account)
    }

    /// SMS target and credentials, when SMS alerts are enabled and complete.
    #[must_use]
    pub fn sms_target(&self) -> Option<(&str, &TwilioCredentials)> {
        if !self.send_sms {
            return None;
        }
        let number = self.notify_number.as_deref().filter(|n| !n.is_empty())?;
        Some((number, self.twilio.as_ref()?))
    }
}
