//! Stripe integration: follow-up API calls and webhook signatures.
//!
//! The reconciler and checkout handlers talk to Stripe through the
//! [`PaymentsApi`] trait so tests can substitute a fake.

pub mod client;
pub mod signature;
pub mod types;

pub use client::{StripeClient, StripeError};
pub use signature::{verify_signature, DEFAULT_TOLERANCE_SECS};
pub use types::{NewCheckoutSession, StripeErrorDetail, StripeErrorResponse};

use async_trait::async_trait;

use dockpay_core::stripe::{CheckoutSession, LineItem, PaymentIntent};
use dockpay_core::AccountId;

/// Stripe calls made on behalf of a (possibly connected) account.
#[async_trait]
pub trait PaymentsApi: Send + Sync {
    /// Retrieve a payment intent with its latest charge expanded.
    async fn get_payment_intent(
        &self,
        account: &AccountId,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent, StripeError>;

    /// Retrieve every line item of a checkout session, following pagination.
    async fn list_line_items(
        &self,
        account: &AccountId,
        session_id: &str,
    ) -> Result<Vec<LineItem>, StripeError>;

    /// Create a hosted checkout session.
    async fn create_checkout_session(
        &self,
        account: &AccountId,
        session: &NewCheckoutSession,
    ) -> Result<CheckoutSession, StripeError>;

    /// Retrieve a checkout session.
    async fn get_checkout_session(
        &self,
        account: &AccountId,
        session_id: &str,
    ) -> Result<CheckoutSession, StripeError>;
}
