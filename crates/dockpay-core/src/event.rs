//! The closed set of provider events the reconciler understands.

use crate::ids::PaymentKey;
use crate::ledger::Provider;
use crate::paypal::{Payment, PayPalEvent, Sale};
use crate::stripe::{Charge, CheckoutSession, PaymentIntent, StripeEvent};

/// A decoded webhook event.
#[derive(Debug, Clone)]
pub enum PaymentEvent {
    /// PayPal `payment` resource.
    PayPalPaymentCompleted(PayPalEvent<Payment>),
    /// PayPal `sale` resource.
    PayPalSaleCompleted(PayPalEvent<Sale>),
    /// Stripe `payment_intent.succeeded`.
    StripePaymentIntentSucceeded(StripeEvent<PaymentIntent>),
    /// Stripe `checkout.session.completed`.
    StripeCheckoutSessionCompleted(StripeEvent<CheckoutSession>),
    /// Stripe `charge.refunded`.
    StripeChargeRefunded(StripeEvent<Charge>),
    /// Well-formed event of a type with no handler.
    Unrecognized(UnrecognizedEvent),
}

/// An event whose discriminator has no handler. Acknowledged, never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrecognizedEvent {
    /// Provider that sent it.
    pub provider: Provider,
    /// PayPal `resource_type` or Stripe `type`.
    pub discriminator: String,
    /// Provider event id.
    pub event_id: String,
}

impl PaymentEvent {
    /// Provider that sent the event.
    #[must_use]
    pub const fn provider(&self) -> Provider {
        match self {
            Self::PayPalPaymentCompleted(_) | Self::PayPalSaleCompleted(_) => Provider::PayPal,
            Self::StripePaymentIntentSucceeded(_)
            | Self::StripeCheckoutSessionCompleted(_)
            | Self::StripeChargeRefunded(_) => Provider::Stripe,
            Self::Unrecognized(e) => e.provider,
        }
    }

    /// Short name of the event kind, for logs.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::PayPalPaymentCompleted(_) => "payment",
            Self::PayPalSaleCompleted(_) => "sale",
            Self::StripePaymentIntentSucceeded(_) => crate::stripe::PAYMENT_INTENT_SUCCEEDED,
            Self::StripeCheckoutSessionCompleted(_) => crate::stripe::CHECKOUT_SESSION_COMPLETED,
            Self::StripeChargeRefunded(_) => crate::stripe::CHARGE_REFUNDED,
            Self::Unrecognized(e) => &e.discriminator,
        }
    }

    /// Provider event id.
    #[must_use]
    pub fn event_id(&self) -> &str {
        match self {
            Self::PayPalPaymentCompleted(e) => e.id.as_str(),
            Self::PayPalSaleCompleted(e) => e.id.as_str(),
            Self::StripePaymentIntentSucceeded(e) => e.id.as_str(),
            Self::StripeCheckoutSessionCompleted(e) => e.id.as_str(),
            Self::StripeChargeRefunded(e) => e.id.as_str(),
            Self::Unrecognized(e) => &e.event_id,
        }
    }

    /// Ledger key the event writes to, if it writes at all.
    #[must_use]
    pub fn payment_key(&self) -> Option<PaymentKey> {
        match self {
            Self::PayPalPaymentCompleted(e) => e.resource.key().ok(),
            Self::StripePaymentIntentSucceeded(e) => e.payment_key(),
            Self::StripeCheckoutSessionCompleted(e) => e.payment_key(),
            Self::StripeChargeRefunded(e) => e.payment_key(),
            Self::PayPalSaleCompleted(_) | Self::Unrecognized(_) => None,
        }
    }
}
