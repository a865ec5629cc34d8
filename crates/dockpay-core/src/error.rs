//! Error types for dockpay core.

/// Errors produced while decoding a provider payload into a [`crate::PaymentEvent`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The payload is not valid JSON, lacks its discriminator, or has the wrong
    /// shape for a recognized discriminator.
    #[error("malformed {provider} payload: {message}")]
    MalformedPayload {
        /// Provider the payload claims to come from.
        provider: &'static str,
        /// What was wrong.
        message: String,
    },
}

impl DecodeError {
    pub(crate) fn malformed(provider: &'static str, message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            provider,
            message: message.into(),
        }
    }
}

/// Errors converting external money representations into minor units.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    /// The value is not a decimal number.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The value does not fit in `i64` minor units.
    #[error("amount out of range: {0}")]
    OutOfRange(String),
}

/// Errors produced by the fee calculator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeeError {
    /// The cart contained no items.
    #[error("cart is empty")]
    EmptyCart,

    /// An item's quantity was zero or negative.
    #[error("invalid quantity for {item}: {quantity}")]
    InvalidQuantity {
        /// Item name.
        item: String,
        /// Offending quantity.
        quantity: i64,
    },

    /// An item's unit price was negative.
    #[error("negative unit price for {item}")]
    NegativePrice {
        /// Item name.
        item: String,
    },

    /// Items were priced in different currencies.
    #[error("mixed currencies in cart: {expected} and {found}")]
    MixedCurrency {
        /// Currency of the first item.
        expected: String,
        /// Conflicting currency.
        found: String,
    },

    /// A unit price could not be converted to minor units.
    #[error(transparent)]
    Money(#[from] MoneyError),

    /// Totals overflowed `i64`.
    #[error("cart total overflow")]
    Overflow,
}
