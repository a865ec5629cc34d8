//! Identifier types for dockpay.
//!
//! Providers hand us opaque string identifiers (`PAY-…`, `pi_…`, `acct_…`,
//! `li_…`). They are wrapped in newtypes so a payment id can never be passed
//! where an account scope is expected.
//!
//! # Macro-based ID Types
//!
//! The `provider_id_type!` macro reduces boilerplate for string-based identifier
//! types, ensuring consistent implementation of serialization, parsing, and
//! display traits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account scope used when a provider event carries no connected account.
pub const PLATFORM_ACCOUNT: &str = "platform";

/// Macro to define a string-based identifier type with standard trait implementations.
///
/// This macro generates a newtype wrapper around `String` with implementations for:
/// - `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - `Serialize`, `Deserialize` (as string, rejecting empty values and control characters)
/// - `FromStr`, `Display`, `Debug`
/// - `TryFrom<String>`, `Into<String>`
/// - `AsRef<str>`
macro_rules! provider_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create an identifier, rejecting blank values and control
            /// characters.
            ///
            /// # Errors
            ///
            /// Returns `IdError::Empty` if the value is blank and
            /// `IdError::ControlCharacter` if it contains one (NUL separates
            /// key segments in the store).
            pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(IdError::Empty(stringify!($name)));
                }
                if value.chars().any(char::is_control) {
                    return Err(IdError::ControlCharacter(stringify!($name)));
                }
                Ok(Self(value))
            }

            /// Return the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Return the raw bytes of the identifier.
            #[must_use]
            pub fn as_bytes(&self) -> &[u8] {
                self.0.as_bytes()
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

provider_id_type!(
    PaymentId,
    "A provider payment identifier.\n\nPayPal payment ids (`PAY-…`) and Stripe payment intent ids (`pi_…`)."
);
provider_id_type!(
    AccountId,
    "A merchant account scope.\n\nStripe connected account ids (`acct_…`) or PayPal payee merchant ids."
);
provider_id_type!(LineItemId, "A provider line item identifier (`li_…`).");
provider_id_type!(EventId, "A provider webhook event identifier.");
provider_id_type!(MerchantId, "A local merchant identifier.");

impl AccountId {
    /// The platform account scope, used when an event is not scoped to a
    /// connected account.
    #[must_use]
    pub fn platform() -> Self {
        Self(PLATFORM_ACCOUNT.to_string())
    }
}

/// Error type for identifier parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// Identifier was empty.
    #[error("{0} must not be empty")]
    Empty(&'static str),

    /// Identifier contained a control character.
    #[error("{0} must not contain control characters")]
    ControlCharacter(&'static str),
}

/// Composite key of a payment record.
///
/// The same payment identifier space can span several merchant-isolated
/// accounts, so the account is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentKey {
    /// Provider payment identifier.
    pub payment_id: PaymentId,
    /// Account scope.
    pub account: AccountId,
}

impl PaymentKey {
    /// Create a new payment key.
    #[must_use]
    pub const fn new(payment_id: PaymentId, account: AccountId) -> Self {
        Self {
            payment_id,
            account,
        }
    }
}

impl fmt::Display for PaymentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.payment_id, self.account)
    }
}
