//! Core types and utilities for dockpay.
//!
//! This crate holds everything that does not need I/O:
//!
//! - **Identifiers**: `PaymentId`, `AccountId`, `LineItemId`, `EventId`, `MerchantId`
//! - **Ledger**: `PaymentRecord`, `PaymentUpdate`, `LineItemRecord`, `PaymentStatus`
//! - **Provider payloads**: `paypal` and `stripe` wire types and their decoders
//! - **Events**: the closed `PaymentEvent` sum type
//! - **Fees**: the checkout fee calculator
//! - **Merchants**: `MerchantConfig`
//!
//! # Money
//!
//! Amounts are stored as `i64` minor units (cents). Provider decimals such as
//! `"30.11"` are converted once, at decode time.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod event;
pub mod fees;
pub mod ids;
pub mod ledger;
pub mod merchant;
pub mod money;
pub mod paypal;
pub mod stripe;

pub use error::{DecodeError, FeeError, MoneyError};
pub use event::{PaymentEvent, UnrecognizedEvent};
pub use fees::{
    quote, CartLineItem, CheckoutQuote, Money, PricedLineItem, APPLICATION_FEE_PERCENT,
    FEE_ITEM_NAME, FEE_PER_TIER_CENTS, FEE_TIER_CENTS,
};
pub use ids::{
    AccountId, EventId, IdError, LineItemId, MerchantId, PaymentId, PaymentKey, PLATFORM_ACCOUNT,
};
pub use ledger::{
    LineItemRecord, Notification, PaymentRecord, PaymentStatus, PaymentUpdate, Provider, Upserted,
};
pub use merchant::{MerchantConfig, TwilioCredentials};
pub use money::{format_minor_units, normalize_currency, parse_minor_units, to_minor_units};
