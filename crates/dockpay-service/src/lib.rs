//! Dockpay HTTP service.
//!
//! This crate receives payment webhooks from PayPal and Stripe, verifies them,
//! and reconciles them into the settlement ledger:
//!
//! - PayPal notifications are authenticated against the signing certificate
//!   named in the request ([`paypal`])
//! - Stripe notifications are authenticated with the endpoint secret
//!   ([`stripe::signature`])
//! - decoded events are applied by the [`reconcile::Reconciler`], which
//!   notifies customers and merchants once per payment
//!
//! It also creates Stripe checkout sessions for storefront carts, pricing them
//! with [`dockpay_core::fees`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for the router

pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod merchants;
pub mod notify;
pub mod paypal;
pub mod reconcile;
pub mod routes;
pub mod state;
pub mod stripe;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use merchants::{MerchantRegistry, RegistryError};
pub use notify::{EmailMessage, LogNotifier, Notifier, NotifyError, SmsMessage};
pub use reconcile::{Outcome, ReconcileError, ReconciliationResult, Reconciler};
pub use routes::create_router;
pub use state::AppState;
pub use stripe::{NewCheckoutSession, PaymentsApi, StripeClient, StripeError};
