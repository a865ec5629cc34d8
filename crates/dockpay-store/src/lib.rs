//! Storage layer for dockpay.
//!
//! This crate persists the settlement ledger: one [`PaymentRecord`] per
//! `(payment_id, account)` and the line items of completed checkouts.
//!
//! Every write is an upsert. Applying the same write twice leaves the store
//! unchanged, which is what makes webhook redelivery safe.
//!
//! # Backends
//!
//! - [`MemoryStore`]: in-process, always available, used by tests and when no
//!   data directory is configured.
//! - `RocksStore`: `RocksDB` with column families, behind the
//!   `rocksdb-backend` feature.
//!
//! # Example
//!
//! ```
//! use dockpay_core::{AccountId, PaymentId, PaymentKey, PaymentStatus, PaymentUpdate, Provider};
//! use dockpay_store::{MemoryStore, Store};
//!
//! let store = MemoryStore::new();
//! let key = PaymentKey::new(PaymentId::new("pi_1").unwrap(), AccountId::platform());
//! let update = PaymentUpdate::status_only(key.clone(), Provider::Stripe, PaymentStatus::Succeeded);
//!
//! let first = store.upsert_payment(&update).unwrap();
//! assert!(first.entered(PaymentStatus::Succeeded));
//!
//! let again = store.upsert_payment(&update).unwrap();
//! assert!(!again.changed());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use chrono::{DateTime, Utc};
use dockpay_core::{
    LineItemRecord, Notification, PaymentKey, PaymentRecord, PaymentUpdate, Upserted,
};

/// The storage trait defining all ledger operations.
///
/// Implementations must make `upsert_payment` atomic per key: two concurrent
/// upserts of the same key must observe each other, so exactly one of them
/// sees the transition into a new status.
pub trait Store: Send + Sync {
    // =========================================================================
    // Payment Operations
    // =========================================================================

    /// Merge an update into the payment record for its key, creating the
    /// record if the key is unseen.
    ///
    /// Returns the record before and after the write.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn upsert_payment(&self, update: &PaymentUpdate) -> Result<Upserted>;

    /// Get a payment record by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_payment(&self, key: &PaymentKey) -> Result<Option<PaymentRecord>>;

    /// Record that `kind` was delivered for the payment at `key`.
    ///
    /// Returns `true` if the marker was newly set, `false` if it was already
    /// set or the payment is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn mark_notified(&self, key: &PaymentKey, kind: Notification, at: DateTime<Utc>) -> Result<bool>;

    // =========================================================================
    // Line Item Operations
    // =========================================================================

    /// Insert or replace a line item.
    ///
    /// Returns `true` if the line item key was unseen.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn upsert_line_item(&self, item: &LineItemRecord) -> Result<bool>;

    /// List the line items of a payment, ordered by line item id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_line_items(&self, key: &PaymentKey) -> Result<Vec<LineItemRecord>>;
}
