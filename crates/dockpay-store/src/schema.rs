//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Payment records, keyed by `account \0 payment_id`.
    pub const PAYMENTS: &str = "payments";

    /// Line items, keyed by `account \0 payment_id \0 line_item_id`.
    pub const LINE_ITEMS: &str = "line_items";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::PAYMENTS, cf::LINE_ITEMS]
}
