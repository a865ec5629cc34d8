//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options,
};

use dockpay_core::{
    LineItemRecord, Notification, PaymentKey, PaymentRecord, PaymentUpdate, Upserted,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    /// Serializes read-merge-write cycles.
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::debug!("opened rocksdb ledger");

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Database("write lock poisoned".into()))
    }

    fn get<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn put<T: serde::Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let value = Self::serialize(value)?;
        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Payment Operations
    // =========================================================================

    fn upsert_payment(&self, update: &PaymentUpdate) -> Result<Upserted> {
        let key = keys::payment_key(&update.key);
        let _guard = self.lock()?;

        let previous: Option<PaymentRecord> = self.get(cf::PAYMENTS, &key)?;
        let upserted = Upserted::apply(previous, update, Utc::now());
        if upserted.changed() {
            self.put(cf::PAYMENTS, &key, &upserted.current)?;
        }
        Ok(upserted)
    }

    fn get_payment(&self, key: &PaymentKey) -> Result<Option<PaymentRecord>> {
        self.get(cf::PAYMENTS, &keys::payment_key(key))
    }

    fn mark_notified(&self, key: &PaymentKey, kind: Notification, at: DateTime<Utc>) -> Result<bool> {
        let key = keys::payment_key(key);
        let _guard = self.lock()?;

        let Some(mut record): Option<PaymentRecord> = self.get(cf::PAYMENTS, &key)? else {
            return Ok(false);
        };
        if !record.mark_notified(kind, at) {
            return Ok(false);
        }
        self.put(cf::PAYMENTS, &key, &record)?;
        Ok(true)
    }

    // =========================================================================
    // Line Item Operations
    // =========================================================================

    fn upsert_line_item(&self, item: &LineItemRecord) -> Result<bool> {
        let key = keys::line_item_key(&item.payment_key(), &item.id);
        let _guard = self.lock()?;

        let previous: Option<LineItemRecord> = self.get(cf::LINE_ITEMS, &key)?;
        if previous.as_ref() != Some(item) {
            self.put(cf::LINE_ITEMS, &key, item)?;
        }
        Ok(previous.is_none())
    }

    fn list_line_items(&self, key: &PaymentKey) -> Result<Vec<LineItemRecord>> {
        let cf = self.cf(cf::LINE_ITEMS)?;
        let prefix = keys::line_items_prefix(key);

        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut items = Vec::new();
        for entry in iter {
            let (k, value) = entry.map_err(|e| StoreError::Database(e.to_string()))?;
            if !k.starts_with(&prefix) {
                break;
            }
            items.push(Self::deserialize(&value)?);
        }
        Ok(items)
    }
}
