//! In-memory storage implementation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use dockpay_core::{
    LineItemRecord, Notification, PaymentKey, PaymentRecord, PaymentUpdate, Upserted,
};

use crate::error::Result;
use crate::Store;

/// `DashMap`-backed storage.
///
/// Upserts hold the shard lock of their key for the whole read-merge-write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    payments: DashMap<PaymentKey, PaymentRecord>,
    line_items: DashMap<PaymentKey, BTreeMap<String, LineItemRecord>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn upsert_payment(&self, update: &PaymentUpdate) -> Result<Upserted> {
        let now = Utc::now();
        let upserted = match self.payments.entry(update.key.clone()) {
            Entry::Occupied(mut entry) => {
                let upserted = Upserted::apply(Some(entry.get().clone()), update, now);
                entry.insert(upserted.current.clone());
                upserted
            }
            Entry::Vacant(entry) => {
                let upserted = Upserted::apply(None, update, now);
                entry.insert(upserted.current.clone());
                upserted
            }
        };
        Ok(upserted)
    }

    fn get_payment(&self, key: &PaymentKey) -> Result<Option<PaymentRecord>> {
        Ok(self.payments.get(key).map(|r| r.value().clone()))
    }

    fn mark_notified(&self, key: &PaymentKey, kind: Notification, at: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .payments
            .get_mut(key)
            .is_some_and(|mut record| record.mark_notified(kind, at)))
    }

    fn upsert_line_item(&self, item: &LineItemRecord) -> Result<bool> {
        let mut items = self.line_items.entry(item.payment_key()).or_default();
        let previous = items.insert(item.id.as_str().to_string(), item.clone());
        Ok(previous.is_none())
    }

    fn list_line_items(&self, key: &PaymentKey) -> Result<Vec<LineItemRecord>> {
        Ok(self
            .line_items
            .get(key)
            .map(|items| items.values().cloned().collect())
            .unwrap_or_default())
    }
}
