//! Merchant registry.
//!
//! Merchant configuration is owned elsewhere; the service loads it once at
//! startup from a JSON file holding an array of [`MerchantConfig`].

use std::collections::HashMap;
use std::path::Path;

use dockpay_core::{AccountId, MerchantConfig, MerchantId};

/// Error type for loading the registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The file could not be read.
    #[error("failed to read merchants file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a JSON array of merchants.
    #[error("invalid merchants file: {0}")]
    Parse(#[from] serde_json::Error),

    /// Two entries share an id.
    #[error("duplicate merchant id: {0}")]
    Duplicate(MerchantId),
}

/// Read-only lookup of merchants by id and by account scope.
#[derive(Debug, Default, Clone)]
pub struct MerchantRegistry {
    by_id: HashMap<MerchantId, MerchantConfig>,
}

impl MerchantRegistry {
    /// Build a registry from a list of merchants.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Duplicate` if two merchants share an id.
    pub fn new(merchants: Vec<MerchantConfig>) -> Result<Self, RegistryError> {
        let mut by_id = HashMap::with_capacity(merchants.len());
        for merchant in merchants {
            if by_id.contains_key(&merchant.id) {
                return Err(RegistryError::Duplicate(merchant.id));
            }
            by_id.insert(merchant.id.clone(), merchant);
        }
        Ok(Self { by_id })
    }

    /// Load a registry from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or holds
    /// duplicate ids.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let contents = std::fs::read_to_string(path)?;
        let merchants: Vec<MerchantConfig> = serde_json::from_str(&contents)?;
        Self::new(merchants)
    }

    /// Merchant by local id.
    #[must_use]
    pub fn get(&self, id: &MerchantId) -> Option<&MerchantConfig> {
        self.by_id.get(id)
    }

    /// Merchant owning a Stripe connected account or PayPal merchant id.
    #[must_use]
    pub fn for_account(&self, account: &AccountId) -> Option<&MerchantConfig> {
        self.by_id.values().find(|m| m.owns(account))
    }

    /// Number of merchants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MERCHANTS: &str = r#"[
        {
            "id": "harbor",
            "email_name": "Harbor Cruises",
            "email_from": "tickets@harbor.test",
            "stripe_account": "acct_harbor",
            "paypal_merchant_id": "HARBORPP"
        },
        {
            "id": "lake",
            "email_name": "Lake Ferries",
            "email_from": "tickets@lake.test"
        }
    ]"#;

    #[test]
    fn loads_and_looks_up_merchants() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MERCHANTS.as_bytes()).unwrap();

        let registry = MerchantRegistry::load(file.path()).unwrap();
        assert_eq!(registry.len(), 2);

        let harbor = registry.get(&MerchantId::new("harbor").unwrap()).unwrap();
        assert_eq!(harbor.email_name, "Harbor Cruises");

        let by_stripe = registry
            .for_account(&AccountId::new("acct_harbor").unwrap())
            .unwrap();
        assert_eq!(by_stripe.id, harbor.id);
        let by_paypal = registry
            .for_account(&AccountId::new("HARBORPP").unwrap())
            .unwrap();
        assert_eq!(by_paypal.id, harbor.id);

        assert!(registry.for_account(&AccountId::platform()).is_none());
    }

    #[test]
    fn rejects_duplicates() {
        let merchants: Vec<MerchantConfig> = serde_json::from_str(MERCHANTS).unwrap();
        let doubled = merchants.iter().chain(&merchants).cloned().collect();
        assert!(matches!(
            MerchantRegistry::new(doubled),
            Err(RegistryError::Duplicate(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            MerchantRegistry::load("/nonexistent/merchants.json"),
            Err(RegistryError::Io(_))
        ));
    }
}
