//! API handlers.

pub mod checkout;
pub mod health;
pub mod payments;
pub mod webhooks;

use dockpay_core::{MerchantConfig, MerchantId};

use crate::error::ApiError;
use crate::state::AppState;

/// Look up a merchant named in a request path.
fn merchant<'a>(state: &'a AppState, merchant_id: &str) -> Result<&'a MerchantConfig, ApiError> {
    MerchantId::new(merchant_id)
        .ok()
        .and_then(|id| state.merchants.get(&id))
        .ok_or_else(|| ApiError::NotFound(format!("Merchant not found: {merchant_id}")))
}
