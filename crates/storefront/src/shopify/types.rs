//! Input and error types for Shopify Storefront cart operations.
//!
//! Responses are converted straight into `strider_core` cart types; only the
//! values we send, and the user errors we get back, live here.

use serde::{Deserialize, Serialize};
use strider_core::MerchandiseId;

/// A line to add to a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCartLine {
    /// Product variant ID.
    pub merchandise_id: MerchandiseId,
    /// Quantity to add. Always at least 1.
    pub quantity: u32,
}

impl NewCartLine {
    /// A line for `quantity` units of a variant.
    #[must_use]
    pub const fn new(merchandise_id: MerchandiseId, quantity: u32) -> Self {
        Self {
            merchandise_id,
            quantity,
        }
    }
}

/// User error from cart mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartUserError {
    /// Error code (e.g. `INVALID`, `MERCHANDISE_NOT_ENOUGH_STOCK`).
    pub code: Option<String>,
    /// Field path that caused the error.
    pub field: Option<Vec<String>>,
    /// Human-readable error message.
    pub message: String,
}
