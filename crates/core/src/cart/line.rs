//! Confirmed cart state.
//!
//! A [`Cart`] is exactly what the commerce backend last returned. Nothing in
//! this crate edits it in place: a successful mutation replaces it wholesale,
//! and optimistic values live only in the projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CartId, LineId, MerchandiseId, Price, ProductId};

/// A selected product option such as `Size: 9`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedOption {
    pub name: String,
    pub value: String,
}

/// Display data for the variant a line was bought as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineMerchandise {
    /// Parent product ID.
    pub product_id: ProductId,
    /// Product handle.
    pub product_handle: String,
    /// Product title.
    pub product_title: String,
    /// Variant title, `None` for single-variant products.
    pub variant_title: Option<String>,
    /// Variant image URL.
    pub image_url: Option<String>,
    /// Options that identify the variant.
    pub selected_options: Vec<SelectedOption>,
}

/// Server-computed cost of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineCost {
    /// Price per unit.
    pub amount_per_quantity: Price,
    /// Quantity times unit price, after line-level discounts.
    pub total_amount: Price,
}

/// One purchasable entry in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Stable line identifier, unique within the cart.
    pub id: LineId,
    /// Purchased variant. Never changes for the life of the line.
    pub merchandise_id: MerchandiseId,
    /// Quantity; the backend drops lines that reach zero.
    pub quantity: u32,
    /// Line cost as computed by the backend.
    pub cost: LineCost,
    /// Variant display data.
    pub merchandise: LineMerchandise,
}

/// A discount code entered on the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountCode {
    pub code: String,
    /// False when the code exists but does not apply to this cart's contents.
    pub applicable: bool,
}

/// A gift card redeemed against the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedGiftCard {
    /// Last characters of the card code, the only part ever shown.
    pub last_characters: String,
    /// Amount taken from the card for this cart.
    pub amount_used: Price,
}

/// The cart aggregate as last confirmed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    /// Backend cart ID.
    pub id: CartId,
    /// Hosted checkout URL.
    pub checkout_url: String,
    /// Backend modification time, used to order snapshots.
    pub updated_at: DateTime<Utc>,
    /// Lines in backend order.
    pub lines: Vec<CartLine>,
    /// Total item quantity as reported by the backend.
    pub total_quantity: u32,
    /// Subtotal before tax and shipping.
    pub subtotal: Price,
    /// Total amount.
    pub total: Price,
    /// Discount codes in the order they were entered.
    #[serde(default)]
    pub discount_codes: Vec<DiscountCode>,
    /// Gift cards applied at checkout.
    #[serde(default)]
    pub applied_gift_cards: Vec<AppliedGiftCard>,
}

impl Cart {
    /// Find a line by ID.
    #[must_use]
    pub fn line(&self, id: &LineId) -> Option<&CartLine> {
        self.lines.iter().find(|line| &line.id == id)
    }

    /// Whether the cart currently has a line with this ID.
    #[must_use]
    pub fn contains(&self, id: &LineId) -> bool {
        self.line(id).is_some()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Codes of discounts that currently apply.
    pub fn applicable_discount_codes(&self) -> impl Iterator<Item = &str> {
        self.discount_codes
            .iter()
            .filter(|discount| discount.applicable)
            .map(|discount| discount.code.as_str())
    }

    /// Whether `self` was produced strictly before `other` on the backend.
    #[must_use]
    pub fn is_older_than(&self, other: &Self) -> bool {
        self.updated_at < other.updated_at
    }

    /// Whether `self` and `other` differ but carry the same timestamp.
    ///
    /// The backend reports `updatedAt` to the second, so two writes landing
    /// in the same second cannot be ordered from their snapshots alone.
    #[must_use]
    pub fn is_concurrent_with(&self, other: &Self) -> bool {
        self.updated_at == other.updated_at && self != other
    }
}
