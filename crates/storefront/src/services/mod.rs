//! Business logic services for storefront.
//!
//! # Services
//!
//! - `cart` - Cart line mutations coordinated per cart, on top of the
//!   Shopify Storefront cart API

pub mod cart;

pub use cart::{CartBackend, CartError, CartService, CartUpdate};
