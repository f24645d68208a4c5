//! Strider Core - Cart domain library.
//!
//! This crate holds the storefront's cart model and the rules that keep
//! optimistic cart rendering consistent with the commerce backend:
//!
//! - `storefront` - Public-facing web service that drives this core
//! - `integration-tests` - End-to-end cart scenarios
//!
//! # Architecture
//!
//! The core crate contains only types and pure state machines - no I/O, no
//! HTTP clients, no async runtime. Dispatching requests to the backend is the
//! caller's job; this crate decides which results are allowed to land.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs and prices
//! - [`cart`] - Confirmed cart state, mutation coalescing, optimistic projection
//! - [`aside`] - Which side panel (cart, search, mobile menu) is open

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod aside;
pub mod cart;
pub mod types;

pub use aside::{AsidePanel, AsideState, UnknownPanel};
pub use cart::*;
pub use types::*;
