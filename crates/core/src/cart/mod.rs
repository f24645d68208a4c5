//! Cart state and the rules for mutating it optimistically.
//!
//! The pieces depend on each other in one direction:
//!
//! 1. [`line`] - confirmed cart state as last acknowledged by the backend
//! 2. [`mutation`] - line update/remove requests and their coalescing keys
//! 3. [`coordinator`] - at most one in-flight request per key, last intent wins
//! 4. [`projector`] - confirmed state with in-flight requests overlaid, for rendering

pub mod coordinator;
pub mod line;
pub mod mutation;
pub mod projector;

pub use coordinator::{
    FailureKind, MutationCoordinator, MutationFailure, MutationRequest, Resolution, Ticket,
};
pub use line::{
    AppliedGiftCard, Cart, CartLine, DiscountCode, LineCost, LineMerchandise, SelectedOption,
};
pub use mutation::{CartMutation, CoalescingKey, LineQuantity, MutationKind, RequestError};
pub use projector::{DisplayCart, DisplayLine, project};
