//! Session-stored cart and aside state.
//!
//! A session remembers which backend cart belongs to the visitor and which
//! aside panel is open. Everything else about the cart lives in its
//! coordinator.

use strider_core::{AsideState, CartId};
use tower_sessions::Session;

/// Session keys.
pub mod keys {
    /// Key for storing the Shopify cart ID.
    pub const CART_ID: &str = "cart_id";

    /// Key for storing the open aside panel.
    pub const ASIDE: &str = "aside";
}

/// Get the cart ID from the session.
///
/// An unreadable value is treated as no cart.
pub async fn cart_id(session: &Session) -> Option<CartId> {
    match session.get::<CartId>(keys::CART_ID).await {
        Ok(cart_id) => cart_id,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read cart ID from session");
            None
        }
    }
}

/// Set the cart ID in the session.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn set_cart_id(
    session: &Session,
    cart_id: &CartId,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(keys::CART_ID, cart_id).await
}

/// Forget the session's cart, e.g. after it expired on the backend.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn clear_cart_id(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.remove::<CartId>(keys::CART_ID).await.map(|_| ())
}

/// Get the aside state, closed if none is stored.
pub async fn aside(session: &Session) -> AsideState {
    session
        .get::<AsideState>(keys::ASIDE)
        .await
        .ok()
        .flatten()
        .unwrap_or_default()
}

/// Store the aside state.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn set_aside(
    session: &Session,
    aside: AsideState,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(keys::ASIDE, aside).await
}
