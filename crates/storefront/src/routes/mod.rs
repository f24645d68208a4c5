//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Health check
//!
//! # Cart (HTMX fragments)
//! GET  /cart                   - Cart page
//! POST /cart/add               - Add to cart (returns aside fragment, triggers cart-updated)
//! POST /cart/update            - Set quantity (returns cart_lines fragment, or 204 if superseded)
//! POST /cart/adjust            - +/- quantity (returns cart_lines fragment, or 204 if superseded)
//! POST /cart/remove            - Remove line (returns cart_lines fragment, or 204 if superseded)
//! POST /cart/discount          - Apply discount code (returns cart_lines fragment)
//! POST /cart/discount/remove   - Remove discount code (returns cart_lines fragment)
//! GET  /cart/count             - Cart count badge (fragment)
//!
//! # Checkout
//! GET  /checkout               - Redirect to Shopify checkout
//!
//! # Aside (HTMX fragments)
//! POST /aside/close            - Close the aside
//! POST /aside/{panel}          - Open mobile, cart or search
//! POST /aside/{panel}/toggle   - Open, or close if already open
//! ```

pub mod aside;
pub mod cart;

use axum::{
    Router,
    routing::{get, post},
};

use crate::middleware::cart_rate_limiter;
use crate::services::CartBackend;
use crate::state::AppState;

/// Create the cart routes router.
///
/// Line and discount changes are rate limited per client IP.
pub fn cart_routes<B: CartBackend>() -> Router<AppState<B>> {
    let mutations = Router::new()
        .route("/add", post(cart::add::<B>))
        .route("/update", post(cart::update::<B>))
        .route("/adjust", post(cart::adjust::<B>))
        .route("/remove", post(cart::remove::<B>))
        .route("/discount", post(cart::apply_discount::<B>))
        .route("/discount/remove", post(cart::remove_discount::<B>))
        .route_layer(cart_rate_limiter());

    Router::new()
        .route("/", get(cart::show::<B>))
        .route("/count", get(cart::count::<B>))
        .merge(mutations)
}

/// Create the aside routes router.
pub fn aside_routes<B: CartBackend>() -> Router<AppState<B>> {
    Router::new()
        .route("/close", post(aside::close::<B>))
        .route("/{panel}", post(aside::open::<B>))
        .route("/{panel}/toggle", post(aside::toggle::<B>))
}

/// Create all routes for the storefront.
pub fn routes<B: CartBackend>() -> Router<AppState<B>> {
    Router::new()
        .route("/health", get(health))
        .nest("/cart", cart_routes())
        .route("/checkout", get(cart::checkout::<B>))
        .nest("/aside", aside_routes())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check Shopify.
async fn health() -> &'static str {
    "ok"
}
