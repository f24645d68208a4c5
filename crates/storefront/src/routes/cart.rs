//! Cart route handlers.
//!
//! Cart operations use HTMX for dynamic updates without full page reloads.
//! Cart IDs are stored in the session and mapped to Shopify carts. Line
//! changes go through the cart service, so a response for a request that
//! was replaced by a newer one comes back empty and leaves the page alone.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use strider_core::{AsidePanel, CartId, DisplayCart, DisplayLine, LineId, MerchandiseId, Resolution};
use tower_sessions::Session;
use tracing::instrument;

use super::aside::{AsideTemplate, AsideView};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::models::session;
use crate::services::{CartBackend, CartError, CartUpdate};
use crate::shopify::NewCartLine;
use crate::state::AppState;

/// HTMX event fired whenever the cart changed.
pub const CART_UPDATED: (&str, &str) = ("HX-Trigger", "cart-updated");

/// Cart line display data for templates.
#[derive(Debug, Clone)]
pub struct CartLineView {
    pub id: String,
    pub title: String,
    pub variant_title: Option<String>,
    pub options: String,
    pub quantity: u32,
    pub price: String,
    pub line_price: String,
    pub image_url: Option<String>,
    /// Quantity shown has not been confirmed yet.
    pub pending: bool,
    /// Message for the last failed change to this line.
    pub error: Option<String>,
}

/// Discount code display data for templates.
#[derive(Debug, Clone)]
pub struct DiscountCodeView {
    pub code: String,
    pub applicable: bool,
}

/// Applied gift card display data for templates.
#[derive(Debug, Clone)]
pub struct GiftCardView {
    pub last_characters: String,
    pub amount_used: String,
}

/// Cart display data for templates.
#[derive(Debug, Clone)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    pub subtotal: String,
    pub item_count: u32,
    /// Checkout stays unavailable until every shown value is confirmed.
    pub has_pending: bool,
    pub discount_codes: Vec<DiscountCodeView>,
    pub gift_cards: Vec<GiftCardView>,
}

impl CartView {
    /// Create an empty cart.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            lines: Vec::new(),
            subtotal: "$0.00".to_string(),
            item_count: 0,
            has_pending: false,
            discount_codes: Vec::new(),
            gift_cards: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl From<&DisplayCart> for CartView {
    fn from(cart: &DisplayCart) -> Self {
        Self {
            lines: cart.lines.iter().map(CartLineView::from).collect(),
            subtotal: cart.subtotal.display(),
            item_count: cart.total_quantity,
            has_pending: cart.has_pending,
            discount_codes: cart
                .discount_codes
                .iter()
                .map(|d| DiscountCodeView {
                    code: d.code.clone(),
                    applicable: d.applicable,
                })
                .collect(),
            gift_cards: cart
                .applied_gift_cards
                .iter()
                .map(|g| GiftCardView {
                    last_characters: g.last_characters.clone(),
                    amount_used: g.amount_used.display(),
                })
                .collect(),
        }
    }
}

impl From<&DisplayLine> for CartLineView {
    fn from(display: &DisplayLine) -> Self {
        let line = &display.line;
        Self {
            id: line.id.to_string(),
            title: line.merchandise.product_title.clone(),
            variant_title: line.merchandise.variant_title.clone(),
            options: line
                .merchandise
                .selected_options
                .iter()
                .map(|o| format!("{}: {}", o.name, o.value))
                .collect::<Vec<_>>()
                .join(", "),
            quantity: line.quantity,
            price: line.cost.amount_per_quantity.display(),
            line_price: line.cost.total_amount.display(),
            image_url: line.merchandise.image_url.clone(),
            pending: display.is_optimistic,
            error: display.error.as_ref().map(|e| e.user_message()),
        }
    }
}

/// Add to cart form data.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub variant_id: String,
    pub quantity: Option<u32>,
}

/// Update cart form data.
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub line_id: String,
    pub quantity: u32,
}

/// Adjust cart form data. `delta` is usually `1` or `-1`.
#[derive(Debug, Deserialize)]
pub struct AdjustCartForm {
    pub line_id: String,
    pub delta: i64,
}

/// Remove from cart form data.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartForm {
    pub line_id: String,
}

/// Discount code form data.
#[derive(Debug, Deserialize)]
pub struct DiscountCodeForm {
    pub code: String,
}

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartShowTemplate {
    pub cart: CartView,
    pub aside: AsideView,
}

/// Cart lines fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_lines.html")]
pub struct CartLinesTemplate {
    pub cart: CartView,
}

/// Cart count badge fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_count.html")]
pub struct CartCountTemplate {
    pub count: u32,
}

// =============================================================================
// Helpers
// =============================================================================

fn parse_line_id(raw: &str) -> Result<LineId> {
    LineId::parse(raw).map_err(|e| AppError::BadRequest(e.to_string()))
}

/// Forget an expired cart and render the empty state.
async fn expired(session: &Session, cart_id: &CartId) -> Result<Response> {
    tracing::info!(cart_id = %cart_id, "Cart expired, clearing session");
    session::clear_cart_id(session).await?;
    Ok(CartLinesTemplate {
        cart: CartView::empty(),
    }
    .into_response())
}

/// Render the outcome of a line change.
fn mutation_response(update: &CartUpdate) -> Response {
    if update.is_superseded() {
        // A newer request for the same lines owns the view.
        return StatusCode::NO_CONTENT.into_response();
    }

    let template = CartLinesTemplate {
        cart: CartView::from(&update.cart),
    };
    match update.resolution {
        Resolution::RolledBack(_) => template.into_response(),
        _ => (AppendHeaders([CART_UPDATED]), template).into_response(),
    }
}

/// Run a cart-level change (not a line mutation) against the session's cart.
async fn with_cart_display<F, Fut>(session: &Session, change: F) -> Result<Response>
where
    F: FnOnce(CartId) -> Fut,
    Fut: Future<Output = std::result::Result<DisplayCart, CartError>>,
{
    let Some(cart_id) = session::cart_id(session).await else {
        return Ok(CartLinesTemplate {
            cart: CartView::empty(),
        }
        .into_response());
    };

    match change(cart_id.clone()).await {
        Ok(display) => Ok((
            AppendHeaders([CART_UPDATED]),
            CartLinesTemplate {
                cart: CartView::from(&display),
            },
        )
            .into_response()),
        Err(CartError::CartNotFound(_)) => expired(session, &cart_id).await,
        Err(e) => Err(e.into()),
    }
}

/// Run a line change against the session's cart.
async fn with_cart<F, Fut>(session: &Session, change: F) -> Result<Response>
where
    F: FnOnce(CartId) -> Fut,
    Fut: Future<Output = std::result::Result<CartUpdate, CartError>>,
{
    let Some(cart_id) = session::cart_id(session).await else {
        return Ok(CartLinesTemplate {
            cart: CartView::empty(),
        }
        .into_response());
    };

    match change(cart_id.clone()).await {
        Ok(update) => Ok(mutation_response(&update)),
        Err(CartError::CartNotFound(_)) => expired(session, &cart_id).await,
        Err(e) => Err(e.into()),
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Display cart page. Always refetches the cart.
#[instrument(skip(state, session))]
pub async fn show<B: CartBackend>(
    State(state): State<AppState<B>>,
    session: Session,
) -> Result<CartShowTemplate> {
    let aside = AsideView::from(session::aside(&session).await);

    let cart = match session::cart_id(&session).await {
        Some(cart_id) => match state.carts().show(&cart_id).await {
            Ok(display) => CartView::from(&display),
            Err(CartError::CartNotFound(_)) => {
                session::clear_cart_id(&session).await?;
                CartView::empty()
            }
            Err(e) => return Err(e.into()),
        },
        None => CartView::empty(),
    };

    Ok(CartShowTemplate { cart, aside })
}

/// Add item to cart (HTMX).
///
/// Creates a new cart if one doesn't exist, then opens the cart aside.
#[instrument(skip(state, session))]
pub async fn add<B: CartBackend>(
    State(state): State<AppState<B>>,
    session: Session,
    Form(form): Form<AddToCartForm>,
) -> Result<Response> {
    let merchandise_id =
        MerchandiseId::parse(&form.variant_id).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let line = NewCartLine::new(merchandise_id, form.quantity.unwrap_or(1));
    add_breadcrumb("cart", "Add to cart", Some(&[("variant_id", form.variant_id.as_str())]));

    let cart_id = session::cart_id(&session).await;
    let display = state.carts().add(cart_id.as_ref(), line).await?;

    if cart_id.as_ref() != Some(&display.id) {
        session::set_cart_id(&session, &display.id).await?;
    }

    let aside = session::aside(&session).await.open(AsidePanel::Cart);
    session::set_aside(&session, aside).await?;

    Ok((
        AppendHeaders([CART_UPDATED]),
        AsideTemplate {
            aside: AsideView::from(aside),
            cart: Some(CartView::from(&display)),
        },
    )
        .into_response())
}

/// Set a line's quantity (HTMX). Zero removes the line.
#[instrument(skip(state, session))]
pub async fn update<B: CartBackend>(
    State(state): State<AppState<B>>,
    session: Session,
    Form(form): Form<UpdateCartForm>,
) -> Result<Response> {
    let line_id = parse_line_id(&form.line_id)?;
    add_breadcrumb("cart", "Set line quantity", Some(&[("line_id", line_id.as_str())]));
    with_cart(&session, |cart_id| async move {
        state
            .carts()
            .set_quantity(&cart_id, &line_id, form.quantity)
            .await
    })
    .await
}

/// Move a line's quantity up or down from what is displayed (HTMX).
#[instrument(skip(state, session))]
pub async fn adjust<B: CartBackend>(
    State(state): State<AppState<B>>,
    session: Session,
    Form(form): Form<AdjustCartForm>,
) -> Result<Response> {
    let line_id = parse_line_id(&form.line_id)?;
    add_breadcrumb("cart", "Adjust line quantity", Some(&[("line_id", line_id.as_str())]));
    with_cart(&session, |cart_id| async move {
        state.carts().adjust(&cart_id, &line_id, form.delta).await
    })
    .await
}

/// Remove a line (HTMX).
#[instrument(skip(state, session))]
pub async fn remove<B: CartBackend>(
    State(state): State<AppState<B>>,
    session: Session,
    Form(form): Form<RemoveFromCartForm>,
) -> Result<Response> {
    let line_id = parse_line_id(&form.line_id)?;
    add_breadcrumb("cart", "Remove line", Some(&[("line_id", line_id.as_str())]));
    with_cart(&session, |cart_id| async move {
        state.carts().remove(&cart_id, vec![line_id]).await
    })
    .await
}

/// Apply a discount code (HTMX).
#[instrument(skip(state, session, form))]
pub async fn apply_discount<B: CartBackend>(
    State(state): State<AppState<B>>,
    session: Session,
    Form(form): Form<DiscountCodeForm>,
) -> Result<Response> {
    add_breadcrumb("cart", "Apply discount code", None);
    with_cart_display(&session, |cart_id| async move {
        state.carts().apply_discount_code(&cart_id, &form.code).await
    })
    .await
}

/// Remove a discount code (HTMX).
#[instrument(skip(state, session, form))]
pub async fn remove_discount<B: CartBackend>(
    State(state): State<AppState<B>>,
    session: Session,
    Form(form): Form<DiscountCodeForm>,
) -> Result<Response> {
    add_breadcrumb("cart", "Remove discount code", None);
    with_cart_display(&session, |cart_id| async move {
        state.carts().remove_discount_code(&cart_id, &form.code).await
    })
    .await
}

/// Get cart count badge (HTMX). Shows the projected count.
#[instrument(skip(state, session))]
pub async fn count<B: CartBackend>(
    State(state): State<AppState<B>>,
    session: Session,
) -> Result<CartCountTemplate> {
    let Some(cart_id) = session::cart_id(&session).await else {
        return Ok(CartCountTemplate { count: 0 });
    };

    let count = match state.carts().count(&cart_id).await {
        Ok(count) => count,
        Err(CartError::CartNotFound(_)) => {
            session::clear_cart_id(&session).await?;
            0
        }
        Err(e) => {
            tracing::warn!(cart_id = %cart_id, error = %e, "Failed to count cart");
            0
        }
    };

    Ok(CartCountTemplate { count })
}

/// Redirect to Shopify checkout.
#[instrument(skip(state, session))]
pub async fn checkout<B: CartBackend>(
    State(state): State<AppState<B>>,
    session: Session,
) -> Response {
    let Some(cart_id) = session::cart_id(&session).await else {
        // No cart, redirect to cart page
        return Redirect::to("/cart").into_response();
    };

    match state.carts().checkout_url(&cart_id).await {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(e) => {
            tracing::error!(cart_id = %cart_id, error = %e, "Failed to get cart for checkout");
            Redirect::to("/cart").into_response()
        }
    }
}
