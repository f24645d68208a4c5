//! Aside (side panel) route handlers.
//!
//! The open panel lives in the session and only changes through these
//! handlers. Each returns the aside fragment for HTMX to swap in.

use askama::Template;
use askama_web::WebTemplate;
use axum::extract::{Path, State};
use strider_core::{AsidePanel, AsideState};
use tower_sessions::Session;
use tracing::instrument;

use super::cart::CartView;
use crate::error::{AppError, Result};
use crate::models::session;
use crate::services::CartBackend;
use crate::state::AppState;

/// Aside state as the layout needs it.
#[derive(Debug, Clone, Copy)]
pub struct AsideView {
    /// `closed`, `mobile`, `cart` or `search`.
    pub state: &'static str,
    /// Whether the header should track page scrolling.
    pub tracks_scroll: bool,
    pub is_open: bool,
}

impl From<AsideState> for AsideView {
    fn from(aside: AsideState) -> Self {
        Self {
            state: aside.as_str(),
            tracks_scroll: aside.tracks_scroll(),
            is_open: aside.panel().is_some(),
        }
    }
}

/// Aside fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/aside.html")]
pub struct AsideTemplate {
    pub aside: AsideView,
    /// Cart contents, present when the cart panel is open.
    pub cart: Option<CartView>,
}

fn parse_panel(raw: &str) -> Result<AsidePanel> {
    raw.parse()
        .map_err(|e: strider_core::UnknownPanel| AppError::BadRequest(e.to_string()))
}

/// Store `aside` and render it, loading the cart if its panel is open.
async fn render<B: CartBackend>(
    state: &AppState<B>,
    session: &Session,
    aside: AsideState,
) -> Result<AsideTemplate> {
    session::set_aside(session, aside).await?;

    let cart = if aside.is_open(AsidePanel::Cart) {
        let display = match session::cart_id(session).await {
            Some(cart_id) => match state.carts().display(&cart_id).await {
                Ok(display) => Some(display),
                Err(e) => {
                    tracing::warn!(cart_id = %cart_id, error = %e, "Failed to load cart for aside");
                    None
                }
            },
            None => None,
        };
        Some(display.as_ref().map_or_else(CartView::empty, CartView::from))
    } else {
        None
    };

    Ok(AsideTemplate {
        aside: AsideView::from(aside),
        cart,
    })
}

/// Open a panel, replacing whatever was open.
#[instrument(skip(state, session))]
pub async fn open<B: CartBackend>(
    State(state): State<AppState<B>>,
    session: Session,
    Path(panel): Path<String>,
) -> Result<AsideTemplate> {
    let panel = parse_panel(&panel)?;
    let aside = session::aside(&session).await.open(panel);
    render(&state, &session, aside).await
}

/// Open a panel, or close it if it is already open.
#[instrument(skip(state, session))]
pub async fn toggle<B: CartBackend>(
    State(state): State<AppState<B>>,
    session: Session,
    Path(panel): Path<String>,
) -> Result<AsideTemplate> {
    let panel = parse_panel(&panel)?;
    let aside = session::aside(&session).await.toggle(panel);
    render(&state, &session, aside).await
}

/// Close any open panel.
#[instrument(skip(state, session))]
pub async fn close<B: CartBackend>(
    State(state): State<AppState<B>>,
    session: Session,
) -> Result<AsideTemplate> {
    let aside = session::aside(&session).await.close();
    render(&state, &session, aside).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_aside_view() {
        let closed = AsideView::from(AsideState::Closed);
        assert_eq!(closed.state, "closed");
        assert!(closed.tracks_scroll);
        assert!(!closed.is_open);

        let search = AsideView::from(AsideState::Open(AsidePanel::Search));
        assert_eq!(search.state, "search");
        assert!(!search.tracks_scroll);
        assert!(search.is_open);
    }

    #[test]
    fn test_parse_panel_rejects_unknown() {
        assert_eq!(parse_panel("mobile").unwrap(), AsidePanel::Mobile);
        assert!(matches!(parse_panel("drawer"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_aside_fragment_marks_state() {
        let html = AsideTemplate {
            aside: AsideView::from(AsideState::Open(AsidePanel::Cart)),
            cart: Some(CartView::empty()),
        }
        .render()
        .unwrap();
        assert!(html.contains(r#"data-aside="cart""#));
        assert!(html.contains("Your cart is empty"));
    }
}
