//! HTTP-level tests for the cart and aside routes.
//!
//! The full router (sessions, security headers, rate limiting) runs in
//! process against a scripted backend.

#![allow(clippy::unwrap_used)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use strider_integration_tests::{ScriptedBackend, app_state};
use strider_storefront::shopify::ShopifyError;
use tower::ServiceExt;

fn app(backend: &ScriptedBackend) -> Router {
    strider_storefront::app(app_state(backend.clone()))
}

fn request(method: &str, uri: &str, form: Option<&str>, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", "198.51.100.4");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    match form {
        Some(form) => builder
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

async fn text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn session_cookie(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

fn triggers_cart_update(response: &Response<Body>) -> bool {
    response
        .headers()
        .get("hx-trigger")
        .is_some_and(|v| v == "cart-updated")
}

/// Add one unit of `variant-a` and return the session cookie.
async fn start_cart(app: &Router) -> String {
    let response = send(
        app,
        request("POST", "/cart/add", Some("variant_id=variant-a"), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    session_cookie(&response)
}

// =============================================================================
// Basics
// =============================================================================

#[tokio::test]
async fn test_health() {
    let app = app(&ScriptedBackend::default());
    let response = send(&app, request("GET", "/health", None, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-frame-options").unwrap(),
        "DENY"
    );
    assert!(response.headers().get("x-request-id").is_some());
    assert_eq!(text(response).await, "ok");
}

#[tokio::test]
async fn test_cart_page_without_cart() {
    let app = app(&ScriptedBackend::default());
    let response = send(&app, request("GET", "/cart", None, None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = text(response).await;
    assert!(body.contains("Your cart is empty"));
    assert!(body.contains(r#"data-aside="closed""#));
    assert!(body.contains("data-track-scroll"));
}

#[tokio::test]
async fn test_checkout_without_cart_returns_to_cart_page() {
    let app = app(&ScriptedBackend::default());
    let response = send(&app, request("GET", "/checkout", None, None)).await;
    assert!(response.status().is_redirection());
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/cart");
}

// =============================================================================
// Cart Mutations
// =============================================================================

#[tokio::test]
async fn test_add_creates_cart_and_opens_aside() {
    let backend = ScriptedBackend::default();
    let app = app(&backend);

    let response = send(
        &app,
        request("POST", "/cart/add", Some("variant_id=variant-a&quantity=2"), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(triggers_cart_update(&response));
    assert!(session_cookie(&response).starts_with("strider_session="));

    let body = text(response).await;
    assert!(body.contains(r#"data-aside="cart""#));
    assert!(body.contains("Suede Loafer"));
    assert_eq!(backend.server_quantity("L1"), Some(2));
}

#[tokio::test]
async fn test_add_rejects_zero_quantity() {
    let app = app(&ScriptedBackend::default());
    let response = send(
        &app,
        request("POST", "/cart/add", Some("variant_id=variant-a&quantity=0"), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_decrement_from_one_empties_cart() {
    let backend = ScriptedBackend::default();
    let app = app(&backend);
    let cookie = start_cart(&app).await;

    let response = send(
        &app,
        request(
            "POST",
            "/cart/adjust",
            Some("line_id=L1&delta=-1"),
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(triggers_cart_update(&response));
    assert!(text(response).await.contains("Your cart is empty"));
    assert_eq!(backend.server_quantity("L1"), None);

    let response = send(&app, request("GET", "/cart/count", None, Some(&cookie))).await;
    assert_eq!(text(response).await.trim(), "0");
}

#[tokio::test]
async fn test_adjust_unknown_line_is_not_found() {
    let app = app(&ScriptedBackend::default());
    let cookie = start_cart(&app).await;

    let response = send(
        &app,
        request(
            "POST",
            "/cart/adjust",
            Some("line_id=L9&delta=1"),
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_without_cart_renders_empty_lines() {
    let app = app(&ScriptedBackend::default());
    let response = send(
        &app,
        request("POST", "/cart/update", Some("line_id=L1&quantity=2"), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(text(response).await.contains("Your cart is empty"));
}

#[tokio::test]
async fn test_superseded_request_leaves_page_alone() {
    let backend = ScriptedBackend::default();
    let app = app(&backend);
    let cookie = start_cart(&app).await;
    backend.gate();

    let first = tokio::spawn({
        let app = app.clone();
        let request = request(
            "POST",
            "/cart/update",
            Some("line_id=L1&quantity=2"),
            Some(&cookie),
        );
        async move { app.oneshot(request).await.unwrap() }
    });
    backend.wait_for_calls(1).await;

    let second = tokio::spawn({
        let app = app.clone();
        let request = request(
            "POST",
            "/cart/update",
            Some("line_id=L1&quantity=3"),
            Some(&cookie),
        );
        async move { app.oneshot(request).await.unwrap() }
    });
    backend.wait_for_calls(2).await;

    backend.respond(0);
    let response = first.await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!triggers_cart_update(&response));

    backend.respond(1);
    let response = second.await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(triggers_cart_update(&response));
    assert!(text(response).await.contains(r#"min="0" value="3""#));
}

#[tokio::test]
async fn test_rejected_update_shows_line_error() {
    let backend = ScriptedBackend::default();
    let app = app(&backend);
    let cookie = start_cart(&app).await;
    backend.gate();

    let pending = tokio::spawn({
        let app = app.clone();
        let request = request(
            "POST",
            "/cart/update",
            Some("line_id=L1&quantity=9"),
            Some(&cookie),
        );
        async move { app.oneshot(request).await.unwrap() }
    });
    backend.wait_for_calls(1).await;
    backend.fail(
        0,
        ShopifyError::UserError(vec!["Only 2 left in stock.".to_string()]),
    );

    let response = pending.await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!triggers_cart_update(&response));

    let body = text(response).await;
    assert!(body.contains("Only 2 left in stock."));
    assert!(body.contains(r#"min="0" value="1""#));
}

#[tokio::test]
async fn test_checkout_redirects_to_backend() {
    let app = app(&ScriptedBackend::default());
    let cookie = start_cart(&app).await;

    let response = send(&app, request("GET", "/checkout", None, Some(&cookie))).await;
    assert!(response.status().is_redirection());
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "https://strider.myshopify.com/cart/c/c1"
    );
}

// =============================================================================
// Discount Codes
// =============================================================================

#[tokio::test]
async fn test_discount_codes_apply_and_remove() {
    let app = app(&ScriptedBackend::default());
    let cookie = start_cart(&app).await;

    let response = send(
        &app,
        request("POST", "/cart/discount", Some("code=WELCOME10"), Some(&cookie)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(triggers_cart_update(&response));
    let body = text(response).await;
    assert!(body.contains("<code>WELCOME10</code>"));
    assert!(!body.contains("Not applicable to this cart"));

    let response = send(
        &app,
        request("POST", "/cart/discount", Some("code=BOOTS20"), Some(&cookie)),
    )
    .await;
    let body = text(response).await;
    assert!(body.contains("<code>WELCOME10</code>"));
    assert!(body.contains("<code>BOOTS20</code>"));
    assert!(body.contains("Not applicable to this cart"));

    let response = send(
        &app,
        request(
            "POST",
            "/cart/discount/remove",
            Some("code=WELCOME10"),
            Some(&cookie),
        ),
    )
    .await;
    assert!(triggers_cart_update(&response));
    let body = text(response).await;
    assert!(!body.contains("<code>WELCOME10</code>"));
    assert!(body.contains("<code>BOOTS20</code>"));
}

#[tokio::test]
async fn test_blank_discount_code_is_rejected() {
    let app = app(&ScriptedBackend::default());
    let cookie = start_cart(&app).await;

    let response = send(
        &app,
        request("POST", "/cart/discount", Some("code=+++"), Some(&cookie)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_discount_code_without_cart_renders_empty_lines() {
    let app = app(&ScriptedBackend::default());
    let response = send(
        &app,
        request("POST", "/cart/discount", Some("code=WELCOME10"), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(text(response).await.contains("Your cart is empty"));
}

// =============================================================================
// Aside
// =============================================================================

#[tokio::test]
async fn test_aside_transitions() {
    let app = app(&ScriptedBackend::default());

    let response = send(&app, request("POST", "/aside/search", None, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response);
    let body = text(response).await;
    assert!(body.contains(r#"data-aside="search""#));
    assert!(!body.contains("data-track-scroll"));

    // Opening another panel replaces the first.
    let response = send(&app, request("POST", "/aside/mobile", None, Some(&cookie))).await;
    assert!(text(response).await.contains(r#"data-aside="mobile""#));

    let response = send(
        &app,
        request("POST", "/aside/mobile/toggle", None, Some(&cookie)),
    )
    .await;
    let body = text(response).await;
    assert!(body.contains(r#"data-aside="closed""#));
    assert!(body.contains("data-track-scroll"));

    let response = send(&app, request("POST", "/aside/cart", None, Some(&cookie))).await;
    let body = text(response).await;
    assert!(body.contains(r#"data-aside="cart""#));
    assert!(body.contains("Your cart is empty"));

    let response = send(&app, request("POST", "/aside/close", None, Some(&cookie))).await;
    assert!(text(response).await.contains(r#"data-aside="closed""#));
}

#[tokio::test]
async fn test_unknown_aside_panel_is_rejected() {
    let app = app(&ScriptedBackend::default());
    let response = send(&app, request("POST", "/aside/drawer", None, None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
