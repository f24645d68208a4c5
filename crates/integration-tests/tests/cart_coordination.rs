//! Integration tests for cart line coordination.
//!
//! Each test drives the cart service against a gated backend and releases
//! responses in a chosen order, then checks what the storefront would render.

#![allow(clippy::unwrap_used)]

use strider_core::{DisplayCart, LineId, MerchandiseId, MutationFailure, Resolution};
use strider_integration_tests::{Call, ScriptedBackend, cart_id, cart_service};
use strider_storefront::services::{CartError, CartService, CartUpdate};
use strider_storefront::shopify::{NewCartLine, ShopifyError};
use tokio::task::JoinHandle;

type Service = CartService<ScriptedBackend>;

fn set(service: &Service, line: &str, quantity: u32) -> JoinHandle<Result<CartUpdate, CartError>> {
    let service = service.clone();
    let line_id = LineId::new(line);
    tokio::spawn(async move { service.set_quantity(&cart_id(), &line_id, quantity).await })
}

fn adjust(service: &Service, line: &str, delta: i64) -> JoinHandle<Result<CartUpdate, CartError>> {
    let service = service.clone();
    let line_id = LineId::new(line);
    tokio::spawn(async move { service.adjust(&cart_id(), &line_id, delta).await })
}

fn remove(service: &Service, line: &str) -> JoinHandle<Result<CartUpdate, CartError>> {
    let service = service.clone();
    let line_id = LineId::new(line);
    tokio::spawn(async move { service.remove(&cart_id(), vec![line_id]).await })
}

async fn finish(handle: JoinHandle<Result<CartUpdate, CartError>>) -> CartUpdate {
    handle.await.unwrap().unwrap()
}

async fn shown(service: &Service) -> DisplayCart {
    service.display(&cart_id()).await.unwrap()
}

/// `(quantity, pending)` of a displayed line, `None` if hidden.
fn line(cart: &DisplayCart, id: &str) -> Option<(u32, bool)> {
    cart.lines
        .iter()
        .find(|l| l.line.id.as_str() == id)
        .map(|l| (l.line.quantity, l.is_optimistic))
}

// =============================================================================
// Coalescing
// =============================================================================

#[tokio::test]
async fn test_rapid_updates_only_last_response_lands() {
    let backend = ScriptedBackend::with_lines(&[("L1", 1)]);
    let service = cart_service(backend.clone());
    backend.gate();

    let first = set(&service, "L1", 2);
    backend.wait_for_calls(1).await;
    let second = set(&service, "L1", 3);
    backend.wait_for_calls(2).await;
    let third = set(&service, "L1", 5);
    backend.wait_for_calls(3).await;

    let cart = shown(&service).await;
    assert_eq!(line(&cart, "L1"), Some((5, true)));
    assert_eq!(cart.total_quantity, 5);

    backend.respond(0);
    let update = finish(first).await;
    assert_eq!(update.resolution, Resolution::Superseded);
    assert_eq!(line(&update.cart, "L1"), Some((5, true)));

    backend.respond(1);
    assert_eq!(finish(second).await.resolution, Resolution::Superseded);

    backend.respond(2);
    let update = finish(third).await;
    assert_eq!(update.resolution, Resolution::Applied);
    assert_eq!(line(&update.cart, "L1"), Some((5, false)));
    assert!(!update.cart.has_pending);
    assert_eq!(backend.server_quantity("L1"), Some(5));
}

#[tokio::test]
async fn test_rapid_increments_build_on_displayed_quantity() {
    let backend = ScriptedBackend::with_lines(&[("L1", 2)]);
    let service = cart_service(backend.clone());
    backend.gate();

    let mut handles = Vec::new();
    for expected_calls in 1..=3 {
        handles.push(adjust(&service, "L1", 1));
        backend.wait_for_calls(expected_calls).await;
    }

    let targets: Vec<Call> = (0..3).map(|i| backend.call(i)).collect();
    assert_eq!(
        targets,
        vec![
            Call::Update(vec![(LineId::new("L1"), 3)]),
            Call::Update(vec![(LineId::new("L1"), 4)]),
            Call::Update(vec![(LineId::new("L1"), 5)]),
        ]
    );

    let mut resolutions = Vec::new();
    for (index, handle) in handles.into_iter().enumerate() {
        backend.respond(index);
        resolutions.push(finish(handle).await.resolution);
    }
    assert_eq!(
        resolutions,
        vec![
            Resolution::Superseded,
            Resolution::Superseded,
            Resolution::Applied
        ]
    );
    assert_eq!(line(&shown(&service).await, "L1"), Some((5, false)));
}

#[tokio::test]
async fn test_superseded_failure_is_ignored() {
    let backend = ScriptedBackend::with_lines(&[("L1", 1)]);
    let service = cart_service(backend.clone());
    backend.gate();

    let first = set(&service, "L1", 2);
    backend.wait_for_calls(1).await;
    let second = set(&service, "L1", 3);
    backend.wait_for_calls(2).await;

    backend.fail(0, ShopifyError::Unexpected("connection reset".to_string()));
    let update = finish(first).await;
    assert_eq!(update.resolution, Resolution::Superseded);
    let shown_line = update.cart.lines.first().unwrap();
    assert_eq!(shown_line.line.quantity, 3);
    assert_eq!(shown_line.error, None);

    backend.respond(1);
    let update = finish(second).await;
    assert_eq!(update.resolution, Resolution::Applied);
    assert_eq!(line(&update.cart, "L1"), Some((3, false)));
}

// =============================================================================
// Rollback
// =============================================================================

#[tokio::test]
async fn test_rejected_update_rolls_back_with_message() {
    let backend = ScriptedBackend::with_lines(&[("L1", 1)]);
    let service = cart_service(backend.clone());
    backend.gate();

    let pending = set(&service, "L1", 4);
    backend.wait_for_calls(1).await;
    assert_eq!(line(&shown(&service).await, "L1"), Some((4, true)));

    backend.fail(
        0,
        ShopifyError::UserError(vec!["Only 2 left in stock.".to_string()]),
    );
    let update = finish(pending).await;
    assert!(matches!(
        update.resolution,
        Resolution::RolledBack(MutationFailure::Validation(_))
    ));

    let shown_line = update.cart.lines.first().unwrap();
    assert_eq!(shown_line.line.quantity, 1);
    assert!(!shown_line.is_optimistic);
    assert_eq!(
        shown_line.error.as_ref().map(MutationFailure::user_message),
        Some("Only 2 left in stock.".to_string())
    );

    // Trying again clears the message while the retry is in flight.
    let retry = set(&service, "L1", 2);
    backend.wait_for_calls(2).await;
    assert_eq!(shown(&service).await.lines.first().unwrap().error, None);

    backend.respond(1);
    assert_eq!(finish(retry).await.resolution, Resolution::Applied);
    assert_eq!(backend.server_quantity("L1"), Some(2));
}

#[tokio::test]
async fn test_transport_failure_rolls_back_generically() {
    let backend = ScriptedBackend::with_lines(&[("L1", 3)]);
    let service = cart_service(backend.clone());
    backend.gate();

    let pending = remove(&service, "L1");
    backend.wait_for_calls(1).await;
    assert_eq!(line(&shown(&service).await, "L1"), None);

    backend.fail(0, ShopifyError::RateLimited(2));
    let update = finish(pending).await;
    assert!(matches!(
        update.resolution,
        Resolution::RolledBack(MutationFailure::Transport(_))
    ));
    assert_eq!(line(&update.cart, "L1"), Some((3, false)));
    assert_eq!(
        update
            .cart
            .lines
            .first()
            .unwrap()
            .error
            .as_ref()
            .map(MutationFailure::user_message),
        Some("We couldn't reach the store. Please try again.".to_string())
    );
}

// =============================================================================
// Independent Keys
// =============================================================================

#[tokio::test]
async fn test_different_lines_do_not_supersede_each_other() {
    let backend = ScriptedBackend::with_lines(&[("L1", 1), ("L2", 1)]);
    let service = cart_service(backend.clone());
    backend.gate();

    let first = set(&service, "L1", 3);
    backend.wait_for_calls(1).await;
    let second = set(&service, "L2", 4);
    backend.wait_for_calls(2).await;
    assert_eq!(shown(&service).await.total_quantity, 7);

    backend.respond(1);
    let update = finish(second).await;
    assert_eq!(update.resolution, Resolution::Applied);
    assert_eq!(line(&update.cart, "L1"), Some((3, true)));
    assert_eq!(line(&update.cart, "L2"), Some((4, false)));

    backend.respond(0);
    let update = finish(first).await;
    assert_eq!(update.resolution, Resolution::Applied);
    assert_eq!(line(&update.cart, "L1"), Some((3, false)));
    assert_eq!(line(&update.cart, "L2"), Some((4, false)));
}

#[tokio::test]
async fn test_older_snapshot_does_not_undo_newer_one() {
    let backend = ScriptedBackend::with_lines(&[("L1", 1), ("L2", 1)]);
    let service = cart_service(backend.clone());
    backend.gate();

    let first = set(&service, "L1", 2);
    backend.wait_for_calls(1).await;
    let second = set(&service, "L2", 3);
    backend.wait_for_calls(2).await;

    // The server handles them in order, the responses arrive reversed.
    backend.apply(0);
    backend.apply(1);
    backend.deliver(1);
    assert_eq!(finish(second).await.resolution, Resolution::Applied);

    backend.deliver(0);
    let update = finish(first).await;
    assert_eq!(update.resolution, Resolution::Outdated);
    assert_eq!(line(&update.cart, "L1"), Some((2, false)));
    assert_eq!(line(&update.cart, "L2"), Some((3, false)));
}

#[tokio::test]
async fn test_pending_remove_hides_line_over_pending_update() {
    let backend = ScriptedBackend::with_lines(&[("L1", 1), ("L2", 2)]);
    let service = cart_service(backend.clone());
    backend.gate();

    let update = set(&service, "L1", 3);
    backend.wait_for_calls(1).await;
    let removal = remove(&service, "L1");
    backend.wait_for_calls(2).await;

    let cart = shown(&service).await;
    assert_eq!(line(&cart, "L1"), None);
    assert_eq!(cart.total_quantity, 2);

    backend.respond(0);
    let result = finish(update).await;
    assert_eq!(result.resolution, Resolution::Applied);
    assert_eq!(line(&result.cart, "L1"), None);

    backend.respond(1);
    let result = finish(removal).await;
    assert_eq!(result.resolution, Resolution::Applied);
    assert_eq!(line(&result.cart, "L1"), None);
    assert_eq!(backend.server_quantity("L1"), None);
}

#[tokio::test]
async fn test_same_second_response_cannot_bring_back_removed_line() {
    let backend = ScriptedBackend::with_lines(&[("L1", 1), ("L2", 1)]);
    let service = cart_service(backend.clone());
    backend.gate();
    backend.freeze_clock();

    let removal = remove(&service, "L1");
    backend.wait_for_calls(1).await;
    let update = set(&service, "L2", 2);
    backend.wait_for_calls(2).await;

    // The server runs the update first and the removal second, both within
    // one second; the removal's response arrives first.
    backend.apply(1);
    backend.apply(0);
    backend.deliver(0);
    assert_eq!(finish(removal).await.resolution, Resolution::Applied);

    let reads_before = backend.reads();
    backend.deliver(1);
    let result = finish(update).await;
    assert_eq!(result.resolution, Resolution::Outdated);
    assert_eq!(line(&result.cart, "L1"), None);
    assert_eq!(line(&result.cart, "L2"), Some((2, false)));
    assert_eq!(result.cart.total_quantity, 2);

    // The ambiguous pair is settled by one fresh read.
    assert_eq!(backend.reads(), reads_before + 1);
    assert_eq!(backend.server_quantity("L1"), None);
    assert_eq!(line(&shown(&service).await, "L1"), None);
}

#[tokio::test]
async fn test_same_second_responses_settle_in_either_order() {
    let backend = ScriptedBackend::with_lines(&[("L1", 1), ("L2", 1)]);
    let service = cart_service(backend.clone());
    backend.gate();
    backend.freeze_clock();

    let removal = remove(&service, "L1");
    backend.wait_for_calls(1).await;
    let update = set(&service, "L2", 2);
    backend.wait_for_calls(2).await;

    backend.apply(1);
    backend.apply(0);
    backend.deliver(1);
    let result = finish(update).await;
    assert_eq!(result.resolution, Resolution::Applied);
    // The removal is still pending, so L1 stays hidden.
    assert_eq!(line(&result.cart, "L1"), None);

    let reads_before = backend.reads();
    backend.deliver(0);
    let result = finish(removal).await;
    assert_eq!(result.resolution, Resolution::Applied);
    assert_eq!(backend.reads(), reads_before + 1);
    assert_eq!(line(&result.cart, "L1"), None);
    assert_eq!(line(&result.cart, "L2"), Some((2, false)));
}

// =============================================================================
// Removal Rules
// =============================================================================

#[tokio::test]
async fn test_decrement_from_one_sends_removal() {
    let backend = ScriptedBackend::with_lines(&[("L1", 1)]);
    let service = cart_service(backend.clone());
    backend.gate();

    let pending = adjust(&service, "L1", -1);
    backend.wait_for_calls(1).await;
    assert_eq!(backend.call(0), Call::Remove(vec![LineId::new("L1")]));

    backend.respond(0);
    let update = finish(pending).await;
    assert_eq!(update.resolution, Resolution::Applied);
    assert!(update.cart.lines.is_empty());
    assert_eq!(update.cart.total_quantity, 0);
}

#[tokio::test]
async fn test_setting_zero_sends_removal() {
    let backend = ScriptedBackend::with_lines(&[("L1", 4)]);
    let service = cart_service(backend.clone());
    backend.gate();

    let pending = set(&service, "L1", 0);
    backend.wait_for_calls(1).await;
    assert_eq!(backend.call(0), Call::Remove(vec![LineId::new("L1")]));

    backend.respond(0);
    finish(pending).await;
    assert_eq!(backend.server_quantity("L1"), None);
}

// =============================================================================
// Reconciliation
// =============================================================================

#[tokio::test]
async fn test_late_superseded_write_is_reconciled() {
    let backend = ScriptedBackend::with_lines(&[("L1", 1)]);
    let service = cart_service(backend.clone());
    backend.gate();

    let first = set(&service, "L1", 2);
    backend.wait_for_calls(1).await;
    let second = set(&service, "L1", 3);
    backend.wait_for_calls(2).await;

    // The newer request lands first; the discarded one reaches the server
    // afterwards and overwrites it.
    backend.respond(1);
    let update = finish(second).await;
    assert_eq!(update.resolution, Resolution::Applied);
    assert_eq!(line(&update.cart, "L1"), Some((3, false)));

    let reads_before = backend.reads();
    backend.respond(0);
    let update = finish(first).await;
    assert_eq!(update.resolution, Resolution::Superseded);
    assert_eq!(backend.reads(), reads_before + 1);

    // Confirmed state now matches the server again.
    assert_eq!(backend.server_quantity("L1"), Some(2));
    assert_eq!(line(&update.cart, "L1"), Some((2, false)));
    assert_eq!(line(&shown(&service).await, "L1"), Some((2, false)));
}

#[tokio::test]
async fn test_reconcile_waits_until_idle() {
    let backend = ScriptedBackend::with_lines(&[("L1", 1), ("L2", 1)]);
    let service = cart_service(backend.clone());
    backend.gate();

    let first = set(&service, "L1", 2);
    backend.wait_for_calls(1).await;
    let second = set(&service, "L1", 3);
    backend.wait_for_calls(2).await;
    let other = set(&service, "L2", 5);
    backend.wait_for_calls(3).await;

    let reads_before = backend.reads();
    backend.respond(0);
    assert_eq!(finish(first).await.resolution, Resolution::Superseded);
    backend.respond(1);
    assert_eq!(finish(second).await.resolution, Resolution::Applied);
    // L2 is still in flight, so nothing is refetched yet.
    assert_eq!(backend.reads(), reads_before);

    backend.respond(2);
    assert_eq!(finish(other).await.resolution, Resolution::Applied);
    assert_eq!(backend.reads(), reads_before + 1);

    let cart = shown(&service).await;
    assert_eq!(line(&cart, "L1"), Some((3, false)));
    assert_eq!(line(&cart, "L2"), Some((5, false)));
}

// =============================================================================
// Add To Cart
// =============================================================================

#[tokio::test]
async fn test_add_creates_then_extends_cart() {
    let backend = ScriptedBackend::default();
    let service = cart_service(backend.clone());

    let cart = service
        .add(None, NewCartLine::new(MerchandiseId::new("variant-a"), 1))
        .await
        .unwrap();
    assert_eq!(cart.id, cart_id());
    assert_eq!(line(&cart, "L1"), Some((1, false)));

    let cart = service
        .add(
            Some(&cart.id),
            NewCartLine::new(MerchandiseId::new("variant-b"), 2),
        )
        .await
        .unwrap();
    assert_eq!(cart.total_quantity, 3);
    assert_eq!(line(&cart, "L2"), Some((2, false)));
    assert_eq!(service.count(&cart_id()).await.unwrap(), 3);
}
