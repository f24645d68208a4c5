//! Integration test harness for Strider cart coordination.
//!
//! [`ScriptedBackend`] stands in for the Shopify Storefront API. It keeps an
//! authoritative cart and, when gated, parks every line update or removal
//! until the test decides when the server applies it and when the response
//! reaches the storefront. That is enough to replay any interleaving of
//! rapid clicks, slow responses and out-of-order arrivals.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p strider-integration-tests
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;
use strider_core::{
    Cart, CartId, CartLine, CurrencyCode, DiscountCode, LineCost, LineId, LineMerchandise,
    LineQuantity, MerchandiseId, Price, ProductId, SelectedOption,
};
use strider_storefront::config::{CartConfig, ShopifyStorefrontConfig, StorefrontConfig};
use strider_storefront::services::{CartBackend, CartService};
use strider_storefront::shopify::{NewCartLine, ShopifyError};
use strider_storefront::state::AppState;
use tokio::sync::{Notify, oneshot};

/// Cart ID used by every scripted cart.
pub const CART_ID: &str = "gid://shopify/Cart/c1";

/// Unit price of every scripted variant, in cents.
const UNIT_PRICE_CENTS: i64 = 12_000;

// =============================================================================
// Scripted Backend
// =============================================================================

/// A parked line mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Update(Vec<(LineId, u32)>),
    Remove(Vec<LineId>),
}

struct Gate {
    call: Call,
    /// Snapshot taken when the server applied the call, not yet delivered.
    held: Option<Cart>,
    respond: Option<oneshot::Sender<Result<Cart, ShopifyError>>>,
}

#[derive(Default)]
struct Server {
    cart: Option<Cart>,
    /// Bumped on every write; becomes the snapshot's `updated_at`.
    version: i64,
    /// Stop bumping `version`, so later writes share one timestamp.
    frozen: bool,
    discount_codes: Vec<DiscountCode>,
    next_line: usize,
}

impl Server {
    /// Store `lines` as a new snapshot, keeping the discount codes.
    fn commit(&mut self, lines: Vec<CartLine>) -> Cart {
        if !self.frozen {
            self.version += 1;
        }
        let mut cart = snapshot(lines, self.version);
        cart.discount_codes.clone_from(&self.discount_codes);
        self.cart = Some(cart.clone());
        cart
    }
}

#[derive(Default)]
struct Inner {
    server: Mutex<Server>,
    gates: Mutex<Vec<Gate>>,
    gated: AtomicBool,
    arrived: Notify,
    reads: AtomicUsize,
}

/// In-memory Storefront backend whose line mutations can be held and
/// released in any order.
///
/// Discount codes starting with `WELCOME` apply; any other code is kept on
/// the cart as inapplicable.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    inner: Arc<Inner>,
}

impl ScriptedBackend {
    /// A backend holding a cart with one line per `(line_id, quantity)`.
    #[must_use]
    pub fn with_lines(lines: &[(&str, u32)]) -> Self {
        let backend = Self::default();
        {
            let mut server = backend.inner.server.lock().unwrap();
            let lines: Vec<CartLine> = lines
                .iter()
                .map(|(id, quantity)| line(id, &format!("variant-{id}"), *quantity))
                .collect();
            server.next_line = lines.len();
            server.cart = Some(snapshot(lines, 0));
        }
        backend
    }

    /// Park line updates and removals until released.
    pub fn gate(&self) {
        self.inner.gated.store(true, Ordering::SeqCst);
    }

    /// Stamp every later write with one shared timestamp, as happens when
    /// Shopify handles several writes within the same second.
    pub fn freeze_clock(&self) {
        let mut server = self.inner.server.lock().unwrap();
        server.version += 1;
        server.frozen = true;
    }

    /// Wait until `count` mutation calls have arrived in total.
    pub async fn wait_for_calls(&self, count: usize) {
        loop {
            let notified = self.inner.arrived.notified();
            if self.inner.gates.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::timeout(Duration::from_secs(5), notified)
                .await
                .expect("backend call never arrived");
        }
    }

    /// The `index`th mutation call, in arrival order.
    #[must_use]
    pub fn call(&self, index: usize) -> Call {
        self.inner.gates.lock().unwrap().get(index).unwrap().call.clone()
    }

    /// Apply the `index`th call on the server without answering it yet.
    pub fn apply(&self, index: usize) {
        let mut gates = self.inner.gates.lock().unwrap();
        let gate = gates.get_mut(index).unwrap();
        assert!(gate.held.is_none(), "call {index} already applied");
        gate.held = Some(self.write(&gate.call));
    }

    /// Deliver the response of a call previously applied with [`Self::apply`].
    pub fn deliver(&self, index: usize) {
        let mut gates = self.inner.gates.lock().unwrap();
        let gate = gates.get_mut(index).unwrap();
        let cart = gate.held.take().expect("call not applied yet");
        let _ = gate.respond.take().unwrap().send(Ok(cart));
    }

    /// Apply the `index`th call and answer it straight away.
    pub fn respond(&self, index: usize) {
        self.apply(index);
        self.deliver(index);
    }

    /// Answer the `index`th call with an error, leaving the server untouched.
    pub fn fail(&self, index: usize, err: ShopifyError) {
        let mut gates = self.inner.gates.lock().unwrap();
        let gate = gates.get_mut(index).unwrap();
        let _ = gate.respond.take().unwrap().send(Err(err));
    }

    /// The server's cart as of now.
    #[must_use]
    pub fn server_cart(&self) -> Cart {
        self.inner.server.lock().unwrap().cart.clone().unwrap()
    }

    /// Server-side quantity of a line, `None` once removed.
    #[must_use]
    pub fn server_quantity(&self, line_id: &str) -> Option<u32> {
        self.server_cart()
            .line(&LineId::new(line_id))
            .map(|l| l.quantity)
    }

    /// Number of `get_cart` calls served.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.inner.reads.load(Ordering::SeqCst)
    }

    fn write(&self, call: &Call) -> Cart {
        let mut server = self.inner.server.lock().unwrap();
        let mut lines = server.cart.take().map(|c| c.lines).unwrap_or_default();
        match call {
            Call::Update(targets) => {
                for (line_id, quantity) in targets {
                    if let Some(line) = lines.iter_mut().find(|l| &l.id == line_id) {
                        set_quantity(line, *quantity);
                    }
                }
            }
            Call::Remove(line_ids) => lines.retain(|l| !line_ids.contains(&l.id)),
        }
        server.commit(lines)
    }

    fn add(&self, new_lines: Vec<NewCartLine>) -> Cart {
        let mut server = self.inner.server.lock().unwrap();
        let mut lines = server.cart.take().map(|c| c.lines).unwrap_or_default();
        for new in new_lines {
            if let Some(existing) = lines
                .iter_mut()
                .find(|l| l.merchandise_id == new.merchandise_id)
            {
                let quantity = existing.quantity + new.quantity;
                set_quantity(existing, quantity);
            } else {
                server.next_line += 1;
                let id = format!("L{}", server.next_line);
                lines.push(line(&id, new.merchandise_id.as_str(), new.quantity));
            }
        }
        server.commit(lines)
    }

    fn set_discount_codes(&self, codes: &[String]) -> Cart {
        let mut server = self.inner.server.lock().unwrap();
        server.discount_codes = codes
            .iter()
            .map(|code| DiscountCode {
                code: code.clone(),
                applicable: code.to_ascii_uppercase().starts_with("WELCOME"),
            })
            .collect();
        let lines = server.cart.take().map(|c| c.lines).unwrap_or_default();
        server.commit(lines)
    }

    async fn mutation(&self, call: Call) -> Result<Cart, ShopifyError> {
        if !self.inner.gated.load(Ordering::SeqCst) {
            return Ok(self.write(&call));
        }

        let (tx, rx) = oneshot::channel();
        self.inner.gates.lock().unwrap().push(Gate {
            call,
            held: None,
            respond: Some(tx),
        });
        self.inner.arrived.notify_waiters();

        rx.await
            .unwrap_or_else(|_| Err(ShopifyError::Unexpected("gate dropped".to_string())))
    }
}

impl CartBackend for ScriptedBackend {
    async fn create_cart(&self, lines: Vec<NewCartLine>) -> Result<Cart, ShopifyError> {
        Ok(self.add(lines))
    }

    async fn get_cart(&self, cart_id: &CartId) -> Result<Cart, ShopifyError> {
        self.inner.reads.fetch_add(1, Ordering::SeqCst);
        self.inner
            .server
            .lock()
            .unwrap()
            .cart
            .clone()
            .filter(|cart| &cart.id == cart_id)
            .ok_or_else(|| ShopifyError::NotFound(cart_id.to_string()))
    }

    async fn add_lines(
        &self,
        _cart_id: &CartId,
        lines: Vec<NewCartLine>,
    ) -> Result<Cart, ShopifyError> {
        Ok(self.add(lines))
    }

    async fn update_lines(
        &self,
        _cart_id: &CartId,
        lines: &[LineQuantity],
    ) -> Result<Cart, ShopifyError> {
        let targets = lines
            .iter()
            .map(|l| (l.line_id.clone(), l.quantity.get()))
            .collect();
        self.mutation(Call::Update(targets)).await
    }

    async fn remove_lines(
        &self,
        _cart_id: &CartId,
        line_ids: &[LineId],
    ) -> Result<Cart, ShopifyError> {
        self.mutation(Call::Remove(line_ids.to_vec())).await
    }

    async fn update_discount_codes(
        &self,
        _cart_id: &CartId,
        codes: &[String],
    ) -> Result<Cart, ShopifyError> {
        Ok(self.set_discount_codes(codes))
    }
}

// =============================================================================
// Fixtures
// =============================================================================

fn usd(cents: i64) -> Price {
    Price::new(Decimal::new(cents, 2), CurrencyCode::USD)
}

fn at(version: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_760_000_000 + version, 0)
        .single()
        .unwrap()
}

fn set_quantity(line: &mut CartLine, quantity: u32) {
    line.quantity = quantity;
    line.cost.total_amount = usd(UNIT_PRICE_CENTS * i64::from(quantity));
}

fn line(id: &str, merchandise_id: &str, quantity: u32) -> CartLine {
    CartLine {
        id: LineId::new(id),
        merchandise_id: MerchandiseId::new(merchandise_id),
        quantity,
        cost: LineCost {
            amount_per_quantity: usd(UNIT_PRICE_CENTS),
            total_amount: usd(UNIT_PRICE_CENTS * i64::from(quantity)),
        },
        merchandise: LineMerchandise {
            product_id: ProductId::new(format!("product-{merchandise_id}")),
            product_handle: "suede-loafer".to_string(),
            product_title: "Suede Loafer".to_string(),
            variant_title: Some("9 / Tan".to_string()),
            image_url: None,
            selected_options: vec![SelectedOption {
                name: "Size".to_string(),
                value: "9".to_string(),
            }],
        },
    }
}

fn snapshot(lines: Vec<CartLine>, version: i64) -> Cart {
    let total_quantity = lines.iter().map(|l| l.quantity).sum();
    let subtotal = usd(lines
        .iter()
        .map(|l| UNIT_PRICE_CENTS * i64::from(l.quantity))
        .sum());
    Cart {
        id: CartId::new(CART_ID),
        checkout_url: "https://strider.myshopify.com/cart/c/c1".to_string(),
        updated_at: at(version),
        lines,
        total_quantity,
        subtotal,
        total: subtotal,
        discount_codes: Vec::new(),
        applied_gift_cards: Vec::new(),
    }
}

/// Storefront configuration for tests. Nothing here is contacted.
#[must_use]
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 3000,
        base_url: url::Url::parse("http://localhost:3000").unwrap(),
        shopify: ShopifyStorefrontConfig {
            store: "strider.myshopify.com".to_string(),
            api_version: "2026-01".to_string(),
            storefront_public_token: None,
            storefront_private_token: SecretString::from("unused-in-tests"),
        },
        cart: CartConfig {
            request_timeout: Duration::from_secs(5),
            session_idle: Duration::from_secs(1800),
        },
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// A cart service over `backend`.
#[must_use]
pub fn cart_service(backend: ScriptedBackend) -> CartService<ScriptedBackend> {
    CartService::new(backend, &test_config().cart)
}

/// Application state over `backend`.
#[must_use]
pub fn app_state(backend: ScriptedBackend) -> AppState<ScriptedBackend> {
    AppState::with_backend(test_config(), backend)
}

/// The scripted cart's ID.
#[must_use]
pub fn cart_id() -> CartId {
    CartId::new(CART_ID)
}
