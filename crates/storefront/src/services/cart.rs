//! Cart service: one [`MutationCoordinator`] per cart, backed by Shopify.
//!
//! Handlers never talk to the backend directly for line changes. Each change
//! is submitted to the cart's coordinator, dispatched without holding the
//! coordinator lock, and resolved against whatever the coordinator looks like
//! when the response arrives. Concurrent requests for the same cart therefore
//! coalesce exactly as they would in a single client.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use strider_core::{
    Cart, CartId, CartMutation, DisplayCart, LineId, LineQuantity, MutationCoordinator,
    MutationFailure, MutationRequest, RequestError, Resolution,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::CartConfig;
use crate::shopify::{NewCartLine, ShopifyError, StorefrontClient};

/// Upper bound on carts with a live coordinator.
const MAX_COORDINATORS: u64 = 10_000;

/// The commerce backend's cart operations.
///
/// Every successful call returns the complete authoritative cart.
pub trait CartBackend: Send + Sync + 'static {
    fn create_cart(
        &self,
        lines: Vec<NewCartLine>,
    ) -> impl Future<Output = Result<Cart, ShopifyError>> + Send;

    fn get_cart(&self, cart_id: &CartId) -> impl Future<Output = Result<Cart, ShopifyError>> + Send;

    fn add_lines(
        &self,
        cart_id: &CartId,
        lines: Vec<NewCartLine>,
    ) -> impl Future<Output = Result<Cart, ShopifyError>> + Send;

    fn update_lines(
        &self,
        cart_id: &CartId,
        lines: &[LineQuantity],
    ) -> impl Future<Output = Result<Cart, ShopifyError>> + Send;

    fn remove_lines(
        &self,
        cart_id: &CartId,
        line_ids: &[LineId],
    ) -> impl Future<Output = Result<Cart, ShopifyError>> + Send;

    /// Replace the cart's discount codes with `codes`.
    fn update_discount_codes(
        &self,
        cart_id: &CartId,
        codes: &[String],
    ) -> impl Future<Output = Result<Cart, ShopifyError>> + Send;
}

impl CartBackend for StorefrontClient {
    async fn create_cart(&self, lines: Vec<NewCartLine>) -> Result<Cart, ShopifyError> {
        Self::create_cart(self, lines).await
    }

    async fn get_cart(&self, cart_id: &CartId) -> Result<Cart, ShopifyError> {
        Self::get_cart(self, cart_id).await
    }

    async fn add_lines(
        &self,
        cart_id: &CartId,
        lines: Vec<NewCartLine>,
    ) -> Result<Cart, ShopifyError> {
        self.add_to_cart(cart_id, lines).await
    }

    async fn update_lines(
        &self,
        cart_id: &CartId,
        lines: &[LineQuantity],
    ) -> Result<Cart, ShopifyError> {
        self.update_cart_lines(cart_id, lines).await
    }

    async fn remove_lines(&self, cart_id: &CartId, line_ids: &[LineId]) -> Result<Cart, ShopifyError> {
        self.remove_from_cart(cart_id, line_ids).await
    }

    async fn update_discount_codes(
        &self,
        cart_id: &CartId,
        codes: &[String],
    ) -> Result<Cart, ShopifyError> {
        Self::update_discount_codes(self, cart_id, codes).await
    }
}

/// Errors from cart operations that do not go through the coordinator's
/// rollback path.
#[derive(Debug, Clone, Error)]
pub enum CartError {
    /// The request could not be turned into a mutation.
    #[error("Invalid cart request: {0}")]
    Request(#[from] RequestError),

    /// Adds must carry at least one unit.
    #[error("Quantity must be at least 1")]
    ZeroQuantity,

    /// A blank discount code was submitted.
    #[error("Discount code is empty")]
    EmptyDiscountCode,

    /// The cart no longer exists on the backend.
    #[error("Cart not found: {0}")]
    CartNotFound(CartId),

    /// The line is not shown in the cart.
    #[error("Line not in cart: {0}")]
    LineNotFound(LineId),

    /// The backend rejected an add.
    #[error("Cart rejected the change: {}", .0.join("; "))]
    Rejected(Vec<String>),

    /// The backend failed.
    #[error("Cart backend error: {0}")]
    Backend(Arc<ShopifyError>),
}

impl From<ShopifyError> for CartError {
    fn from(err: ShopifyError) -> Self {
        Self::from(Arc::new(err))
    }
}

impl From<Arc<ShopifyError>> for CartError {
    fn from(err: Arc<ShopifyError>) -> Self {
        match err.as_ref() {
            ShopifyError::NotFound(id) => Self::CartNotFound(CartId::new(id.clone())),
            ShopifyError::UserError(messages) => Self::Rejected(messages.clone()),
            _ => Self::Backend(err),
        }
    }
}

/// Result of a line mutation: how it resolved and what to render now.
#[derive(Debug, Clone)]
pub struct CartUpdate {
    pub resolution: Resolution,
    pub cart: DisplayCart,
}

impl CartUpdate {
    /// Whether the response belongs to a request that was replaced. Its view
    /// must not be rendered over the newer one.
    #[must_use]
    pub const fn is_superseded(&self) -> bool {
        matches!(self.resolution, Resolution::Superseded)
    }
}

/// Map a backend error to the coordinator's two failure categories.
fn classify(err: ShopifyError) -> MutationFailure {
    match err {
        ShopifyError::UserError(messages) => MutationFailure::Validation(messages),
        other => MutationFailure::Transport(other.to_string()),
    }
}

type SharedCoordinator = Arc<Mutex<MutationCoordinator>>;

/// Coordinated cart operations.
///
/// Cheaply cloneable; clones share coordinators.
pub struct CartService<B> {
    inner: Arc<CartServiceInner<B>>,
}

impl<B> Clone for CartService<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct CartServiceInner<B> {
    backend: B,
    coordinators: Cache<CartId, SharedCoordinator>,
    request_timeout: Duration,
}

impl<B: CartBackend> CartService<B> {
    /// Create a cart service over `backend`.
    ///
    /// Coordinators for carts untouched for `config.session_idle` are dropped
    /// and rebuilt from the backend on next use.
    #[must_use]
    pub fn new(backend: B, config: &CartConfig) -> Self {
        let coordinators = Cache::builder()
            .max_capacity(MAX_COORDINATORS)
            .time_to_idle(config.session_idle)
            .build();

        Self {
            inner: Arc::new(CartServiceInner {
                backend,
                coordinators,
                request_timeout: config.request_timeout,
            }),
        }
    }

    /// The underlying backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    // =========================================================================
    // Line Operations
    // =========================================================================

    /// Add a variant to the cart, creating the cart if there is none or the
    /// old one has expired. Adds are never coalesced.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ZeroQuantity` for a zero quantity,
    /// `CartError::Rejected` if the backend refuses the line, or
    /// `CartError::Backend` if it cannot be reached.
    #[instrument(skip(self, line), fields(cart_id = ?cart_id.map(CartId::as_str), merchandise_id = %line.merchandise_id))]
    pub async fn add(&self, cart_id: Option<&CartId>, line: NewCartLine) -> Result<DisplayCart, CartError> {
        if line.quantity == 0 {
            return Err(CartError::ZeroQuantity);
        }

        let Some(cart_id) = cart_id else {
            return self.create(line).await;
        };

        let coordinator = match self.coordinator(cart_id).await {
            Ok(coordinator) => coordinator,
            Err(CartError::CartNotFound(_)) => {
                info!("Cart expired, creating a new one");
                return self.create(line).await;
            }
            Err(e) => return Err(e),
        };

        let cart = self
            .call(self.inner.backend.add_lines(cart_id, vec![line]))
            .await?;
        let resolution = coordinator.lock().await.apply_snapshot(cart);
        debug!(?resolution, "Applied added line");

        self.settle(cart_id, &coordinator).await;
        let display = coordinator.lock().await.display();
        Ok(display)
    }

    /// Set a line to an explicit quantity. Zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::CartNotFound` if the cart has expired, or
    /// `CartError::Backend` if it cannot be loaded. Backend failures of the
    /// mutation itself are reported through the returned resolution.
    #[instrument(skip(self), fields(cart_id = %cart_id, line_id = %line_id))]
    pub async fn set_quantity(
        &self,
        cart_id: &CartId,
        line_id: &LineId,
        quantity: u32,
    ) -> Result<CartUpdate, CartError> {
        self.mutate(cart_id, CartMutation::set_quantity(line_id.clone(), quantity))
            .await
    }

    /// Move a line's quantity by `delta` from what is currently displayed.
    /// Anything that would drop below 1 removes the line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::LineNotFound` if the line is not displayed, plus
    /// the loading errors of [`Self::set_quantity`].
    #[instrument(skip(self), fields(cart_id = %cart_id, line_id = %line_id))]
    pub async fn adjust(
        &self,
        cart_id: &CartId,
        line_id: &LineId,
        delta: i64,
    ) -> Result<CartUpdate, CartError> {
        let coordinator = self.coordinator(cart_id).await?;

        // Read the projection and submit under one lock so that rapid clicks
        // build on each other.
        let request = {
            let mut guard = coordinator.lock().await;
            let current = guard
                .display()
                .lines
                .iter()
                .find(|l| &l.line.id == line_id)
                .map(|l| l.line.quantity)
                .ok_or_else(|| CartError::LineNotFound(line_id.clone()))?;
            guard.submit(CartMutation::adjust(line_id.clone(), current, delta))
        };

        self.dispatch(cart_id, &coordinator, request).await
    }

    /// Remove lines.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Request` if no lines are given, plus the loading
    /// errors of [`Self::set_quantity`].
    #[instrument(skip(self, line_ids), fields(cart_id = %cart_id, lines = line_ids.len()))]
    pub async fn remove(&self, cart_id: &CartId, line_ids: Vec<LineId>) -> Result<CartUpdate, CartError> {
        self.mutate(cart_id, CartMutation::remove(line_ids)?).await
    }

    /// Submit and dispatch an arbitrary line mutation.
    ///
    /// # Errors
    ///
    /// Returns `CartError::CartNotFound` or `CartError::Backend` if the cart
    /// cannot be loaded.
    pub async fn mutate(&self, cart_id: &CartId, mutation: CartMutation) -> Result<CartUpdate, CartError> {
        let coordinator = self.coordinator(cart_id).await?;
        let request = coordinator.lock().await.submit(mutation);
        self.dispatch(cart_id, &coordinator, request).await
    }

    // =========================================================================
    // Discount Codes
    // =========================================================================

    /// Add a discount code to the cart.
    ///
    /// Codes that currently apply are kept; codes that do not are dropped.
    /// Re-entering a code already on the cart is harmless.
    ///
    /// # Errors
    ///
    /// Returns `CartError::EmptyDiscountCode` for a blank code,
    /// `CartError::Rejected` if the backend refuses it, plus the loading
    /// errors of [`Self::display`].
    #[instrument(skip(self, code), fields(cart_id = %cart_id))]
    pub async fn apply_discount_code(
        &self,
        cart_id: &CartId,
        code: &str,
    ) -> Result<DisplayCart, CartError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(CartError::EmptyDiscountCode);
        }

        let coordinator = self.coordinator(cart_id).await?;
        let mut codes: Vec<String> = coordinator
            .lock()
            .await
            .confirmed()
            .applicable_discount_codes()
            .filter(|existing| !existing.eq_ignore_ascii_case(code))
            .map(str::to_string)
            .collect();
        codes.push(code.to_string());

        self.set_discount_codes(cart_id, &coordinator, &codes).await
    }

    /// Remove a discount code from the cart. Unknown codes leave it as is.
    ///
    /// # Errors
    ///
    /// See [`Self::apply_discount_code`].
    #[instrument(skip(self, code), fields(cart_id = %cart_id))]
    pub async fn remove_discount_code(
        &self,
        cart_id: &CartId,
        code: &str,
    ) -> Result<DisplayCart, CartError> {
        let code = code.trim();
        let coordinator = self.coordinator(cart_id).await?;
        let codes: Vec<String> = coordinator
            .lock()
            .await
            .confirmed()
            .discount_codes
            .iter()
            .map(|discount| discount.code.as_str())
            .filter(|existing| !existing.eq_ignore_ascii_case(code))
            .map(str::to_string)
            .collect();

        self.set_discount_codes(cart_id, &coordinator, &codes).await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Refetch the cart and return its projection.
    ///
    /// When nothing is in flight the fetched cart replaces confirmed state
    /// outright; otherwise it is applied like any other snapshot.
    ///
    /// # Errors
    ///
    /// Returns `CartError::CartNotFound` if the cart has expired (its
    /// coordinator is dropped), or `CartError::Backend` on failure.
    #[instrument(skip(self), fields(cart_id = %cart_id))]
    pub async fn show(&self, cart_id: &CartId) -> Result<DisplayCart, CartError> {
        let cart = match self.call(self.inner.backend.get_cart(cart_id)).await {
            Ok(cart) => cart,
            Err(ShopifyError::NotFound(_)) => {
                self.forget(cart_id).await;
                return Err(CartError::CartNotFound(cart_id.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let coordinator = self
            .inner
            .coordinators
            .get_with_by_ref(cart_id, async {
                Arc::new(Mutex::new(MutationCoordinator::new(cart.clone())))
            })
            .await;

        let mut guard = coordinator.lock().await;
        if guard.is_idle() {
            guard.reconcile(cart);
        } else {
            guard.apply_snapshot(cart);
        }
        Ok(guard.display())
    }

    /// The current projection without refetching.
    ///
    /// # Errors
    ///
    /// Returns `CartError::CartNotFound` or `CartError::Backend` if the cart
    /// has to be loaded and cannot be.
    pub async fn display(&self, cart_id: &CartId) -> Result<DisplayCart, CartError> {
        let coordinator = self.coordinator(cart_id).await?;
        let display = coordinator.lock().await.display();
        Ok(display)
    }

    /// Projected item count for the cart badge.
    ///
    /// # Errors
    ///
    /// See [`Self::display`].
    pub async fn count(&self, cart_id: &CartId) -> Result<u32, CartError> {
        Ok(self.display(cart_id).await?.total_quantity)
    }

    /// Backend checkout URL for the cart.
    ///
    /// # Errors
    ///
    /// See [`Self::display`].
    pub async fn checkout_url(&self, cart_id: &CartId) -> Result<String, CartError> {
        let coordinator = self.coordinator(cart_id).await?;
        let url = coordinator.lock().await.confirmed().checkout_url.clone();
        Ok(url)
    }

    /// Drop the coordinator for a cart, e.g. once it has expired.
    pub async fn forget(&self, cart_id: &CartId) {
        self.inner.coordinators.invalidate(cart_id).await;
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn create(&self, line: NewCartLine) -> Result<DisplayCart, CartError> {
        let cart = self.call(self.inner.backend.create_cart(vec![line])).await?;
        info!(cart_id = %cart.id, "Created cart");

        let cart_id = cart.id.clone();
        let coordinator = MutationCoordinator::new(cart);
        let display = coordinator.display();
        self.inner
            .coordinators
            .insert(cart_id, Arc::new(Mutex::new(coordinator)))
            .await;
        Ok(display)
    }

    async fn coordinator(&self, cart_id: &CartId) -> Result<SharedCoordinator, CartError> {
        self.inner
            .coordinators
            .try_get_with_by_ref(cart_id, async {
                let cart = self.call(self.inner.backend.get_cart(cart_id)).await?;
                debug!(cart_id = %cart_id, "Loaded cart coordinator");
                Ok::<_, ShopifyError>(Arc::new(Mutex::new(MutationCoordinator::new(cart))))
            })
            .await
            .map_err(CartError::from)
    }

    async fn set_discount_codes(
        &self,
        cart_id: &CartId,
        coordinator: &SharedCoordinator,
        codes: &[String],
    ) -> Result<DisplayCart, CartError> {
        let cart = self
            .call(self.inner.backend.update_discount_codes(cart_id, codes))
            .await?;
        let resolution = coordinator.lock().await.apply_snapshot(cart);
        debug!(?resolution, codes = codes.len(), "Applied discount codes");

        self.settle(cart_id, coordinator).await;
        Ok(coordinator.lock().await.display())
    }

    /// Send a submitted request to the backend and resolve its outcome.
    async fn dispatch(
        &self,
        cart_id: &CartId,
        coordinator: &SharedCoordinator,
        request: MutationRequest,
    ) -> Result<CartUpdate, CartError> {
        let MutationRequest { ticket, mutation } = request;
        debug!(coalescing_key = %ticket.key(), ticket = ticket.seq(), "Dispatching cart mutation");

        let outcome = match &mutation {
            CartMutation::Update(lines) => {
                self.call(self.inner.backend.update_lines(cart_id, lines)).await
            }
            CartMutation::Remove(line_ids) => {
                self.call(self.inner.backend.remove_lines(cart_id, line_ids))
                    .await
            }
        }
        .map_err(classify);

        if let Err(failure) = &outcome {
            warn!(
                coalescing_key = %ticket.key(),
                ticket = ticket.seq(),
                error = %failure,
                "Cart mutation failed"
            );
        }

        let resolution = coordinator.lock().await.resolve(&ticket, outcome);
        debug!(coalescing_key = %ticket.key(), ticket = ticket.seq(), ?resolution, "Resolved cart mutation");

        self.settle(cart_id, coordinator).await;
        let cart = coordinator.lock().await.display();
        Ok(CartUpdate { resolution, cart })
    }

    /// Refetch the cart if a discarded response may have diverged it and
    /// nothing else is in flight.
    async fn settle(&self, cart_id: &CartId, coordinator: &SharedCoordinator) {
        {
            let guard = coordinator.lock().await;
            if !(guard.needs_reconcile() && guard.is_idle()) {
                return;
            }
        }

        match self.call(self.inner.backend.get_cart(cart_id)).await {
            Ok(cart) => {
                let mut guard = coordinator.lock().await;
                // A request submitted meanwhile will settle again when it resolves.
                if guard.is_idle() {
                    guard.reconcile(cart);
                    info!(cart_id = %cart_id, "Reconciled cart after superseded write");
                }
            }
            Err(e) => {
                warn!(cart_id = %cart_id, error = %e, "Cart reconcile failed");
            }
        }
    }

    /// Run a backend call under the request timeout.
    async fn call<T>(
        &self,
        call: impl Future<Output = Result<T, ShopifyError>>,
    ) -> Result<T, ShopifyError> {
        let timeout = self.inner.request_timeout;
        tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| ShopifyError::Timeout(timeout))?
    }
}
