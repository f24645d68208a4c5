//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::StorefrontConfig;
use crate::services::{CartBackend, CartService};
use crate::shopify::{ShopifyError, StorefrontClient};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. It is generic over the cart
/// backend so the router can run against a scripted backend in tests.
pub struct AppState<B = StorefrontClient> {
    inner: Arc<AppStateInner<B>>,
}

impl<B> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct AppStateInner<B> {
    config: StorefrontConfig,
    carts: CartService<B>,
}

impl AppState {
    /// Create application state backed by the Shopify Storefront API.
    ///
    /// # Errors
    ///
    /// Returns an error if the Storefront HTTP client cannot be built.
    pub fn new(config: StorefrontConfig) -> Result<Self, ShopifyError> {
        let client = StorefrontClient::new(&config.shopify, config.cart.request_timeout)?;
        Ok(Self::with_backend(config, client))
    }
}

impl<B: CartBackend> AppState<B> {
    /// Create application state over any cart backend.
    #[must_use]
    pub fn with_backend(config: StorefrontConfig, backend: B) -> Self {
        let carts = CartService::new(backend, &config.cart);
        Self {
            inner: Arc::new(AppStateInner { config, carts }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the cart service.
    #[must_use]
    pub fn carts(&self) -> &CartService<B> {
        &self.inner.carts
    }
}
