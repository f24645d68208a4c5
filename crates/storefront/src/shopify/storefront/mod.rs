//! Shopify Storefront API client implementation.
//!
//! Uses `graphql_client` request/response envelopes with `reqwest` 0.13 for
//! HTTP. Cart data is never cached: every call returns the authoritative cart.

mod conversions;
pub mod queries;

use std::sync::Arc;
use std::time::Duration;

use graphql_client::{GraphQLQuery, Response};
use secrecy::{ExposeSecret, SecretString};
use strider_core::{Cart, CartId, LineId, LineQuantity};
use tracing::{debug, instrument};

use crate::config::ShopifyStorefrontConfig;
use crate::shopify::types::NewCartLine;
use crate::shopify::{GraphQLError, GraphQLErrorLocation, ShopifyError};

use conversions::{convert_cart, convert_user_errors};
use queries::{
    AddToCart, CartLineInput, CartLineUpdateInput, CartMutationPayload, CreateCart, GetCart,
    RemoveFromCart, UpdateCartLines, UpdateDiscountCodes, add_to_cart, create_cart, get_cart,
    remove_from_cart, update_cart_lines, update_discount_codes,
};

// =============================================================================
// StorefrontClient
// =============================================================================

/// Client for the Shopify Storefront API cart operations.
#[derive(Clone)]
pub struct StorefrontClient {
    inner: Arc<StorefrontClientInner>,
}

struct StorefrontClientInner {
    client: reqwest::Client,
    endpoint: String,
    access_token: SecretString,
}

impl StorefrontClient {
    /// Create a new Storefront API client.
    ///
    /// Every request is bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError::Http` if the HTTP client cannot be built.
    pub fn new(config: &ShopifyStorefrontConfig, timeout: Duration) -> Result<Self, ShopifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            inner: Arc::new(StorefrontClientInner {
                client,
                endpoint: config.endpoint(),
                access_token: config.storefront_private_token.clone(),
            }),
        })
    }

    /// Execute a GraphQL operation.
    async fn execute<Q: GraphQLQuery>(
        &self,
        variables: Q::Variables,
    ) -> Result<Q::ResponseData, ShopifyError> {
        let request_body = Q::build_query(variables);

        let response = self
            .inner
            .client
            .post(&self.inner.endpoint)
            // Private access tokens use a different header than public tokens
            // See: https://shopify.dev/docs/storefronts/headless/building-with-the-storefront-api/getting-started
            .header(
                "Shopify-Storefront-Private-Token",
                self.inner.access_token.expose_secret(),
            )
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ShopifyError::RateLimited(retry_after));
        }

        // Read the body as text first for better error diagnostics
        let response_text = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %preview(&response_text, 500),
                "Shopify API returned non-success status"
            );
            return Err(ShopifyError::GraphQL(vec![GraphQLError::message(format!(
                "HTTP {status}: {}",
                preview(&response_text, 200)
            ))]));
        }

        let response: Response<Q::ResponseData> = match serde_json::from_str(&response_text) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    body = %preview(&response_text, 500),
                    "Failed to parse Shopify GraphQL response"
                );
                return Err(ShopifyError::Parse(e));
            }
        };

        if let Some(errors) = response.errors
            && !errors.is_empty()
        {
            debug!(errors = ?errors, "GraphQL errors in response");
            return Err(ShopifyError::GraphQL(
                errors.into_iter().map(convert_graphql_error).collect(),
            ));
        }

        response.data.ok_or_else(|| {
            tracing::error!(
                body = %preview(&response_text, 500),
                "Shopify GraphQL response has no data and no errors"
            );
            ShopifyError::GraphQL(vec![GraphQLError::message("No data in response")])
        })
    }

    // =========================================================================
    // Cart Methods
    // =========================================================================

    /// Create a cart holding the given lines.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError::UserError` if Shopify rejects the lines, or
    /// another error if the request fails.
    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn create_cart(&self, lines: Vec<NewCartLine>) -> Result<Cart, ShopifyError> {
        let variables = create_cart::Variables {
            input: create_cart::CartInput {
                lines: lines.into_iter().map(line_input).collect(),
            },
        };

        let data = self.execute::<CreateCart>(variables).await?;
        payload_cart(data.cart_create, "cartCreate")
    }

    /// Get an existing cart.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError::NotFound` if the cart no longer exists (carts
    /// expire after checkout or inactivity), or another error if the request
    /// fails.
    #[instrument(skip(self), fields(cart_id = %cart_id))]
    pub async fn get_cart(&self, cart_id: &CartId) -> Result<Cart, ShopifyError> {
        let variables = get_cart::Variables {
            cart_id: cart_id.to_string(),
        };

        let data = self.execute::<GetCart>(variables).await?;

        data.cart
            .map(convert_cart)
            .transpose()?
            .ok_or_else(|| ShopifyError::NotFound(cart_id.to_string()))
    }

    /// Add lines to a cart.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError::UserError` if Shopify rejects the lines, or
    /// another error if the request fails.
    #[instrument(skip(self, lines), fields(cart_id = %cart_id, lines = lines.len()))]
    pub async fn add_to_cart(
        &self,
        cart_id: &CartId,
        lines: Vec<NewCartLine>,
    ) -> Result<Cart, ShopifyError> {
        let variables = add_to_cart::Variables {
            cart_id: cart_id.to_string(),
            lines: lines.into_iter().map(line_input).collect(),
        };

        let data = self.execute::<AddToCart>(variables).await?;
        payload_cart(data.cart_lines_add, "cartLinesAdd")
    }

    /// Set the quantity of existing lines.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError::UserError` if Shopify rejects a quantity (e.g.
    /// not enough stock), or another error if the request fails.
    #[instrument(skip(self, lines), fields(cart_id = %cart_id, lines = lines.len()))]
    pub async fn update_cart_lines(
        &self,
        cart_id: &CartId,
        lines: &[LineQuantity],
    ) -> Result<Cart, ShopifyError> {
        let variables = update_cart_lines::Variables {
            cart_id: cart_id.to_string(),
            lines: lines
                .iter()
                .map(|line| CartLineUpdateInput {
                    id: line.line_id.to_string(),
                    quantity: i64::from(line.quantity.get()),
                })
                .collect(),
        };

        let data = self.execute::<UpdateCartLines>(variables).await?;
        payload_cart(data.cart_lines_update, "cartLinesUpdate")
    }

    /// Remove lines from a cart.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError::UserError` if Shopify rejects the removal, or
    /// another error if the request fails.
    #[instrument(skip(self, line_ids), fields(cart_id = %cart_id, lines = line_ids.len()))]
    pub async fn remove_from_cart(
        &self,
        cart_id: &CartId,
        line_ids: &[LineId],
    ) -> Result<Cart, ShopifyError> {
        let variables = remove_from_cart::Variables {
            cart_id: cart_id.to_string(),
            line_ids: line_ids.iter().map(ToString::to_string).collect(),
        };

        let data = self.execute::<RemoveFromCart>(variables).await?;
        payload_cart(data.cart_lines_remove, "cartLinesRemove")
    }

    /// Replace the cart's discount codes. An empty slice removes them all.
    ///
    /// Unknown or inapplicable codes are not errors: Shopify keeps them on
    /// the cart with `applicable: false`.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError::UserError` if Shopify rejects the codes, or
    /// another error if the request fails.
    #[instrument(skip(self, codes), fields(cart_id = %cart_id, codes = codes.len()))]
    pub async fn update_discount_codes(
        &self,
        cart_id: &CartId,
        codes: &[String],
    ) -> Result<Cart, ShopifyError> {
        let variables = update_discount_codes::Variables {
            cart_id: cart_id.to_string(),
            discount_codes: codes.to_vec(),
        };

        let data = self.execute::<UpdateDiscountCodes>(variables).await?;
        payload_cart(data.cart_discount_codes_update, "cartDiscountCodesUpdate")
    }
}

fn line_input(line: NewCartLine) -> CartLineInput {
    CartLineInput {
        merchandise_id: line.merchandise_id.into(),
        quantity: i64::from(line.quantity),
    }
}

/// Unwrap a mutation payload: user errors first, then the cart.
fn payload_cart(
    payload: Option<CartMutationPayload>,
    field: &str,
) -> Result<Cart, ShopifyError> {
    let Some(payload) = payload else {
        return Err(ShopifyError::Unexpected(format!("{field} returned null")));
    };

    if !payload.user_errors.is_empty() {
        return Err(ShopifyError::UserError(convert_user_errors(
            payload.user_errors,
        )));
    }

    payload
        .cart
        .map(convert_cart)
        .transpose()?
        .ok_or_else(|| ShopifyError::Unexpected(format!("{field} returned no cart")))
}

fn convert_graphql_error(e: graphql_client::Error) -> GraphQLError {
    GraphQLError {
        message: e.message,
        locations: e.locations.map_or_else(Vec::new, |locs| {
            locs.into_iter()
                .map(|l| GraphQLErrorLocation {
                    line: i64::from(l.line),
                    column: i64::from(l.column),
                })
                .collect()
        }),
        path: e.path.map_or_else(Vec::new, |p| {
            p.into_iter()
                .map(|fragment| match fragment {
                    graphql_client::PathFragment::Key(s) => serde_json::Value::String(s),
                    graphql_client::PathFragment::Index(i) => serde_json::Value::Number(i.into()),
                })
                .collect()
        }),
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn payload(json: &str) -> Option<CartMutationPayload> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_payload_user_errors_win() {
        let result = payload_cart(
            payload(
                r#"{"cart": null, "userErrors": [
                    {"code": "MERCHANDISE_NOT_ENOUGH_STOCK", "field": ["lines"], "message": "Only 1 left."}
                ]}"#,
            ),
            "cartLinesUpdate",
        );
        match result {
            Err(ShopifyError::UserError(messages)) => assert_eq!(messages, vec!["Only 1 left."]),
            other => panic!("expected user error, got {other:?}"),
        }
    }

    #[test]
    fn test_payload_null_is_unexpected() {
        let err = payload_cart(payload("null"), "cartLinesRemove").unwrap_err();
        assert_eq!(err.to_string(), "Unexpected response: cartLinesRemove returned null");
    }

    #[test]
    fn test_payload_missing_cart_is_unexpected() {
        let err = payload_cart(payload(r#"{"cart": null, "userErrors": []}"#), "cartCreate")
            .unwrap_err();
        assert!(matches!(err, ShopifyError::Unexpected(_)));
    }

    #[test]
    fn test_convert_graphql_error() {
        let error: graphql_client::Error = serde_json::from_str(
            r#"{"message": "Invalid global id", "locations": [{"line": 2, "column": 3}], "path": ["cart", 0]}"#,
        )
        .unwrap();
        let converted = convert_graphql_error(error);
        assert_eq!(converted.message, "Invalid global id");
        assert_eq!(converted.locations.first().map(|l| l.column), Some(3));
        assert_eq!(converted.path.len(), 2);
    }

    #[test]
    fn test_preview_counts_chars() {
        assert_eq!(preview("héllo", 2), "hé");
    }
}
