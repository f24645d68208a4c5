//! Wire-to-domain conversions for cart responses.

use chrono::{DateTime, Utc};
use strider_core::{
    AppliedGiftCard, Cart, CartId, CartLine, DiscountCode, LineCost, LineId, LineMerchandise,
    MerchandiseId, Price, ProductId, SelectedOption,
};
use tracing::warn;

use super::queries::{CartFields, CartLineFields, CartUserErrorFields, MoneyFields};
use crate::shopify::ShopifyError;
use crate::shopify::types::CartUserError;

/// Shopify's variant title for products without options.
const DEFAULT_VARIANT_TITLE: &str = "Default Title";

/// Convert a `CartFields` selection into a confirmed cart.
///
/// # Errors
///
/// Returns `ShopifyError::Unexpected` if an amount, currency, timestamp or
/// quantity cannot be represented.
pub fn convert_cart(cart: CartFields) -> Result<Cart, ShopifyError> {
    let updated_at = DateTime::parse_from_rfc3339(&cart.updated_at)
        .map_err(|e| ShopifyError::Unexpected(format!("cart updatedAt: {e}")))?
        .with_timezone(&Utc);

    let lines = cart
        .lines
        .nodes
        .into_iter()
        .map(convert_line)
        .collect::<Result<Vec<_>, _>>()?;

    let applied_gift_cards = cart
        .applied_gift_cards
        .into_iter()
        .map(|card| {
            Ok(AppliedGiftCard {
                amount_used: money(&card.amount_used)?,
                last_characters: card.last_characters,
            })
        })
        .collect::<Result<Vec<_>, ShopifyError>>()?;

    Ok(Cart {
        id: CartId::new(cart.id),
        checkout_url: cart.checkout_url,
        updated_at,
        lines,
        total_quantity: quantity(cart.total_quantity)?,
        subtotal: money(&cart.cost.subtotal_amount)?,
        total: money(&cart.cost.total_amount)?,
        discount_codes: cart
            .discount_codes
            .into_iter()
            .map(|d| DiscountCode {
                code: d.code,
                applicable: d.applicable,
            })
            .collect(),
        applied_gift_cards,
    })
}

/// Convert mutation user errors into their messages, logging the codes.
pub fn convert_user_errors(errors: Vec<CartUserErrorFields>) -> Vec<String> {
    errors
        .into_iter()
        .map(|e| {
            let error = CartUserError {
                code: e.code,
                field: e.field,
                message: e.message,
            };
            warn!(code = ?error.code, field = ?error.field, message = %error.message, "Cart user error");
            error.message
        })
        .collect()
}

fn convert_line(line: CartLineFields) -> Result<CartLine, ShopifyError> {
    let merchandise = line.merchandise;
    let variant_title = Some(merchandise.title).filter(|t| t != DEFAULT_VARIANT_TITLE);

    Ok(CartLine {
        id: LineId::new(line.id),
        merchandise_id: MerchandiseId::new(merchandise.id),
        quantity: quantity(line.quantity)?,
        cost: LineCost {
            amount_per_quantity: money(&line.cost.amount_per_quantity)?,
            total_amount: money(&line.cost.total_amount)?,
        },
        merchandise: LineMerchandise {
            product_id: ProductId::new(merchandise.product.id),
            product_handle: merchandise.product.handle,
            product_title: merchandise.product.title,
            variant_title,
            image_url: merchandise.image.map(|i| i.url),
            selected_options: merchandise
                .selected_options
                .into_iter()
                .map(|o| SelectedOption {
                    name: o.name,
                    value: o.value,
                })
                .collect(),
        },
    })
}

fn money(money: &MoneyFields) -> Result<Price, ShopifyError> {
    Price::parse(&money.amount, &money.currency_code)
        .map_err(|e| ShopifyError::Unexpected(format!("money {}: {e}", money.amount)))
}

fn quantity(value: i64) -> Result<u32, ShopifyError> {
    u32::try_from(value).map_err(|_| ShopifyError::Unexpected(format!("quantity {value}")))
}
