//! GraphQL operation definitions for the Shopify Storefront API.
//!
//! Each operation implements `graphql_client::GraphQLQuery` by hand: the
//! document lives here as a string, and the `Variables`/`ResponseData` types
//! sit in a module named after the operation, the same layout the derive
//! macro generates.

use graphql_client::{GraphQLQuery, QueryBody};
use serde::{Deserialize, Serialize};

/// Selection shared by every operation that returns a cart.
macro_rules! cart_fields_fragment {
    () => {
        r"
fragment CartFields on Cart {
  id
  checkoutUrl
  updatedAt
  totalQuantity
  cost {
    subtotalAmount { amount currencyCode }
    totalAmount { amount currencyCode }
  }
  discountCodes { code applicable }
  appliedGiftCards {
    lastCharacters
    amountUsed { amount currencyCode }
  }
  lines(first: 100) {
    nodes {
      id
      quantity
      cost {
        amountPerQuantity { amount currencyCode }
        totalAmount { amount currencyCode }
      }
      merchandise {
        ... on ProductVariant {
          id
          title
          image { url }
          selectedOptions { name value }
          product { id handle title }
        }
      }
    }
  }
}
"
    };
}

macro_rules! operation {
    ($name:ident, $module:ident, $document:expr) => {
        impl GraphQLQuery for $name {
            type Variables = $module::Variables;
            type ResponseData = $module::ResponseData;

            fn build_query(variables: Self::Variables) -> QueryBody<Self::Variables> {
                QueryBody {
                    variables,
                    query: $document,
                    operation_name: stringify!($name),
                }
            }
        }
    };
}

// =============================================================================
// Shared response fields
// =============================================================================

/// Monetary amount as returned by the API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoneyFields {
    pub amount: String,
    pub currency_code: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartCostFields {
    pub subtotal_amount: MoneyFields,
    pub total_amount: MoneyFields,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineCostFields {
    pub amount_per_quantity: MoneyFields,
    pub total_amount: MoneyFields,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageFields {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectedOptionFields {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CartProductFields {
    pub id: String,
    pub handle: String,
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartMerchandiseFields {
    pub id: String,
    pub title: String,
    pub image: Option<ImageFields>,
    #[serde(default)]
    pub selected_options: Vec<SelectedOptionFields>,
    pub product: CartProductFields,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CartLineFields {
    pub id: String,
    pub quantity: i64,
    pub cost: CartLineCostFields,
    pub merchandise: CartMerchandiseFields,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CartLineConnection {
    pub nodes: Vec<CartLineFields>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscountCodeFields {
    pub code: String,
    pub applicable: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedGiftCardFields {
    pub last_characters: String,
    pub amount_used: MoneyFields,
}

/// Everything selected by the `CartFields` fragment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartFields {
    pub id: String,
    pub checkout_url: String,
    pub updated_at: String,
    pub total_quantity: i64,
    pub cost: CartCostFields,
    #[serde(default)]
    pub discount_codes: Vec<DiscountCodeFields>,
    #[serde(default)]
    pub applied_gift_cards: Vec<AppliedGiftCardFields>,
    pub lines: CartLineConnection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CartUserErrorFields {
    pub code: Option<String>,
    pub field: Option<Vec<String>>,
    pub message: String,
}

/// Payload shared by all cart mutations.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartMutationPayload {
    pub cart: Option<CartFields>,
    #[serde(default)]
    pub user_errors: Vec<CartUserErrorFields>,
}

/// Input for a new cart line.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineInput {
    pub merchandise_id: String,
    pub quantity: i64,
}

/// Input for changing an existing line's quantity.
#[derive(Debug, Clone, Serialize)]
pub struct CartLineUpdateInput {
    pub id: String,
    pub quantity: i64,
}

// =============================================================================
// Cart query
// =============================================================================

pub struct GetCart;

pub mod get_cart {
    use super::{CartFields, Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Variables {
        pub cart_id: String,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ResponseData {
        pub cart: Option<CartFields>,
    }
}

operation!(
    GetCart,
    get_cart,
    concat!(
        "query GetCart($cartId: ID!) { cart(id: $cartId) { ...CartFields } }",
        cart_fields_fragment!()
    )
);

// =============================================================================
// Cart mutations
// =============================================================================

pub struct CreateCart;

pub mod create_cart {
    use super::{CartLineInput, CartMutationPayload, Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize)]
    pub struct CartInput {
        pub lines: Vec<CartLineInput>,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct Variables {
        pub input: CartInput,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ResponseData {
        pub cart_create: Option<CartMutationPayload>,
    }
}

operation!(
    CreateCart,
    create_cart,
    concat!(
        "mutation CreateCart($input: CartInput!) {
  cartCreate(input: $input) {
    cart { ...CartFields }
    userErrors { code field message }
  }
}",
        cart_fields_fragment!()
    )
);

pub struct AddToCart;

pub mod add_to_cart {
    use super::{CartLineInput, CartMutationPayload, Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Variables {
        pub cart_id: String,
        pub lines: Vec<CartLineInput>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ResponseData {
        pub cart_lines_add: Option<CartMutationPayload>,
    }
}

operation!(
    AddToCart,
    add_to_cart,
    concat!(
        "mutation AddToCart($cartId: ID!, $lines: [CartLineInput!]!) {
  cartLinesAdd(cartId: $cartId, lines: $lines) {
    cart { ...CartFields }
    userErrors { code field message }
  }
}",
        cart_fields_fragment!()
    )
);

pub struct UpdateCartLines;

pub mod update_cart_lines {
    use super::{CartLineUpdateInput, CartMutationPayload, Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Variables {
        pub cart_id: String,
        pub lines: Vec<CartLineUpdateInput>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ResponseData {
        pub cart_lines_update: Option<CartMutationPayload>,
    }
}

operation!(
    UpdateCartLines,
    update_cart_lines,
    concat!(
        "mutation UpdateCartLines($cartId: ID!, $lines: [CartLineUpdateInput!]!) {
  cartLinesUpdate(cartId: $cartId, lines: $lines) {
    cart { ...CartFields }
    userErrors { code field message }
  }
}",
        cart_fields_fragment!()
    )
);

pub struct RemoveFromCart;

pub mod remove_from_cart {
    use super::{CartMutationPayload, Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Variables {
        pub cart_id: String,
        pub line_ids: Vec<String>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ResponseData {
        pub cart_lines_remove: Option<CartMutationPayload>,
    }
}

operation!(
    RemoveFromCart,
    remove_from_cart,
    concat!(
        "mutation RemoveFromCart($cartId: ID!, $lineIds: [ID!]!) {
  cartLinesRemove(cartId: $cartId, lineIds: $lineIds) {
    cart { ...CartFields }
    userErrors { code field message }
  }
}",
        cart_fields_fragment!()
    )
);

pub struct UpdateDiscountCodes;

pub mod update_discount_codes {
    use super::{CartMutationPayload, Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Variables {
        pub cart_id: String,
        /// The full set of codes; codes left out are removed.
        pub discount_codes: Vec<String>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ResponseData {
        pub cart_discount_codes_update: Option<CartMutationPayload>,
    }
}

operation!(
    UpdateDiscountCodes,
    update_discount_codes,
    concat!(
        "mutation UpdateDiscountCodes($cartId: ID!, $discountCodes: [String!]!) {
  cartDiscountCodesUpdate(cartId: $cartId, discountCodes: $discountCodes) {
    cart { ...CartFields }
    userErrors { code field message }
  }
}",
        cart_fields_fragment!()
    )
);
