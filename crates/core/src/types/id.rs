//! Newtype IDs for type-safe entity references.
//!
//! Commerce backend identifiers are opaque strings (Shopify global IDs such as
//! `gid://shopify/CartLine/1`). Use the `define_string_id!` macro to create
//! wrappers that prevent accidentally passing a variant ID where a cart line ID
//! is expected.

use thiserror::Error;

/// Error produced when parsing an ID from untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// The ID was empty or only whitespace.
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Macro to define a type-safe string ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `PartialOrd`, `Ord`, `Hash`
/// - `new()` (trusted input), `parse()` (rejects empty input), `as_str()`
/// - `Display`, `AsRef<str>`, and `From<&str>`/`From<String>`
///
/// # Example
///
/// ```rust
/// # use strider_core::define_string_id;
/// define_string_id!(OrderRef);
/// define_string_id!(ShipmentRef);
///
/// let order = OrderRef::new("gid://shopify/Order/1");
/// assert_eq!(order.as_str(), "gid://shopify/Order/1");
///
/// // These are different types, so this won't compile:
/// // let _: ShipmentRef = order;
/// ```
#[macro_export]
macro_rules! define_string_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an ID from a value already known to be valid.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Parse an ID from untrusted input, trimming whitespace.
            ///
            /// # Errors
            ///
            /// Returns `IdError::Empty` if nothing remains after trimming.
            pub fn parse(id: &str) -> ::core::result::Result<Self, $crate::types::id::IdError> {
                let trimmed = id.trim();
                if trimmed.is_empty() {
                    return Err($crate::types::id::IdError::Empty(stringify!($name)));
                }
                Ok(Self(trimmed.to_owned()))
            }

            /// Get the underlying string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_string_id!(CartId);
define_string_id!(LineId);
define_string_id!(MerchandiseId);
define_string_id!(ProductId);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_whitespace() {
        let id = LineId::parse("  gid://shopify/CartLine/1 ").unwrap();
        assert_eq!(id.as_str(), "gid://shopify/CartLine/1");
    }

    #[test]
    fn test_parse_rejects_blank() {
        assert_eq!(LineId::parse("   "), Err(IdError::Empty("LineId")));
        assert_eq!(
            CartId::parse("").unwrap_err().to_string(),
            "CartId must not be empty"
        );
    }

    #[test]
    fn test_ids_sort_lexically() {
        let mut ids = vec![LineId::new("L2"), LineId::new("L10"), LineId::new("L1")];
        ids.sort();
        assert_eq!(ids, vec![LineId::new("L1"), LineId::new("L10"), LineId::new("L2")]);
    }

    #[test]
    fn test_serde_transparent() {
        let id = MerchandiseId::new("gid://shopify/ProductVariant/42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"gid://shopify/ProductVariant/42\"");
        let back: MerchandiseId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
