//! Newtype IDs for type-safe record references.
//!
//! The record backend identifies every record by an opaque string. Use the
//! `define_id!` macro to create typed wrappers so a product ID can never be
//! passed where a user ID is expected.

use thiserror::Error;

/// Maximum length accepted for a backend record ID.
pub const MAX_RECORD_ID_LENGTH: usize = 64;

/// Errors that can occur when parsing a record ID.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordIdError {
    /// The input string is empty.
    #[error("record id cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("record id must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input contains a character outside `[A-Za-z0-9_-]`.
    #[error("record id contains invalid character {0:?}")]
    InvalidChar(char),
}

/// Validate a raw record ID string.
///
/// IDs end up inside filter expressions and URL paths, so anything outside
/// `[A-Za-z0-9_-]` is rejected up front.
///
/// # Errors
///
/// Returns `RecordIdError` if the input is empty, too long, or contains an
/// invalid character.
pub fn validate_record_id(s: &str) -> Result<(), RecordIdError> {
    if s.is_empty() {
        return Err(RecordIdError::Empty);
    }
    if s.len() > MAX_RECORD_ID_LENGTH {
        return Err(RecordIdError::TooLong {
            max: MAX_RECORD_ID_LENGTH,
        });
    }
    if let Some(c) = s
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(RecordIdError::InvalidChar(c));
    }
    Ok(())
}

/// Macro to define a type-safe record ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(try_from = "String")]` so bad
///   IDs are rejected while deserializing
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - `parse()`, `as_str()`, `Display`, `FromStr`
///
/// # Example
///
/// ```rust
/// # use mercato_core::define_id;
/// define_id!(CouponId);
///
/// let id = CouponId::parse("summer_sale").unwrap();
/// assert_eq!(id.as_str(), "summer_sale");
/// assert!(CouponId::parse("bad id").is_err());
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse an ID from a string, validating its format.
            ///
            /// # Errors
            ///
            /// Returns `RecordIdError` if the string is not a valid record ID.
            pub fn parse(s: &str) -> ::core::result::Result<Self, $crate::RecordIdError> {
                $crate::validate_record_id(s)?;
                Ok(Self(s.to_owned()))
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

        impl ::core::str::FromStr for $name {
            type Err = $crate::RecordIdError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::RecordIdError;

            fn try_from(s: String) -> ::core::result::Result<Self, Self::Error> {
                $crate::validate_record_id(&s)?;
                Ok(Self(s))
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// Record IDs used by the storefront
define_id!(RecordId);
define_id!(UserId);
define_id!(ProductId);
define_id!(OrderId);

impl From<ProductId> for RecordId {
    fn from(id: ProductId) -> Self {
        Self(id.0)
    }
}

impl From<RecordId> for ProductId {
    fn from(id: RecordId) -> Self {
        Self(id.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        assert!(RecordId::parse("abc123").is_ok());
        assert!(RecordId::parse("a_b-c").is_ok());
        assert!(RecordId::parse(&"x".repeat(MAX_RECORD_ID_LENGTH)).is_ok());
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(RecordId::parse(""), Err(RecordIdError::Empty));
    }

    #[test]
    fn test_parse_too_long() {
        let long = "x".repeat(MAX_RECORD_ID_LENGTH + 1);
        assert!(matches!(
            RecordId::parse(&long),
            Err(RecordIdError::TooLong { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_filter_metacharacters() {
        assert_eq!(
            RecordId::parse("a\"||1"),
            Err(RecordIdError::InvalidChar('"'))
        );
        assert_eq!(
            RecordId::parse("a b"),
            Err(RecordIdError::InvalidChar(' '))
        );
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: ProductId = serde_json::from_str("\"p1\"").unwrap();
        assert_eq!(ok.as_str(), "p1");
        assert!(serde_json::from_str::<ProductId>("\"p 1\"").is_err());
    }

    #[test]
    fn test_product_record_conversion() {
        let product = ProductId::parse("p1").unwrap();
        let record: RecordId = product.clone().into();
        assert_eq!(ProductId::from(record), product);
    }
}
