//! Record types for the backend collections.
//!
//! Field names follow the backend's JSON (camelCase list envelopes,
//! snake_case record fields).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use mercato_core::{OrderId, OrderStatus, ProductId, RecordId, UserId};

use super::Keyed;

// =============================================================================
// Collections
// =============================================================================

/// Backend collection names.
pub mod collections {
    pub const USERS: &str = "users";
    pub const PRODUCTS: &str = "products";
    pub const WISHLISTS: &str = "wishlists";
    pub const ORDERS: &str = "orders";
}

// =============================================================================
// List Envelope
// =============================================================================

/// Paginated list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult<T> {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
    pub items: Vec<T>,
}

/// Error body returned by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

// =============================================================================
// Auth
// =============================================================================

/// Response from password authentication.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    /// Auth token to send with subsequent requests.
    pub token: String,
    /// The authenticated user record.
    pub record: UserRecord,
}

/// A `users` collection record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

// =============================================================================
// Products
// =============================================================================

/// A `products` collection record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub stock: i64,
    /// Image file name or URL.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub created: String,
}

impl Product {
    /// Whether the product can currently be ordered.
    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.stock > 0
    }
}

impl Keyed for Product {
    type Key = ProductId;

    fn key(&self) -> &ProductId {
        &self.id
    }
}

// =============================================================================
// Wishlists
// =============================================================================

/// A `wishlists` collection record linking a user to a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WishlistRecord {
    pub id: RecordId,
    pub user: UserId,
    pub product: ProductId,
    #[serde(default)]
    pub expand: Option<WishlistExpand>,
}

/// Expanded relations of a wishlist record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WishlistExpand {
    #[serde(default)]
    pub product: Option<Product>,
}

/// Body for creating a wishlist record.
#[derive(Debug, Clone, Serialize)]
pub struct NewWishlistRecord<'a> {
    pub user: &'a UserId,
    pub product: &'a ProductId,
}

// =============================================================================
// Orders
// =============================================================================

/// Shipping address captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub full_name: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

impl ShippingAddress {
    /// Names of required fields that are blank.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("full_name", &self.full_name),
            ("line1", &self.line1),
            ("city", &self.city),
            ("postal_code", &self.postal_code),
            ("country", &self.country),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

/// One line of a placed order (prices frozen at checkout).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

/// An `orders` collection record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub user: UserId,
    pub items: Vec<OrderItem>,
    pub subtotal: Decimal,
    #[serde(default)]
    pub status: OrderStatus,
    pub shipping: ShippingAddress,
    #[serde(default)]
    pub created: String,
}

/// Body for creating an order record.
#[derive(Debug, Clone, Serialize)]
pub struct NewOrder<'a> {
    pub user: &'a UserId,
    pub items: Vec<OrderItem>,
    pub subtotal: Decimal,
    pub status: OrderStatus,
    pub shipping: &'a ShippingAddress,
}
