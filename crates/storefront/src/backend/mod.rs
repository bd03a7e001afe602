//! Record backend client and collaborator traits.
//!
//! # Architecture
//!
//! - The backend-as-a-service owns authentication, persistence and query
//!   execution; Mercato never stores records itself
//! - [`RecordClient`] speaks the backend's REST API with `reqwest`
//! - [`MembershipBackend`] is the seam the optimistic stores sync through,
//!   so tests can swap in an in-memory backend
//! - [`FilterBuilder`] renders filter expressions with proper quoting
//!
//! # Example
//!
//! ```rust,ignore
//! use mercato_storefront::backend::{FilterBuilder, ListQuery, RecordClient};
//!
//! let client = RecordClient::new(&config.backend)?;
//! let filter = FilterBuilder::new().eq("category", "tea").gte("stock", 1).build();
//! let page = client
//!     .list::<Product>("products", &ListQuery::new().filter(filter), None)
//!     .await?;
//! ```

mod client;
pub mod filter;
pub mod types;
mod wishlist;

use std::future::Future;
use std::hash::Hash;

use secrecy::SecretString;
use thiserror::Error;

use mercato_core::UserId;

pub use client::{ListQuery, RecordClient};
pub use filter::{FilterBuilder, FilterValue};
pub use types::*;
pub use wishlist::WishlistBackend;

/// Errors that can occur when talking to the record backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed (connection, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend returned an error response.
    #[error("backend error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message from the backend's error body.
        message: String,
    },

    /// Missing or expired auth token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Record or collection not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rate limited by the backend.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Client could not be constructed.
    #[error("invalid backend configuration: {0}")]
    Config(String),
}

impl BackendError {
    /// Human-readable message suitable for showing to a shopper.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Http(_) => "The store is temporarily unreachable. Please try again.".to_string(),
            Self::Api { message, .. } if !message.is_empty() => message.clone(),
            Self::Api { .. } | Self::Parse(_) | Self::Config(_) => {
                "Something went wrong. Please try again.".to_string()
            }
            Self::Unauthorized(_) => "Your session has expired. Please sign in again.".to_string(),
            Self::NotFound(_) => "That item is no longer available.".to_string(),
            Self::RateLimited(secs) => {
                format!("Too many requests. Please try again in {secs} seconds.")
            }
        }
    }
}

/// An authenticated backend identity.
///
/// Carries the user's record ID plus the auth token the backend issued at
/// login. The token is redacted from `Debug` output.
#[derive(Clone)]
pub struct Identity {
    user_id: UserId,
    token: SecretString,
}

impl Identity {
    /// Create an identity from a user ID and backend auth token.
    #[must_use]
    pub fn new(user_id: UserId, token: impl Into<String>) -> Self {
        Self {
            user_id,
            token: SecretString::from(token.into()),
        }
    }

    /// The user's record ID.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// The backend auth token.
    #[must_use]
    pub const fn token(&self) -> &SecretString {
        &self.token
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// An entity that can be looked up by a membership key.
pub trait Keyed {
    /// Key type identifying the entity.
    type Key;

    /// The entity's key.
    fn key(&self) -> &Self::Key;
}

/// Remote collaborator for a user-scoped membership collection (e.g. a
/// wishlist): a set of keys per user, each resolving to a full entity.
pub trait MembershipBackend: Send + Sync + 'static {
    /// Membership key (usually a product ID).
    type Key: Clone + Eq + Hash + std::fmt::Debug + std::fmt::Display + Send + Sync + 'static;
    /// Entity cached alongside each key.
    type Entity: Keyed<Key = Self::Key> + Clone + Send + Sync + 'static;

    /// Fetch every member entity for the identity.
    fn fetch_all(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<Vec<Self::Entity>, BackendError>> + Send;

    /// Record `key` as a member for the identity.
    fn add_membership(
        &self,
        identity: &Identity,
        key: &Self::Key,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Remove `key` from the identity's members.
    fn remove_membership(
        &self,
        identity: &Identity,
        key: &Self::Key,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}
