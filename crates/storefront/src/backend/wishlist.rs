//! Wishlist membership over the `wishlists` collection.

use tracing::{debug, instrument, warn};

use mercato_core::ProductId;

use super::filter::FilterBuilder;
use super::types::{NewWishlistRecord, Product, WishlistRecord, collections};
use super::{BackendError, Identity, ListQuery, MembershipBackend, RecordClient};
use crate::backend::client::MAX_PER_PAGE;

/// Wishlist backend: one `wishlists` record per (user, product) pair.
#[derive(Clone)]
pub struct WishlistBackend {
    client: RecordClient,
}

impl WishlistBackend {
    #[must_use]
    pub const fn new(client: RecordClient) -> Self {
        Self { client }
    }

    fn user_filter(identity: &Identity) -> FilterBuilder {
        FilterBuilder::new().eq("user", identity.user_id().as_str())
    }
}

impl MembershipBackend for WishlistBackend {
    type Key = ProductId;
    type Entity = Product;

    /// Every wishlisted product, newest first, across all result pages.
    ///
    /// Records whose product can no longer be read come back without an
    /// expansion. They are skipped with a warning, since there is no product
    /// left to show or order.
    #[instrument(skip(self))]
    async fn fetch_all(&self, identity: &Identity) -> Result<Vec<Product>, BackendError> {
        let mut products = Vec::new();
        let mut page = 1;

        loop {
            let query = ListQuery::new()
                .filter(Self::user_filter(identity).build())
                .sort("-created")
                .expand("product")
                .page(page, MAX_PER_PAGE);

            let list = self
                .client
                .list::<WishlistRecord>(collections::WISHLISTS, &query, Some(identity))
                .await?;

            for record in list.items {
                match record.expand.and_then(|e| e.product) {
                    Some(product) => products.push(product),
                    None => warn!(
                        record = %record.id,
                        product = %record.product,
                        "Wishlist record has no readable product, skipping"
                    ),
                }
            }

            if page >= list.total_pages {
                break;
            }
            page += 1;
        }

        debug!(count = products.len(), pages = page, "Fetched wishlist");
        Ok(products)
    }

    #[instrument(skip(self))]
    async fn add_membership(
        &self,
        identity: &Identity,
        key: &ProductId,
    ) -> Result<(), BackendError> {
        let body = NewWishlistRecord {
            user: identity.user_id(),
            product: key,
        };
        self.client
            .create::<WishlistRecord, _>(collections::WISHLISTS, &body, Some(identity))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_membership(
        &self,
        identity: &Identity,
        key: &ProductId,
    ) -> Result<(), BackendError> {
        let query = ListQuery::new()
            .filter(
                Self::user_filter(identity)
                    .eq("product", key.as_str())
                    .build(),
            )
            .page(1, MAX_PER_PAGE);

        let list = self
            .client
            .list::<WishlistRecord>(collections::WISHLISTS, &query, Some(identity))
            .await?;

        for record in &list.items {
            self.client
                .delete(collections::WISHLISTS, record.id.as_str(), Some(identity))
                .await?;
        }
        Ok(())
    }
}
