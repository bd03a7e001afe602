//! Per-session store bundles.
//!
//! Each browser session owns one wishlist sync and one cart store. The
//! bundle lives in memory, keyed by a random ID kept in the session, and is
//! evicted after the session has been idle for the configured period. The
//! cart is rebuilt from its session mirror when a bundle is recreated.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tower_sessions::Session;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::backend::WishlistBackend;
use crate::models::session::keys;

use super::cart::CartStore;
use super::sync::MembershipSync;

/// Upper bound on live session bundles.
const MAX_SESSIONS: u64 = 10_000;

/// Stores owned by one session.
pub struct SessionStores {
    pub wishlist: MembershipSync<WishlistBackend>,
    pub cart: CartStore,
}

impl SessionStores {
    #[must_use]
    pub fn new(wishlist: Arc<WishlistBackend>) -> Self {
        Self {
            wishlist: MembershipSync::new("wishlist", wishlist),
            cart: CartStore::new(),
        }
    }

    /// Return both stores to their initial empty state.
    pub fn reset(&self) {
        self.wishlist.reset();
        self.cart.reset();
    }
}

/// Registry of session store bundles.
#[derive(Clone)]
pub struct StoreRegistry {
    wishlist: Arc<WishlistBackend>,
    stores: Cache<Uuid, Arc<SessionStores>>,
}

impl StoreRegistry {
    #[must_use]
    pub fn new(wishlist: WishlistBackend, idle: Duration) -> Self {
        Self {
            wishlist: Arc::new(wishlist),
            stores: Cache::builder()
                .max_capacity(MAX_SESSIONS)
                .time_to_idle(idle)
                .build(),
        }
    }

    /// The store bundle for `session`, created on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be read or written.
    #[instrument(skip_all)]
    pub async fn for_session(
        &self,
        session: &Session,
    ) -> Result<Arc<SessionStores>, tower_sessions::session::Error> {
        let key = match session.get::<Uuid>(keys::STORE_KEY).await? {
            Some(key) => key,
            None => {
                let key = Uuid::new_v4();
                session.insert(keys::STORE_KEY, key).await?;
                debug!(%key, "Assigned session store key");
                key
            }
        };

        let wishlist = Arc::clone(&self.wishlist);
        Ok(self
            .stores
            .get_with(key, async move { Arc::new(SessionStores::new(wishlist)) })
            .await)
    }

    /// Reset and forget the bundle for `session` (sign-out), and give the
    /// session a fresh key so its next requests share one new bundle.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be read or written.
    #[instrument(skip_all)]
    pub async fn reset(&self, session: &Session) -> Result<(), tower_sessions::session::Error> {
        if let Some(key) = session.remove::<Uuid>(keys::STORE_KEY).await? {
            if let Some(stores) = self.stores.get(&key).await {
                stores.reset();
            }
            self.stores.invalidate(&key).await;
            debug!(%key, "Session stores reset");
        }
        session.insert(keys::STORE_KEY, Uuid::new_v4()).await
    }

    /// Number of live bundles.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.stores.entry_count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
