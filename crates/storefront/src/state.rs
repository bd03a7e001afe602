//! Application state shared across handlers.

use std::sync::Arc;

use crate::backend::{BackendError, RecordClient, WishlistBackend};
use crate::config::MercatoConfig;
use crate::middleware::RateLimiter;
use crate::services::auth::AuthService;
use crate::services::catalog::CatalogService;
use crate::services::checkout::CheckoutService;
use crate::store::StoreRegistry;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// configuration, services and per-session stores.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: MercatoConfig,
    catalog: CatalogService,
    checkout: CheckoutService,
    auth: AuthService,
    stores: StoreRegistry,
    auth_limiter: RateLimiter,
    api_limiter: RateLimiter,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend client cannot be built.
    pub fn new(config: MercatoConfig) -> Result<Self, BackendError> {
        let client = RecordClient::new(&config.backend)?;
        let limits = config.rate_limits;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                catalog: CatalogService::new(client.clone()),
                checkout: CheckoutService::new(client.clone()),
                auth: AuthService::new(client.clone()),
                stores: StoreRegistry::new(
                    WishlistBackend::new(client.clone()),
                    config.session_idle,
                ),
                auth_limiter: RateLimiter::new("auth", limits.auth, limits.window),
                api_limiter: RateLimiter::new("api", limits.api, limits.window),
                config,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &MercatoConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    #[must_use]
    pub fn checkout(&self) -> &CheckoutService {
        &self.inner.checkout
    }

    #[must_use]
    pub fn auth(&self) -> &AuthService {
        &self.inner.auth
    }

    /// Per-session store bundles.
    #[must_use]
    pub fn stores(&self) -> &StoreRegistry {
        &self.inner.stores
    }

    #[must_use]
    pub fn auth_limiter(&self) -> &RateLimiter {
        &self.inner.auth_limiter
    }

    #[must_use]
    pub fn api_limiter(&self) -> &RateLimiter {
        &self.inner.api_limiter
    }
}
