//! Session middleware configuration.
//!
//! Sessions live in memory (tower-sessions `MemoryStore`); the record
//! backend holds all durable data. The session also serves as the cart's
//! durable mirror.

use tower_sessions::{Expiry, MemoryStore, Session, SessionManagerLayer};

use crate::config::MercatoConfig;
use crate::models::keys;
use crate::store::{CartMirror, CartState, MirrorError};

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "mercato_session";

/// Create the session layer with an in-memory store.
#[must_use]
pub fn create_session_layer(config: &MercatoConfig) -> SessionManagerLayer<MemoryStore> {
    let idle_secs = i64::try_from(config.session_idle.as_secs()).unwrap_or(i64::MAX);

    SessionManagerLayer::new(MemoryStore::default())
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(idle_secs),
        ))
        .with_secure(config.is_secure())
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}

impl CartMirror for Session {
    async fn load(&self) -> Result<Option<CartState>, MirrorError> {
        self.get::<CartState>(keys::CART)
            .await
            .map_err(|e| MirrorError(e.to_string()))
    }

    async fn save(&self, state: &CartState) -> Result<(), MirrorError> {
        self.insert(keys::CART, state)
            .await
            .map_err(|e| MirrorError(e.to_string()))
    }
}
