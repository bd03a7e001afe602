//! Wishlist route handlers.
//!
//! Thin wrappers over the session's optimistic wishlist sync. The sync
//! reports a missing sign-in itself, so handlers pass the identity through
//! as an `Option`.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use tower_sessions::Session;
use tracing::instrument;

use mercato_core::ProductId;

use crate::backend::{Identity, Product, WishlistBackend};
use crate::error::Result;
use crate::middleware::OptionalAuth;
use crate::state::AppState;
use crate::store::{Lifecycle, SessionStores, StateOf, SyncOutcome};

use super::products::parse_product_id;

/// Wishlist as returned to the client.
#[derive(Debug, Serialize)]
pub struct WishlistView {
    pub status: Lifecycle,
    pub count: usize,
    /// Member product IDs, sorted.
    pub product_ids: Vec<ProductId>,
    /// Cached products, most recently added last.
    pub items: Vec<Product>,
    pub error: Option<String>,
}

impl From<&StateOf<WishlistBackend>> for WishlistView {
    fn from(state: &StateOf<WishlistBackend>) -> Self {
        let mut product_ids: Vec<ProductId> = state.ids.iter().cloned().collect();
        product_ids.sort();
        Self {
            status: state.lifecycle(),
            count: state.len(),
            product_ids,
            items: state.entities.to_vec(),
            error: state.error.as_deref().map(str::to_owned),
        }
    }
}

/// Result of a wishlist mutation.
#[derive(Debug, Serialize)]
pub struct WishlistChange {
    pub outcome: SyncOutcome,
    pub wishlist: WishlistView,
}

impl WishlistChange {
    fn new(outcome: SyncOutcome, stores: &SessionStores) -> Self {
        Self {
            outcome,
            wishlist: WishlistView::from(&*stores.wishlist.state()),
        }
    }
}

/// Load the wishlist for a signed-in user before mutating it.
async fn ready_stores(
    state: &AppState,
    session: &Session,
    identity: Option<&Identity>,
) -> Result<Arc<SessionStores>> {
    let stores = state.stores().for_session(session).await?;
    stores.wishlist.initialize(identity).await?;
    Ok(stores)
}

/// Current wishlist (empty for guests).
#[instrument(skip(state, session, user))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<WishlistView>> {
    let identity = user.map(|u| u.identity());
    let stores = ready_stores(&state, &session, identity.as_ref()).await?;
    Ok(Json(WishlistView::from(&*stores.wishlist.state())))
}

/// Add a product.
#[instrument(skip(state, session, user))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Path(id): Path<String>,
) -> Result<Json<WishlistChange>> {
    let id = parse_product_id(&id)?;
    let identity = user.map(|u| u.identity());
    let stores = ready_stores(&state, &session, identity.as_ref()).await?;

    let outcome = match identity.as_ref() {
        Some(identity) => {
            let product = state.catalog().get_product(&id).await?;
            stores.wishlist.add_entity(Some(identity), product).await?
        }
        None => stores.wishlist.add(None, &id).await?,
    };
    Ok(Json(WishlistChange::new(outcome, &stores)))
}

/// Remove a product.
#[instrument(skip(state, session, user))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Path(id): Path<String>,
) -> Result<Json<WishlistChange>> {
    let id = parse_product_id(&id)?;
    let identity = user.map(|u| u.identity());
    let stores = ready_stores(&state, &session, identity.as_ref()).await?;

    let outcome = stores.wishlist.remove(identity.as_ref(), &id).await?;
    Ok(Json(WishlistChange::new(outcome, &stores)))
}

/// Add the product if absent, remove it if present.
#[instrument(skip(state, session, user))]
pub async fn toggle(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Path(id): Path<String>,
) -> Result<Json<WishlistChange>> {
    let id = parse_product_id(&id)?;
    let identity = user.map(|u| u.identity());
    let stores = ready_stores(&state, &session, identity.as_ref()).await?;

    let outcome = match identity.as_ref() {
        // Removal needs no product lookup.
        Some(identity) if stores.wishlist.contains(&id) => {
            stores.wishlist.toggle(Some(identity), &id).await?
        }
        Some(identity) => {
            let product = state.catalog().get_product(&id).await?;
            stores.wishlist.toggle_entity(Some(identity), product).await?
        }
        None => stores.wishlist.toggle(None, &id).await?,
    };
    Ok(Json(WishlistChange::new(outcome, &stores)))
}
