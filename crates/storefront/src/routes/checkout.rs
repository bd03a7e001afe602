//! Checkout and order history handlers.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::backend::{OrderRecord, ShippingAddress};
use crate::error::Result;
use crate::middleware::OptionalAuth;
use crate::state::AppState;

/// Checkout request body.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub shipping: ShippingAddress,
}

/// Place an order for the session's cart.
#[instrument(skip(state, session, user, body))]
pub async fn place_order(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Json(body): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<OrderRecord>)> {
    let identity = user.map(|u| u.identity());
    let stores = state.stores().for_session(&session).await?;
    let order = state
        .checkout()
        .place_order(identity.as_ref(), &stores.cart, &session, &body.shipping)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// The signed-in user's orders, newest first.
#[instrument(skip(state, user))]
pub async fn orders(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<Vec<OrderRecord>>> {
    let identity = user.map(|u| u.identity());
    Ok(Json(state.checkout().list_orders(identity.as_ref()).await?))
}
