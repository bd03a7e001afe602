//! Cart route handlers.
//!
//! The cart is session-scoped and open to guests. Every change is mirrored
//! into the session so a cart outlives its in-memory store.

use axum::{
    Json,
    extract::{Path, State},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use mercato_core::ProductId;

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::store::{CartLine, CartState};

use super::products::parse_product_id;

/// Cart as returned to the client.
#[derive(Debug, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    pub item_count: u32,
    pub subtotal: Decimal,
}

#[derive(Debug, Serialize)]
pub struct CartLineView {
    #[serde(flatten)]
    pub line: CartLine,
    pub line_total: Decimal,
}

impl From<&CartState> for CartView {
    fn from(state: &CartState) -> Self {
        Self {
            lines: state
                .lines
                .iter()
                .map(|line| CartLineView {
                    line_total: line.line_total(),
                    line: line.clone(),
                })
                .collect(),
            item_count: state.item_count(),
            subtotal: state.subtotal(),
        }
    }
}

const fn default_quantity() -> u32 {
    1
}

/// Add-to-cart request body.
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

/// Quantity update request body.
#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: u32,
}

/// Current cart.
#[instrument(skip(state, session))]
pub async fn show(State(state): State<AppState>, session: Session) -> Result<Json<CartView>> {
    let stores = state.stores().for_session(&session).await?;
    let cart = stores.cart.hydrate(&session).await;
    Ok(Json(CartView::from(&*cart)))
}

/// Add a product, merging with an existing line.
///
/// Name, price and image come from the catalog, not the client.
#[instrument(skip(state, session))]
pub async fn add_item(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<AddItemRequest>,
) -> Result<Json<CartView>> {
    if body.quantity == 0 {
        return Err(AppError::BadRequest(
            "Quantity must be at least 1".to_string(),
        ));
    }

    let product = state.catalog().get_product(&body.product_id).await?;
    if !product.in_stock() {
        return Err(AppError::BadRequest(format!(
            "{} is out of stock",
            product.name
        )));
    }

    let stores = state.stores().for_session(&session).await?;
    stores.cart.hydrate(&session).await;
    let cart = stores
        .cart
        .add_item(
            &session,
            CartLine {
                product_id: product.id,
                name: product.name,
                unit_price: product.price,
                quantity: body.quantity,
                image: product.image,
            },
        )
        .await;
    Ok(Json(CartView::from(&*cart)))
}

/// Set a line's quantity; zero removes the line.
#[instrument(skip(state, session))]
pub async fn update_item(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(body): Json<UpdateQuantityRequest>,
) -> Result<Json<CartView>> {
    let id = parse_product_id(&id)?;
    let stores = state.stores().for_session(&session).await?;
    let current = stores.cart.hydrate(&session).await;
    if current.line(&id).is_none() {
        return Err(AppError::NotFound(format!("cart item {id}")));
    }

    let cart = stores
        .cart
        .set_quantity(&session, &id, body.quantity)
        .await;
    Ok(Json(CartView::from(&*cart)))
}

/// Remove a line.
#[instrument(skip(state, session))]
pub async fn remove_item(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<CartView>> {
    let id = parse_product_id(&id)?;
    let stores = state.stores().for_session(&session).await?;
    stores.cart.hydrate(&session).await;
    let cart = stores.cart.remove_item(&session, &id).await;
    Ok(Json(CartView::from(&*cart)))
}

/// Empty the cart.
#[instrument(skip(state, session))]
pub async fn clear(State(state): State<AppState>, session: Session) -> Result<Json<CartView>> {
    let stores = state.stores().for_session(&session).await?;
    let cart = stores.cart.clear(&session).await;
    Ok(Json(CartView::from(&*cart)))
}
