//! Product route handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use tracing::instrument;

use mercato_core::ProductId;

use crate::backend::{ListResult, Product};
use crate::error::{AppError, Result};
use crate::services::catalog::ProductQuery;
use crate::state::AppState;

/// Parse a product ID from a path segment.
pub(crate) fn parse_product_id(raw: &str) -> Result<ProductId> {
    ProductId::parse(raw).map_err(|e| AppError::BadRequest(format!("Invalid product id: {e}")))
}

/// Product listing with search, filters, sort and paging.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ListResult<Product>>> {
    Ok(Json(state.catalog().list_products(&query).await?))
}

/// Product detail.
#[instrument(skip(state))]
pub async fn show(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Product>> {
    let id = parse_product_id(&id)?;
    Ok(Json(state.catalog().get_product(&id).await?))
}
