//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                   - Health check
//! GET    /api/csrf                 - CSRF token for this session
//!
//! # Auth (auth rate limit)
//! POST   /api/auth/login           - Sign in with email and password
//! POST   /api/auth/logout          - Sign out, reset session stores
//! GET    /api/auth/me              - Signed-in user
//!
//! # Catalog
//! GET    /api/products             - Product listing (search, filter, sort, page)
//! GET    /api/products/{id}        - Product detail
//!
//! # Wishlist
//! GET    /api/wishlist             - Current wishlist
//! POST   /api/wishlist/{id}        - Add product
//! DELETE /api/wishlist/{id}        - Remove product
//! POST   /api/wishlist/{id}/toggle - Toggle product
//!
//! # Cart
//! GET    /api/cart                 - Current cart
//! POST   /api/cart/items           - Add item
//! PATCH  /api/cart/items/{id}      - Set quantity (0 removes)
//! DELETE /api/cart/items/{id}      - Remove item
//! DELETE /api/cart                 - Empty cart
//!
//! # Checkout
//! POST   /api/checkout             - Place order
//! GET    /api/orders               - Order history
//! ```

pub mod auth;
pub mod cart;
pub mod checkout;
pub mod products;
pub mod wishlist;

use std::time::Duration;

use axum::{
    Router,
    extract::Request,
    middleware::{from_fn, from_fn_with_state},
    response::Response,
    routing::{get, patch, post},
};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::middleware::{
    create_session_layer, csrf_middleware, rate_limit, request_id_middleware,
};
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{id}", get(products::show))
}

/// Create the wishlist routes router.
pub fn wishlist_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(wishlist::show))
        .route("/{id}", post(wishlist::add).delete(wishlist::remove))
        .route("/{id}/toggle", post(wishlist::toggle))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route("/items", post(cart::add_item))
        .route(
            "/items/{id}",
            patch(cart::update_item).delete(cart::remove_item),
        )
}

/// Everything under `/api` except auth.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/csrf", get(auth::csrf_token))
        .nest("/products", product_routes())
        .nest("/wishlist", wishlist_routes())
        .nest("/cart", cart_routes())
        .route("/checkout", post(checkout::place_order))
        .route("/orders", get(checkout::orders))
}

/// Build the full application router with its middleware stack.
pub fn router(state: AppState) -> Router {
    let auth = auth_routes().route_layer(from_fn_with_state(
        state.auth_limiter().clone(),
        rate_limit,
    ));
    // Auth is nested after the api limiter so it only counts against its own.
    let api = api_routes()
        .route_layer(from_fn_with_state(
            state.api_limiter().clone(),
            rate_limit,
        ))
        .nest("/auth", auth);

    let trace = TraceLayer::new_for_http()
        .make_span_with(|request: &Request| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = tracing::field::Empty,
                status = tracing::field::Empty,
                latency_ms = tracing::field::Empty,
            )
        })
        .on_response(|response: &Response, latency: Duration, span: &Span| {
            span.record("status", response.status().as_u16());
            span.record(
                "latency_ms",
                u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            );
            DefaultOnResponse::default().on_response(response, latency, span);
        });

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(from_fn(csrf_middleware))
        .layer(create_session_layer(state.config()))
        .layer(from_fn(request_id_middleware))
        .layer(trace)
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check the backend.
async fn health() -> &'static str {
    "ok"
}
