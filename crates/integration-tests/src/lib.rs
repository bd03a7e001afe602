//! Integration test harness for Mercato.
//!
//! Each test starts two in-process servers on ephemeral ports:
//!
//! - [`FakeBackend`] - a small record backend speaking the same REST shapes
//!   as the real one (password auth, `products`, `wishlists`, `orders`)
//! - the storefront router, configured to talk to the fake backend
//!
//! [`TestApp`] wraps a cookie-enabled `reqwest` client so the session
//! cookie and CSRF token carry across requests like a browser would.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p mercato-integration-tests
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use mercato_storefront::config::{BackendConfig, LogFormat, MercatoConfig, RateLimitConfig};
use mercato_storefront::middleware::CSRF_HEADER;
use mercato_storefront::routes;
use mercato_storefront::state::AppState;

/// Email of the seeded shopper.
pub const SHOPPER_EMAIL: &str = "ada@example.com";
/// Password of the seeded shopper.
pub const SHOPPER_PASSWORD: &str = "correct horse battery staple";
/// Record ID of the seeded shopper.
pub const SHOPPER_ID: &str = "user_ada";

/// Email of a second seeded shopper.
pub const OTHER_EMAIL: &str = "bob@example.com";
/// Password of the second seeded shopper.
pub const OTHER_PASSWORD: &str = "tr0ub4dor&3";
/// Record ID of the second seeded shopper.
pub const OTHER_ID: &str = "user_bob";

// =============================================================================
// Fake Record Backend
// =============================================================================

#[derive(Debug, Clone)]
struct WishlistRow {
    id: String,
    user: String,
    product: String,
}

#[derive(Default)]
struct FakeState {
    products: Vec<Value>,
    wishlists: Mutex<Vec<WishlistRow>>,
    orders: Mutex<Vec<Value>>,
    fail_writes: AtomicBool,
    next_id: AtomicU64,
}

impl FakeState {
    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn product(&self, id: &str) -> Option<&Value> {
        self.products.iter().find(|p| p["id"] == id)
    }
}

/// In-process stand-in for the record backend.
pub struct FakeBackend {
    state: Arc<FakeState>,
    url: Url,
}

impl FakeBackend {
    /// Start the fake backend with a small seeded catalog.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn start() -> Self {
        let state = Arc::new(FakeState {
            products: seed_products(),
            ..FakeState::default()
        });

        let app = Router::new()
            .route(
                "/api/collections/users/auth-with-password",
                post(auth_with_password),
            )
            .route(
                "/api/collections/{collection}/records",
                get(list_records).post(create_record),
            )
            .route(
                "/api/collections/{collection}/records/{id}",
                get(get_record).delete(delete_record),
            )
            .with_state(Arc::clone(&state));

        let addr = spawn(app).await;
        let url = Url::parse(&format!("http://{addr}")).expect("valid backend url");
        Self { state, url }
    }

    /// Base URL of the fake backend.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Make every create and delete fail with a `500` until switched back.
    pub fn fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Product IDs the shopper has wishlisted on the backend.
    #[must_use]
    pub fn wishlist_of(&self, user: &str) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.state.wishlists)
            .iter()
            .filter(|row| row.user == user)
            .map(|row| row.product.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of order records on the backend.
    #[must_use]
    pub fn order_count(&self) -> usize {
        lock(&self.state.orders).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn seed_products() -> Vec<Value> {
    vec![
        json!({
            "id": "p_tea", "name": "Oolong Tea", "description": "Loose leaf",
            "price": "4.50", "category": "tea", "stock": 12,
            "image": "tea.jpg", "created": "2026-01-03 10:00:00.000Z"
        }),
        json!({
            "id": "p_mug", "name": "Stoneware Mug", "description": "",
            "price": "12.00", "category": "kitchen", "stock": 3,
            "image": null, "created": "2026-01-02 10:00:00.000Z"
        }),
        json!({
            "id": "p_kettle", "name": "Copper Kettle", "description": "",
            "price": "48.00", "category": "kitchen", "stock": 0,
            "image": null, "created": "2026-01-01 10:00:00.000Z"
        }),
    ]
}

fn backend_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({ "code": status.as_u16(), "message": message, "data": {} })),
    )
        .into_response()
}

fn list_envelope(items: Vec<Value>) -> Json<Value> {
    Json(json!({
        "page": 1,
        "perPage": 30,
        "totalItems": items.len(),
        "totalPages": 1,
        "items": items,
    }))
}

/// User ID behind the request's auth token.
fn authed_user(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|token| token.strip_prefix("token-"))
        .map(str::to_owned)
}

/// Value of a `field = "value"` clause in a filter expression.
fn filter_value(filter: &str, field: &str) -> Option<String> {
    let needle = format!("{field} = \"");
    let start = filter.find(&needle)? + needle.len();
    let rest = filter.get(start..)?;
    let end = rest.find('"')?;
    rest.get(..end).map(str::to_owned)
}

#[derive(Deserialize)]
struct PasswordAuth {
    identity: String,
    password: String,
}

async fn auth_with_password(Json(body): Json<PasswordAuth>) -> Response {
    let shoppers = [
        (SHOPPER_EMAIL, SHOPPER_PASSWORD, SHOPPER_ID, "Ada"),
        (OTHER_EMAIL, OTHER_PASSWORD, OTHER_ID, "Bob"),
    ];
    let Some((email, _, id, name)) = shoppers
        .into_iter()
        .find(|(email, password, _, _)| body.identity == *email && body.password == *password)
    else {
        return backend_error(StatusCode::BAD_REQUEST, "Failed to authenticate.");
    };
    Json(json!({
        "token": format!("token-{id}"),
        "record": { "id": id, "email": email, "name": name },
    }))
    .into_response()
}

async fn list_records(
    State(state): State<Arc<FakeState>>,
    Path(collection): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let filter = params.get("filter").map(String::as_str).unwrap_or_default();

    match collection.as_str() {
        "products" => {
            let category = filter_value(filter, "category");
            let items = state
                .products
                .iter()
                .filter(|p| category.as_ref().is_none_or(|c| p["category"] == c.as_str()))
                .cloned()
                .collect();
            list_envelope(items).into_response()
        }
        "wishlists" => {
            let Some(user) = authed_user(&headers) else {
                return backend_error(StatusCode::UNAUTHORIZED, "Missing auth token.");
            };
            let product = filter_value(filter, "product");
            let expand = params.get("expand").is_some_and(|e| e == "product");
            let items = lock(&state.wishlists)
                .iter()
                .rev()
                .filter(|row| row.user == user)
                .filter(|row| product.as_ref().is_none_or(|p| &row.product == p))
                .map(|row| {
                    let mut record = json!({
                        "id": row.id, "user": row.user, "product": row.product,
                    });
                    if expand && let Some(p) = state.product(&row.product) {
                        record["expand"] = json!({ "product": p });
                    }
                    record
                })
                .collect();
            list_envelope(items).into_response()
        }
        "orders" => {
            let Some(user) = authed_user(&headers) else {
                return backend_error(StatusCode::UNAUTHORIZED, "Missing auth token.");
            };
            let items = lock(&state.orders)
                .iter()
                .rev()
                .filter(|o| o["user"] == user.as_str())
                .cloned()
                .collect();
            list_envelope(items).into_response()
        }
        _ => backend_error(StatusCode::NOT_FOUND, "Missing collection context."),
    }
}

async fn get_record(
    State(state): State<Arc<FakeState>>,
    Path((collection, id)): Path<(String, String)>,
) -> Response {
    match (collection.as_str(), state.product(&id)) {
        ("products", Some(product)) => Json(product.clone()).into_response(),
        _ => backend_error(
            StatusCode::NOT_FOUND,
            "The requested resource wasn't found.",
        ),
    }
}

async fn create_record(
    State(state): State<Arc<FakeState>>,
    Path(collection): Path<String>,
    headers: HeaderMap,
    Json(mut body): Json<Value>,
) -> Response {
    let Some(user) = authed_user(&headers) else {
        return backend_error(StatusCode::UNAUTHORIZED, "Missing auth token.");
    };
    if state.fail_writes.load(Ordering::SeqCst) {
        return backend_error(StatusCode::INTERNAL_SERVER_ERROR, "");
    }

    match collection.as_str() {
        "wishlists" => {
            let row = WishlistRow {
                id: state.next_id("wl"),
                user,
                product: body["product"].as_str().unwrap_or_default().to_owned(),
            };
            let record = json!({ "id": row.id, "user": row.user, "product": row.product });
            lock(&state.wishlists).push(row);
            Json(record).into_response()
        }
        "orders" => {
            let mut orders = lock(&state.orders);
            body["id"] = json!(state.next_id("order"));
            body["created"] = json!(format!("2026-02-{:02} 09:00:00.000Z", orders.len() + 1));
            orders.push(body.clone());
            Json(body).into_response()
        }
        _ => backend_error(StatusCode::BAD_REQUEST, "Failed to create record."),
    }
}

async fn delete_record(
    State(state): State<Arc<FakeState>>,
    Path((collection, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if authed_user(&headers).is_none() {
        return backend_error(StatusCode::UNAUTHORIZED, "Missing auth token.");
    }
    if state.fail_writes.load(Ordering::SeqCst) {
        return backend_error(StatusCode::INTERNAL_SERVER_ERROR, "");
    }
    if collection != "wishlists" {
        return backend_error(StatusCode::BAD_REQUEST, "Failed to delete record.");
    }

    let mut rows = lock(&state.wishlists);
    let before = rows.len();
    rows.retain(|row| row.id != id);
    if rows.len() == before {
        return backend_error(
            StatusCode::NOT_FOUND,
            "The requested resource wasn't found.",
        );
    }
    StatusCode::NO_CONTENT.into_response()
}

// =============================================================================
// Storefront Under Test
// =============================================================================

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("listener has an address");
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("test server failed");
    });
    addr
}

/// Storefront configuration pointing at `backend`.
#[must_use]
pub fn test_config(backend: &Url, rate_limits: RateLimitConfig) -> MercatoConfig {
    MercatoConfig {
        host: [127, 0, 0, 1].into(),
        port: 0,
        base_url: Url::parse("http://localhost:3000").expect("valid base url"),
        backend: BackendConfig {
            url: backend.clone(),
            timeout: Duration::from_secs(5),
        },
        rate_limits,
        session_idle: Duration::from_secs(3600),
        log_format: LogFormat::Text,
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// A running storefront plus a browser-like client for it.
pub struct TestApp {
    pub backend: FakeBackend,
    pub client: Client,
    base_url: String,
    csrf: Option<String>,
}

impl TestApp {
    /// Start a fake backend and a storefront with generous rate limits.
    pub async fn start() -> Self {
        Self::with_rate_limits(RateLimitConfig {
            auth: 1_000,
            api: 10_000,
            window: Duration::from_secs(60),
        })
        .await
    }

    /// Start with explicit rate limits.
    ///
    /// # Panics
    ///
    /// Panics if either server cannot start.
    pub async fn with_rate_limits(rate_limits: RateLimitConfig) -> Self {
        let backend = FakeBackend::start().await;
        let state = AppState::new(test_config(backend.url(), rate_limits))
            .expect("Failed to build storefront state");
        let addr = spawn(routes::router(state)).await;

        let client = Client::builder()
            .cookie_store(true)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            backend,
            client,
            base_url: format!("http://{addr}"),
            csrf: None,
        }
    }

    /// Absolute URL for a storefront path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Fetch and remember the session's CSRF token.
    ///
    /// # Panics
    ///
    /// Panics if the token endpoint fails.
    pub async fn fetch_csrf(&mut self) -> String {
        let body: Value = self
            .client
            .get(self.url("/api/csrf"))
            .send()
            .await
            .expect("csrf request failed")
            .json()
            .await
            .expect("csrf body is json");
        let token = body["token"].as_str().expect("token present").to_owned();
        self.csrf = Some(token.clone());
        token
    }

    /// `GET` a path.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be sent.
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET failed")
    }

    /// Send a state-changing request carrying the CSRF token.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be sent.
    pub async fn send(
        &mut self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> reqwest::Response {
        let token = match &self.csrf {
            Some(token) => token.clone(),
            None => self.fetch_csrf().await,
        };
        let mut request = self
            .client
            .request(method, self.url(path))
            .header(CSRF_HEADER, token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        request.send().await.expect("request failed")
    }

    /// `POST` with an optional JSON body.
    pub async fn post(&mut self, path: &str, body: Option<Value>) -> reqwest::Response {
        self.send(reqwest::Method::POST, path, body).await
    }

    /// Sign in as the seeded shopper.
    ///
    /// # Panics
    ///
    /// Panics if sign-in does not succeed.
    pub async fn login(&mut self) {
        self.login_as(SHOPPER_EMAIL, SHOPPER_PASSWORD).await;
    }

    /// Sign in as a specific seeded shopper.
    ///
    /// # Panics
    ///
    /// Panics if the login is not accepted.
    pub async fn login_as(&mut self, email: &str, password: &str) {
        let response = self
            .post(
                "/api/auth/login",
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
