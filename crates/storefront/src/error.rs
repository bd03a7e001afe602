//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server-side errors to
//! Sentry before responding to the client with a JSON `{"error": ...}` body.
//! All route handlers return `Result<T, AppError>`.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::backend::BackendError;
use crate::services::auth::AuthError;
use crate::services::checkout::CheckoutError;
use crate::store::SyncError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Record backend request failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Wishlist synchronization failed (already rolled back).
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Checkout failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Session store failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request refused (e.g. CSRF failure).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limited; retry after the given number of seconds.
    #[error("Rate limited")]
    RateLimited(u64),
}

fn backend_status(err: &BackendError) -> StatusCode {
    match err {
        BackendError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        BackendError::NotFound(_) => StatusCode::NOT_FOUND,
        BackendError::Api { status, .. } if (400..500).contains(status) => StatusCode::BAD_REQUEST,
        BackendError::RateLimited(_) => StatusCode::SERVICE_UNAVAILABLE,
        BackendError::Http(_)
        | BackendError::Api { .. }
        | BackendError::Parse(_)
        | BackendError::Config(_) => StatusCode::BAD_GATEWAY,
    }
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Backend(err) => backend_status(err),
            Self::Sync(SyncError::NotAuthenticated(_)) => StatusCode::UNAUTHORIZED,
            Self::Sync(SyncError::Remote { source, .. }) => backend_status(source),
            Self::Checkout(err) => match err {
                CheckoutError::NotAuthenticated => StatusCode::UNAUTHORIZED,
                CheckoutError::EmptyCart => StatusCode::BAD_REQUEST,
                CheckoutError::InvalidShipping(_) => StatusCode::UNPROCESSABLE_ENTITY,
                CheckoutError::Backend(err) => backend_status(err),
            },
            Self::Auth(err) => match err {
                AuthError::InvalidEmail(_) => StatusCode::BAD_REQUEST,
                AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                AuthError::InvalidRecord(_) => StatusCode::BAD_GATEWAY,
                AuthError::Backend(err) => backend_status(err),
            },
            Self::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Message safe to show to the client.
    #[must_use]
    pub fn client_message(&self) -> String {
        // Don't expose internal error details to clients
        match self {
            Self::Backend(err) | Self::Checkout(CheckoutError::Backend(err)) => err.user_message(),
            Self::Sync(err) => err.to_string(),
            Self::Checkout(err) => err.to_string(),
            Self::Auth(err) => match err {
                AuthError::InvalidEmail(_) => "Invalid email address".to_string(),
                AuthError::InvalidCredentials => "Invalid email or password".to_string(),
                AuthError::InvalidRecord(_) => "Authentication error".to_string(),
                AuthError::Backend(err) => err.user_message(),
            },
            Self::Session(_) => "Internal server error".to_string(),
            Self::NotFound(what) => format!("Not found: {what}"),
            Self::Forbidden(msg) | Self::BadRequest(msg) => msg.clone(),
            Self::RateLimited(secs) => {
                format!("Too many requests. Please try again in {secs} seconds.")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let body = Json(json!({ "error": self.client_message() }));
        let mut response = (status, body).into_response();

        if let Self::RateLimited(secs) = self
            && let Ok(value) = HeaderValue::from_str(&secs.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }

        response
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}
