//! CSRF protection for state-changing API requests.
//!
//! Each session gets a random 256-bit token (URL-safe base64), fetched from
//! `GET /api/csrf`. `POST`, `PUT`, `PATCH` and `DELETE` requests must echo
//! it in the `x-csrf-token` header.

use axum::{
    extract::Request,
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use tower_sessions::Session;
use tracing::warn;

use crate::error::AppError;
use crate::models::keys;

/// Header carrying the CSRF token.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Generate a new random token.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// The session's CSRF token, created on first request.
///
/// # Errors
///
/// Returns an error if the session cannot be read or written.
pub async fn issue_token(session: &Session) -> Result<String, tower_sessions::session::Error> {
    if let Some(token) = session.get::<String>(keys::CSRF_TOKEN).await? {
        return Ok(token);
    }
    let token = generate_token();
    session.insert(keys::CSRF_TOKEN, &token).await?;
    Ok(token)
}

fn is_state_changing(method: &Method) -> bool {
    [Method::POST, Method::PUT, Method::PATCH, Method::DELETE].contains(method)
}

/// Middleware rejecting state-changing requests without a matching token.
///
/// Must run inside the session layer.
pub async fn csrf_middleware(request: Request, next: Next) -> Response {
    if !is_state_changing(request.method()) {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let expected = match request.extensions().get::<Session>() {
        Some(session) => match session.get::<String>(keys::CSRF_TOKEN).await {
            Ok(token) => token,
            Err(e) => return AppError::Session(e).into_response(),
        },
        None => None,
    };

    match (provided, expected) {
        (Some(provided), Some(expected)) if constant_time_compare(&provided, &expected) => {
            next.run(request).await
        }
        _ => {
            warn!(path = %request.uri().path(), "CSRF token missing or mismatched");
            AppError::Forbidden("Invalid or missing CSRF token".to_string()).into_response()
        }
    }
}

/// Compare two strings without short-circuiting on the first difference.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}
