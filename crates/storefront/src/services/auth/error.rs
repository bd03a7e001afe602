//! Authentication error types.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] mercato_core::EmailError),

    /// Invalid credentials (wrong password or unknown user).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The backend returned a user record we cannot use.
    #[error("invalid user record: {0}")]
    InvalidRecord(String),

    /// Backend request failed.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}
