//! Authentication service.
//!
//! Passwords are verified by the record backend; Mercato only keeps the
//! token it hands back.

mod error;

pub use error::AuthError;

use secrecy::{ExposeSecret, SecretString};
use tracing::{info, instrument};

use mercato_core::Email;

use crate::backend::{BackendError, RecordClient};
use crate::models::CurrentUser;

/// Authentication service.
#[derive(Clone)]
pub struct AuthService {
    client: RecordClient,
}

impl AuthService {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(client: RecordClient) -> Self {
        Self { client }
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::InvalidCredentials` if the backend rejects the
    /// email/password pair.
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<CurrentUser, AuthError> {
        let email = Email::parse(email)?;
        if password.expose_secret().is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let auth = self
            .client
            .auth_with_password(email.as_str(), password)
            .await
            .map_err(|e| match e {
                BackendError::Api { status: 400, .. }
                | BackendError::Unauthorized(_)
                | BackendError::NotFound(_) => AuthError::InvalidCredentials,
                other => AuthError::Backend(other),
            })?;

        // Prefer the backend's canonical email, falling back to what was typed.
        let email = Email::parse(&auth.record.email).unwrap_or(email);
        if auth.token.is_empty() {
            return Err(AuthError::InvalidRecord("empty auth token".to_string()));
        }

        info!(user_id = %auth.record.id, "User logged in");
        Ok(CurrentUser {
            id: auth.record.id,
            email,
            name: auth.record.name.filter(|n| !n.trim().is_empty()),
            token: auth.token,
        })
    }
}
