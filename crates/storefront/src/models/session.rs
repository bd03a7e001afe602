//! Session-related types.
//!
//! Types stored in the session for authentication state.

use serde::{Deserialize, Serialize};

use mercato_core::{Email, UserId};

use crate::backend::Identity;

/// Session-stored user identity.
///
/// Carries the backend auth token so requests can act as the user. The
/// token is redacted from `Debug` output.
#[derive(Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's backend record ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// Display name, if the user set one.
    #[serde(default)]
    pub name: Option<String>,
    /// Backend auth token.
    pub token: String,
}

impl CurrentUser {
    /// Backend identity for this user.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity::new(self.id.clone(), self.token.clone())
    }
}

impl std::fmt::Debug for CurrentUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurrentUser")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("name", &self.name)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Session keys.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the per-session CSRF token.
    pub const CSRF_TOKEN: &str = "csrf_token";

    /// Key for the mirrored cart.
    pub const CART: &str = "cart";

    /// Key for the ID of this session's in-memory store bundle.
    pub const STORE_KEY: &str = "store_key";
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn user() -> CurrentUser {
        CurrentUser {
            id: UserId::parse("u1").unwrap(),
            email: Email::parse("a@example.com").unwrap(),
            name: None,
            token: "tok_secret".to_string(),
        }
    }

    #[test]
    fn test_identity_carries_token() {
        let identity = user().identity();
        assert_eq!(identity.user_id().as_str(), "u1");
        assert_eq!(identity.token().expose_secret(), "tok_secret");
    }

    #[test]
    fn test_debug_redacts_token() {
        let debug = format!("{:?}", user());
        assert!(!debug.contains("tok_secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_session_roundtrip_shape() {
        let json = serde_json::to_value(user()).unwrap();
        assert_eq!(json["id"], "u1");
        assert_eq!(json["email"], "a@example.com");
        let back: CurrentUser = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, user().id);
    }
}
