//! Authentication route handlers.
//!
//! Login delegates password checks to the record backend and keeps the
//! returned token in the session. Signing in as a different user than the
//! one already on the session starts from fresh stores. Logout clears the
//! user and resets the session's stores.

use axum::{Json, extract::State, http::StatusCode};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::{debug, instrument, warn};

use mercato_core::UserId;

use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{RequireAuth, clear_current_user, issue_token, set_current_user};
use crate::models::{CurrentUser, keys};
use crate::state::AppState;
use crate::store::CartState;

/// Login request body.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: SecretString,
}

/// Public view of the signed-in user.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
}

impl From<&CurrentUser> for UserResponse {
    fn from(user: &CurrentUser) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.as_str().to_string(),
            name: user.name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CsrfResponse {
    pub token: String,
}

/// Issue (or re-issue) the session's CSRF token.
///
/// Also binds the session to its store bundle, so concurrent writes that
/// follow all land in the same bundle.
#[instrument(skip(state, session))]
pub async fn csrf_token(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<CsrfResponse>> {
    let token = issue_token(&session).await?;
    state.stores().for_session(&session).await?;
    Ok(Json(CsrfResponse { token }))
}

/// Sign in with email and password.
#[instrument(skip(state, session, body), fields(email = %body.email))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<LoginRequest>,
) -> Result<Json<UserResponse>> {
    let user = state.auth().login(&body.email, &body.password).await?;

    let previous = session.get::<CurrentUser>(keys::CURRENT_USER).await?;
    if previous.is_some_and(|p| p.id != user.id) {
        debug!("Different user signing in, dropping previous stores");
        state.stores().reset(&session).await?;
        session.remove::<CartState>(keys::CART).await?;
    }

    // New session ID on privilege change.
    session.cycle_id().await?;
    set_current_user(&session, &user).await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));

    let stores = state.stores().for_session(&session).await?;
    let identity = user.identity();
    if let Err(e) = stores.wishlist.initialize(Some(&identity)).await {
        // The wishlist stays uninitialized and is retried on next read.
        warn!(error = %e, "Wishlist load after login failed");
    }

    Ok(Json(UserResponse::from(&user)))
}

/// Sign out and reset the session's stores.
#[instrument(skip(state, session))]
pub async fn logout(State(state): State<AppState>, session: Session) -> Result<StatusCode> {
    state.stores().reset(&session).await?;
    session.remove::<CartState>(keys::CART).await?;
    clear_current_user(&session).await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}

/// The signed-in user, or `401`.
pub async fn me(RequireAuth(user): RequireAuth) -> Json<UserResponse> {
    Json(UserResponse::from(&user))
}
