use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use super::jwt::JwtKeys;
use crate::error::AppError;
use crate::state::AppState;
use crate::users::{
    repo::UserStore,
    repo_types::{User, Visibility},
};

/// Bearer token from `Authorization`, falling back to the session cookie.
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Verifies `token` and loads its user.
///
/// Rejects tokens whose user is gone or deactivated, and tokens issued before
/// the user's last password change.
pub async fn resolve_user(users: &dyn UserStore, keys: &JwtKeys, token: &str) -> Result<User, AppError> {
    let verified = keys.verify(token).map_err(|e| {
        debug!(error = %e, "token rejected");
        AppError::unauthenticated("Invalid or expired token. Please log in again")
    })?;

    let user = users
        .find_by_id(verified.user_id, Visibility::ActiveOnly)
        .await?
        .ok_or_else(|| AppError::unauthenticated("The user belonging to this token no longer exists"))?;

    if user.changed_password_after(verified.issued_at) {
        warn!(user_id = %user.id, "token predates password change");
        return Err(AppError::unauthenticated(
            "User recently changed password. Please log in again",
        ));
    }
    Ok(user)
}

async fn authenticate_parts(headers: &HeaderMap, state: &AppState) -> Result<User, AppError> {
    let token = extract_token(headers, &state.config.cookie.name).ok_or_else(|| {
        AppError::unauthenticated("You are not logged in. Please log in to get access")
    })?;
    let keys = JwtKeys::from_ref(state);
    resolve_user(state.users.as_ref(), &keys, &token).await
}

/// The authenticated user bound to the request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl std::ops::Deref for CurrentUser {
    type Target = User;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }
        let user = authenticate_parts(&parts.headers, state).await?;
        Ok(CurrentUser(user))
    }
}

/// Resolves the session and binds `CurrentUser` into request extensions.
/// Route layers added after this one (and handlers) see the resolved user.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, AppError> {
    let user = authenticate_parts(req.headers(), &state).await?;
    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Same resolution as `CurrentUser`, but any failure means "anonymous".
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(CurrentUser(user)) = parts.extensions.get::<CurrentUser>() {
            return Ok(MaybeUser(Some(user.clone())));
        }
        match authenticate_parts(&parts.headers, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(e) => {
                debug!(error = %e, "continuing anonymously");
                Ok(MaybeUser(None))
            }
        }
    }
}
