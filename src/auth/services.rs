use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};

use super::{dto::UserData, jwt::JwtKeys, password::PasswordHasher};
use crate::config::CookieConfig;
use crate::error::{AppError, AppResult};
use crate::response::Envelope;
use crate::users::{
    pipeline,
    repo::UserStore,
    repo_types::{User, Visibility},
};

/// Checks an email/password pair against active users.
///
/// Unknown email and wrong password both yield `InvalidCredentials`.
pub async fn authenticate(
    users: &dyn UserStore,
    hasher: &PasswordHasher,
    email: &str,
    password: &str,
) -> AppResult<User> {
    let email = pipeline::normalize_email(email);
    let Some(user) = users.find_by_email(&email, Visibility::ActiveOnly).await? else {
        warn!(email = %email, "login unknown email");
        return Err(AppError::InvalidCredentials);
    };

    if !hasher.verify(password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }
    Ok(user)
}

pub fn session_cookie(cfg: &CookieConfig, token: &str) -> String {
    let max_age = cfg.ttl_days.max(0) * 24 * 60 * 60;
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        cfg.name, token, max_age
    );
    if cfg.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn cleared_cookie(cfg: &CookieConfig) -> String {
    let mut cookie = format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", cfg.name);
    if cfg.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Signs a token for `user`, sets it as the session cookie and returns it in
/// the body alongside the user.
pub fn send_token(keys: &JwtKeys, cookie: &CookieConfig, user: User, status: StatusCode) -> AppResult<Response> {
    let token = keys.sign(user.id)?;
    info!(user_id = %user.id, "session issued");
    Ok((
        status,
        [(header::SET_COOKIE, session_cookie(cookie, &token))],
        Json(Envelope::with_token(token, UserData { user })),
    )
        .into_response())
}
