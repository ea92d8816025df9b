use axum::{
    extract::{FromRef, Path, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            ForgotPasswordRequest, LoginRequest, ResetPasswordRequest, SessionData, SignupRequest,
            UpdatePasswordRequest,
        },
        jwt::JwtKeys,
        password::PasswordHasher,
        reset::{self, NewPassword},
        services::{authenticate, cleared_cookie, send_token},
        session::{require_auth, CurrentUser, MaybeUser},
    },
    error::{AppError, AppResult},
    response::Envelope,
    state::AppState,
    users::{
        pipeline::{self, SignupInput},
        repo_types::Visibility,
    },
};

pub fn auth_routes(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
        .route("/users/logout", get(logout))
        .route("/users/forgotPassword", post(forgot_password))
        .route("/users/resetPassword/:token", patch(reset_password))
        .route("/users/session", get(session));

    let protected = Router::new()
        .route("/users/updateMyPassword", patch(update_password))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    public.merge(protected)
}

#[instrument(skip(state, payload))]
pub async fn signup(State(state): State<AppState>, Json(payload): Json<SignupRequest>) -> AppResult<Response> {
    let hasher = PasswordHasher::from_ref(&state);
    let new_user = pipeline::prepare_new_user(
        SignupInput {
            name: &payload.name,
            email: &payload.email,
            password: &payload.password,
            password_confirm: &payload.password_confirm,
        },
        &hasher,
        state.config.password.min_length,
    )?;

    let user = state.users.insert(new_user).await?;
    info!(user_id = %user.id, email = %user.email, "user registered");

    let url = format!("{}/me", state.config.public_base_url);
    if let Err(e) = state.mailer.send_welcome(&user, &url).await {
        warn!(error = %format!("{e:#}"), user_id = %user.id, "welcome email failed");
    }

    send_token(&JwtKeys::from_ref(&state), &state.config.cookie, user, StatusCode::CREATED)
}

#[instrument(skip(state, payload))]
pub async fn login(State(state): State<AppState>, Json(payload): Json<LoginRequest>) -> AppResult<Response> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::validation("Please provide email and password"));
    }

    let hasher = PasswordHasher::from_ref(&state);
    let user = authenticate(state.users.as_ref(), &hasher, &payload.email, &payload.password).await?;

    info!(user_id = %user.id, "user logged in");
    send_token(&JwtKeys::from_ref(&state), &state.config.cookie, user, StatusCode::OK)
}

pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::SET_COOKIE, cleared_cookie(&state.config.cookie))],
        Json(Envelope::empty()),
    )
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> AppResult<Json<Envelope<()>>> {
    if payload.email.trim().is_empty() {
        return Err(AppError::validation("Please provide your email"));
    }

    let result = reset::request_reset(
        state.users.as_ref(),
        state.mailer.as_ref(),
        &payload.email,
        &state.config.public_base_url,
        OffsetDateTime::now_utc(),
    )
    .await;

    match result {
        Ok(()) => {}
        Err(AppError::NotFound(_)) if state.config.mask_unknown_reset_email => {
            info!("password reset requested for unknown email");
        }
        Err(e) => return Err(e),
    }
    Ok(Json(Envelope::message("Token sent by email!")))
}

#[instrument(skip(state, token, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> AppResult<Response> {
    let hasher = PasswordHasher::from_ref(&state);
    let user = reset::consume_reset(
        state.users.as_ref(),
        &hasher,
        &token,
        NewPassword {
            password: &payload.password,
            password_confirm: &payload.password_confirm,
        },
        state.config.password.min_length,
        OffsetDateTime::now_utc(),
    )
    .await?;

    send_token(&JwtKeys::from_ref(&state), &state.config.cookie, user, StatusCode::OK)
}

#[instrument(skip(state, current, payload), fields(user_id = %current.id))]
pub async fn update_password(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<UpdatePasswordRequest>,
) -> AppResult<Response> {
    let hasher = PasswordHasher::from_ref(&state);
    let mut user = state
        .users
        .find_by_id(current.id, Visibility::ActiveOnly)
        .await?
        .ok_or_else(|| AppError::unauthenticated("The user belonging to this token no longer exists"))?;

    if !hasher.verify(&payload.password_current, &user.password_hash)? {
        warn!("update password with wrong current password");
        return Err(AppError::unauthenticated("Your current password is wrong"));
    }

    pipeline::set_password(
        &mut user,
        &hasher,
        &payload.password,
        &payload.password_confirm,
        state.config.password.min_length,
        OffsetDateTime::now_utc(),
    )?;
    state.users.save_password(&user).await?;

    info!("password updated");
    send_token(&JwtKeys::from_ref(&state), &state.config.cookie, user, StatusCode::OK)
}

/// Who is logged in, if anyone. Never fails on a bad or missing token.
pub async fn session(MaybeUser(user): MaybeUser) -> Json<Envelope<SessionData>> {
    Json(Envelope::data(SessionData { user }))
}
