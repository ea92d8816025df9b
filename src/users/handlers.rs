use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{delete, get, patch},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::{
        dto::UserData,
        roles::restrict_to,
        session::{require_auth, CurrentUser},
    },
    error::{AppError, AppResult},
    response::Envelope,
    state::AppState,
    users::{
        dto::{AdminUpdateUserRequest, AdminUser, AdminUserData, AdminUsersData, ListUsersQuery, UpdateMeRequest},
        pipeline,
        repo_types::{Role, User, Visibility},
    },
};

pub fn user_routes(state: &AppState) -> Router<AppState> {
    let profile = Router::new()
        .route("/users/me", get(me))
        .route("/users/updateMe", patch(update_me))
        .route("/users/deleteMe", delete(delete_me))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // require_auth is added last so it runs first and binds the user the
    // role gate reads.
    let admin = Router::new()
        .route("/users", get(list_users))
        .route("/users/:id", get(get_user).patch(update_user).delete(delete_user))
        .route_layer(middleware::from_fn(restrict_to(&[Role::Admin])))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    profile.merge(admin)
}

async fn load_active(state: &AppState, id: Uuid) -> AppResult<User> {
    state
        .users
        .find_by_id(id, Visibility::ActiveOnly)
        .await?
        .ok_or_else(|| AppError::unauthenticated("The user belonging to this token no longer exists"))
}

pub async fn me(current: CurrentUser) -> Json<Envelope<UserData>> {
    Json(Envelope::data(UserData { user: current.0 }))
}

#[instrument(skip(state, current, payload), fields(user_id = %current.id))]
pub async fn update_me(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<UpdateMeRequest>,
) -> AppResult<Json<Envelope<UserData>>> {
    if payload.touches_password() {
        return Err(AppError::validation(
            "This route is not for password updates. Please use /updateMyPassword",
        ));
    }

    let mut user = load_active(&state, current.id).await?;
    if let Some(name) = payload.name.as_deref() {
        pipeline::validate_name(name)?;
        user.name = name.trim().to_string();
    }
    if let Some(email) = payload.email.as_deref() {
        let email = pipeline::normalize_email(email);
        pipeline::validate_email(&email)?;
        user.email = email;
    }
    state.users.save(&user).await?;

    info!("profile updated");
    Ok(Json(Envelope::data(UserData { user })))
}

/// Soft delete: the account stays in the store but is invisible to login and
/// session resolution.
#[instrument(skip(state, current), fields(user_id = %current.id))]
pub async fn delete_me(State(state): State<AppState>, current: CurrentUser) -> AppResult<StatusCode> {
    let mut user = load_active(&state, current.id).await?;
    user.active = false;
    state.users.save(&user).await?;
    info!("account deactivated");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    Query(q): Query<ListUsersQuery>,
) -> AppResult<Json<Envelope<AdminUsersData>>> {
    let visibility = if q.include_inactive {
        Visibility::IncludeInactive
    } else {
        Visibility::ActiveOnly
    };
    let users: Vec<AdminUser> = state
        .users
        .list(visibility, q.limit.clamp(1, 1000), q.offset.max(0))
        .await?
        .into_iter()
        .map(AdminUser::from)
        .collect();
    Ok(Json(Envelope::with_results(users.len(), AdminUsersData { users })))
}

async fn find_any(state: &AppState, id: Uuid) -> AppResult<User> {
    state
        .users
        .find_by_id(id, Visibility::IncludeInactive)
        .await?
        .ok_or_else(|| AppError::not_found("No user found with that ID"))
}

#[instrument(skip(state))]
pub async fn get_user(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<Envelope<AdminUserData>>> {
    let user = find_any(&state, id).await?;
    Ok(Json(Envelope::data(AdminUserData { user: user.into() })))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdminUpdateUserRequest>,
) -> AppResult<Json<Envelope<AdminUserData>>> {
    let mut user = find_any(&state, id).await?;
    if let Some(name) = payload.name.as_deref() {
        pipeline::validate_name(name)?;
        user.name = name.trim().to_string();
    }
    if let Some(email) = payload.email.as_deref() {
        let email = pipeline::normalize_email(email);
        pipeline::validate_email(&email)?;
        user.email = email;
    }
    if let Some(role) = payload.role {
        user.role = role;
    }
    if let Some(active) = payload.active {
        user.active = active;
    }
    state.users.save(&user).await?;

    info!(user_id = %user.id, role = %user.role, active = user.active, "user updated by admin");
    Ok(Json(Envelope::data(AdminUserData { user: user.into() })))
}

#[instrument(skip(state))]
pub async fn delete_user(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<StatusCode> {
    if !state.users.delete(id).await? {
        return Err(AppError::not_found("No user found with that ID"));
    }
    info!(user_id = %id, "user deleted by admin");
    Ok(StatusCode::NO_CONTENT)
}
