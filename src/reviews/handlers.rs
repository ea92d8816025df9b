use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, patch, post},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::{
        roles::restrict_to,
        session::{require_auth, CurrentUser},
    },
    error::{AppError, AppResult},
    response::Envelope,
    reviews::{
        dto::{CreateReviewRequest, ReviewData, ReviewListQuery, ReviewsData, UpdateReviewRequest},
        repo,
        services::{ensure_can_modify, validate_rating, validate_text},
    },
    state::AppState,
    users::repo_types::Role,
};

pub fn review_routes(state: &AppState) -> Router<AppState> {
    let read = Router::new()
        .route("/reviews", get(list_reviews))
        .route("/tours/:tour_id/reviews", get(list_tour_reviews))
        .route("/reviews/:id", get(get_review));

    let write = Router::new()
        .route("/reviews", post(create_review))
        .route("/tours/:tour_id/reviews", post(create_tour_review))
        .route_layer(middleware::from_fn(restrict_to(&[Role::User])));

    let manage = Router::new()
        .route("/reviews/:id", patch(update_review).delete(delete_review))
        .route_layer(middleware::from_fn(restrict_to(&[Role::User, Role::Admin])));

    read.merge(write)
        .merge(manage)
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
}

#[instrument(skip(state))]
pub async fn list_reviews(
    State(state): State<AppState>,
    Query(q): Query<ReviewListQuery>,
) -> AppResult<Json<Envelope<ReviewsData>>> {
    list(&state, q.tour_id, &q).await
}

#[instrument(skip(state))]
pub async fn list_tour_reviews(
    State(state): State<AppState>,
    Path(tour_id): Path<Uuid>,
    Query(q): Query<ReviewListQuery>,
) -> AppResult<Json<Envelope<ReviewsData>>> {
    list(&state, Some(tour_id), &q).await
}

async fn list(state: &AppState, tour_id: Option<Uuid>, q: &ReviewListQuery) -> AppResult<Json<Envelope<ReviewsData>>> {
    let reviews = repo::list(&state.db, tour_id, q.limit.clamp(1, 1000), q.offset.max(0)).await?;
    Ok(Json(Envelope::with_results(reviews.len(), ReviewsData { reviews })))
}

#[instrument(skip(state))]
pub async fn get_review(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<Envelope<ReviewData>>> {
    let review = repo::get(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("No review found with that ID"))?;
    Ok(Json(Envelope::data(ReviewData { review })))
}

#[instrument(skip(state, current, payload), fields(user_id = %current.id))]
pub async fn create_review(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<CreateReviewRequest>,
) -> AppResult<(StatusCode, Json<Envelope<ReviewData>>)> {
    let tour_id = payload
        .tour
        .ok_or_else(|| AppError::validation("Review must belong to a tour"))?;
    create(&state, &current, tour_id, payload).await
}

#[instrument(skip(state, current, payload), fields(user_id = %current.id))]
pub async fn create_tour_review(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(tour_id): Path<Uuid>,
    Json(payload): Json<CreateReviewRequest>,
) -> AppResult<(StatusCode, Json<Envelope<ReviewData>>)> {
    create(&state, &current, tour_id, payload).await
}

async fn create(
    state: &AppState,
    current: &CurrentUser,
    tour_id: Uuid,
    payload: CreateReviewRequest,
) -> AppResult<(StatusCode, Json<Envelope<ReviewData>>)> {
    let text = validate_text(&payload.review)?;
    let rating = payload
        .rating
        .ok_or_else(|| AppError::validation("Review must have a rating"))
        .and_then(validate_rating)?;

    let review = repo::insert(&state.db, tour_id, current.id, &text, rating).await?;
    info!(review_id = %review.id, %tour_id, "review created");
    Ok((StatusCode::CREATED, Json(Envelope::data(ReviewData { review }))))
}

async fn load_for_change(state: &AppState, current: &CurrentUser, id: Uuid) -> AppResult<()> {
    let review = repo::get(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("No review found with that ID"))?;
    ensure_can_modify(current, &review)
}

#[instrument(skip(state, current, payload), fields(user_id = %current.id))]
pub async fn update_review(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateReviewRequest>,
) -> AppResult<Json<Envelope<ReviewData>>> {
    let text = payload.review.as_deref().map(validate_text).transpose()?;
    let rating = payload.rating.map(validate_rating).transpose()?;

    load_for_change(&state, &current, id).await?;
    let review = repo::update(&state.db, id, text.as_deref(), rating)
        .await?
        .ok_or_else(|| AppError::not_found("No review found with that ID"))?;

    info!(review_id = %id, "review updated");
    Ok(Json(Envelope::data(ReviewData { review })))
}

#[instrument(skip(state, current), fields(user_id = %current.id))]
pub async fn delete_review(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    load_for_change(&state, &current, id).await?;
    if !repo::delete(&state.db, id).await? {
        return Err(AppError::not_found("No review found with that ID"));
    }
    info!(review_id = %id, "review deleted");
    Ok(StatusCode::NO_CONTENT)
}
