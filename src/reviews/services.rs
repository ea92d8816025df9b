use crate::error::{AppError, AppResult};
use crate::reviews::repo_types::Review;
use crate::users::repo_types::{Role, User};

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

pub fn validate_text(review: &str) -> AppResult<String> {
    let review = review.trim();
    if review.is_empty() {
        return Err(AppError::validation("Review can not be empty!"));
    }
    Ok(review.to_string())
}

pub fn validate_rating(rating: i32) -> AppResult<i32> {
    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        return Err(AppError::validation(format!(
            "Rating must be between {MIN_RATING} and {MAX_RATING}"
        )));
    }
    Ok(rating)
}

/// Admins may change any review; everyone else only their own.
pub fn ensure_can_modify(user: &User, review: &Review) -> AppResult<()> {
    if user.role == Role::Admin || review.user.id == user.id {
        return Ok(());
    }
    Err(AppError::Forbidden)
}
