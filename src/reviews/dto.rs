use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reviews::repo_types::Review;

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    #[serde(default)]
    pub review: String,
    pub rating: Option<i32>,
    /// Ignored on the nested `/tours/:tour_id/reviews` route.
    pub tour: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReviewRequest {
    pub review: Option<String>,
    pub rating: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewListQuery {
    pub tour_id: Option<Uuid>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}
fn default_limit() -> i64 {
    100
}

#[derive(Debug, Serialize)]
pub struct ReviewData {
    pub review: Review,
}

#[derive(Debug, Serialize)]
pub struct ReviewsData {
    pub reviews: Vec<Review>,
}
