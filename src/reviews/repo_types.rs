use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Review joined with its author's name.
#[derive(Debug, FromRow)]
pub struct ReviewRow {
    pub id: Uuid,
    pub review: String,
    pub rating: i32,
    pub tour_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewAuthor {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Review {
    pub id: Uuid,
    pub review: String,
    pub rating: i32,
    pub tour: Uuid,
    pub user: ReviewAuthor,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<ReviewRow> for Review {
    fn from(r: ReviewRow) -> Self {
        Self {
            id: r.id,
            review: r.review,
            rating: r.rating,
            tour: r.tour_id,
            user: ReviewAuthor {
                id: r.user_id,
                name: r.user_name,
            },
            created_at: r.created_at,
        }
    }
}
