use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::reviews::repo_types::{Review, ReviewRow};

const REVIEW_SELECT: &str = r#"
    SELECT r.id, r.review, r.rating, r.tour_id, r.user_id, u.name AS user_name, r.created_at
    FROM reviews r
    JOIN users u ON u.id = r.user_id
"#;

pub async fn list(db: &PgPool, tour_id: Option<Uuid>, limit: i64, offset: i64) -> anyhow::Result<Vec<Review>> {
    let rows = sqlx::query_as::<_, ReviewRow>(&format!(
        "{REVIEW_SELECT} WHERE ($1::uuid IS NULL OR r.tour_id = $1) \
         ORDER BY r.created_at DESC LIMIT $2 OFFSET $3"
    ))
    .bind(tour_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().map(Review::from).collect())
}

pub async fn get(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Review>> {
    let row = sqlx::query_as::<_, ReviewRow>(&format!("{REVIEW_SELECT} WHERE r.id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(row.map(Review::from))
}

fn map_write_error(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict("You have already reviewed this tour".into())
        }
        _ => AppError::Internal(e.into()),
    }
}

pub async fn insert(db: &PgPool, tour_id: Uuid, user_id: Uuid, review: &str, rating: i32) -> AppResult<Review> {
    let row = sqlx::query_as::<_, ReviewRow>(
        r#"
        WITH inserted AS (
            INSERT INTO reviews (review, rating, tour_id, user_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, review, rating, tour_id, user_id, created_at
        )
        SELECT i.id, i.review, i.rating, i.tour_id, i.user_id, u.name AS user_name, i.created_at
        FROM inserted i
        JOIN users u ON u.id = i.user_id
        "#,
    )
    .bind(review)
    .bind(rating)
    .bind(tour_id)
    .bind(user_id)
    .fetch_one(db)
    .await
    .map_err(map_write_error)?;
    Ok(row.into())
}

/// Applies the given fields; `None` keeps the stored value.
pub async fn update(db: &PgPool, id: Uuid, review: Option<&str>, rating: Option<i32>) -> AppResult<Option<Review>> {
    let row = sqlx::query_as::<_, ReviewRow>(
        r#"
        WITH updated AS (
            UPDATE reviews
            SET review = COALESCE($2, review),
                rating = COALESCE($3, rating)
            WHERE id = $1
            RETURNING id, review, rating, tour_id, user_id, created_at
        )
        SELECT d.id, d.review, d.rating, d.tour_id, d.user_id, u.name AS user_name, d.created_at
        FROM updated d
        JOIN users u ON u.id = d.user_id
        "#,
    )
    .bind(id)
    .bind(review)
    .bind(rating)
    .fetch_optional(db)
    .await
    .map_err(map_write_error)?;
    Ok(row.map(Review::from))
}

pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM reviews WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}
