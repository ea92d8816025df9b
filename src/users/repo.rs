use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::users::repo_types::{NewUser, User, UserRow, Visibility};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict => AppError::Conflict("Email already registered".into()),
            StoreError::Other(e) => AppError::Internal(e),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Credential store. Every read states whether soft-deleted users count.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str, visibility: Visibility) -> StoreResult<Option<User>>;
    async fn find_by_id(&self, id: Uuid, visibility: Visibility) -> StoreResult<Option<User>>;
    /// Active user holding this reset digest with an expiry later than `now`.
    async fn find_by_reset_token(&self, token_hash: &str, now: OffsetDateTime) -> StoreResult<Option<User>>;
    async fn list(&self, visibility: Visibility, limit: i64, offset: i64) -> StoreResult<Vec<User>>;
    async fn insert(&self, new_user: NewUser) -> StoreResult<User>;
    /// Persists every mutable field of `user`.
    async fn save(&self, user: &User) -> StoreResult<()>;
    /// Writes only the password hash and change stamp of `user`.
    async fn save_password(&self, user: &User) -> StoreResult<()>;
    async fn set_reset_token(&self, id: Uuid, token_hash: &str, expires: OffsetDateTime) -> StoreResult<()>;
    async fn clear_reset_token(&self, id: Uuid) -> StoreResult<()>;
    /// Atomically swaps in a new password for the active user holding this
    /// unexpired reset digest and clears the digest. `None` when no such
    /// user exists anymore, so at most one caller wins per token.
    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> StoreResult<Option<User>>;
    async fn delete(&self, id: Uuid) -> StoreResult<bool>;
}

const USER_COLUMNS: &str = "id, name, email, role, password_hash, password_changed_at, \
     password_reset_hash, password_reset_expires, active, created_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn into_user(row: UserRow) -> StoreResult<User> {
    Ok(User::try_from(row)?)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str, visibility: Visibility) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND (active OR $2)"
        ))
        .bind(email)
        .bind(visibility == Visibility::IncludeInactive)
        .fetch_optional(&self.db)
        .await
        .map_err(anyhow::Error::from)?;
        row.map(into_user).transpose()
    }

    async fn find_by_id(&self, id: Uuid, visibility: Visibility) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND (active OR $2)"
        ))
        .bind(id)
        .bind(visibility == Visibility::IncludeInactive)
        .fetch_optional(&self.db)
        .await
        .map_err(anyhow::Error::from)?;
        row.map(into_user).transpose()
    }

    async fn find_by_reset_token(&self, token_hash: &str, now: OffsetDateTime) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE password_reset_hash = $1 AND password_reset_expires > $2 AND active"
        ))
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.db)
        .await
        .map_err(anyhow::Error::from)?;
        row.map(into_user).transpose()
    }

    async fn list(&self, visibility: Visibility, limit: i64, offset: i64) -> StoreResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE (active OR $1) \
             ORDER BY created_at ASC LIMIT $2 OFFSET $3"
        ))
        .bind(visibility == Visibility::IncludeInactive)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .map_err(anyhow::Error::from)?;
        rows.into_iter().map(into_user).collect()
    }

    async fn insert(&self, new_user: NewUser) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (name, email, role, password_hash) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        ))
        .bind(&new_user.name)
        .bind(&new_user.email)
        .bind(new_user.role.as_str())
        .bind(&new_user.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict
            } else {
                StoreError::Other(e.into())
            }
        })?;
        into_user(row)
    }

    async fn save(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET name = $2,
                   email = $3,
                   role = $4,
                   password_hash = $5,
                   password_changed_at = $6,
                   password_reset_hash = $7,
                   password_reset_expires = $8,
                   active = $9
             WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(&user.password_hash)
        .bind(user.password_changed_at)
        .bind(&user.password_reset_hash)
        .bind(user.password_reset_expires)
        .bind(user.active)
        .execute(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict
            } else {
                StoreError::Other(e.into())
            }
        })?;
        Ok(())
    }

    async fn save_password(&self, user: &User) -> StoreResult<()> {
        sqlx::query("UPDATE users SET password_hash = $2, password_changed_at = $3 WHERE id = $1")
            .bind(user.id)
            .bind(&user.password_hash)
            .bind(user.password_changed_at)
            .execute(&self.db)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(())
    }

    async fn set_reset_token(&self, id: Uuid, token_hash: &str, expires: OffsetDateTime) -> StoreResult<()> {
        sqlx::query("UPDATE users SET password_reset_hash = $2, password_reset_expires = $3 WHERE id = $1")
            .bind(id)
            .bind(token_hash)
            .bind(expires)
            .execute(&self.db)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(())
    }

    async fn clear_reset_token(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE users SET password_reset_hash = NULL, password_reset_expires = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users \
                SET password_hash = $3, \
                    password_changed_at = $4, \
                    password_reset_hash = NULL, \
                    password_reset_expires = NULL \
              WHERE password_reset_hash = $1 AND password_reset_expires > $2 AND active \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(token_hash)
        .bind(now)
        .bind(password_hash)
        .bind(changed_at)
        .fetch_optional(&self.db)
        .await
        .map_err(anyhow::Error::from)?;
        row.map(into_user).transpose()
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(res.rows_affected() > 0)
    }
}
