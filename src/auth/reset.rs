//! Password reset tokens.
//!
//! The plaintext value only travels in the emailed link; the store keeps its
//! SHA-256 digest and an expiry. Issuing a new token overwrites the previous
//! one, so only the latest link works.

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use tracing::{error, info, warn};

use crate::auth::password::PasswordHasher;
use crate::email::Mailer;
use crate::error::{AppError, AppResult};
use crate::users::{
    pipeline,
    repo::UserStore,
    repo_types::{User, Visibility},
};

pub const RESET_TOKEN_TTL: Duration = Duration::minutes(10);

/// 32 random bytes, hex encoded.
pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub fn reset_url(base_url: &str, token: &str) -> String {
    format!("{base_url}/api/v1/users/resetPassword/{token}")
}

/// Issues a reset token for `email` and mails the link.
///
/// If delivery fails the stored digest is cleared again before returning
/// `DeliveryFailure`, so the undelivered token can never be consumed. Only
/// the reset fields are written, never the rest of the row.
pub async fn request_reset(
    users: &dyn UserStore,
    mailer: &dyn Mailer,
    email: &str,
    base_url: &str,
    now: OffsetDateTime,
) -> AppResult<()> {
    let email = pipeline::normalize_email(email);
    let user = users
        .find_by_email(&email, Visibility::ActiveOnly)
        .await?
        .ok_or_else(|| AppError::not_found("There is no user with that email address"))?;

    let token = generate_reset_token();
    users
        .set_reset_token(user.id, &hash_reset_token(&token), now + RESET_TOKEN_TTL)
        .await?;

    let url = reset_url(base_url, &token);
    if let Err(e) = mailer.send_password_reset(&user, &url).await {
        error!(error = %format!("{e:#}"), user_id = %user.id, "password reset email failed");
        if let Err(e) = users.clear_reset_token(user.id).await {
            error!(error = %e, user_id = %user.id, "failed to roll back reset token");
        }
        return Err(AppError::DeliveryFailure);
    }

    info!(user_id = %user.id, "password reset token issued");
    Ok(())
}

pub struct NewPassword<'a> {
    pub password: &'a str,
    pub password_confirm: &'a str,
}

/// Consumes a reset token and sets the new password.
///
/// An invalid password leaves the token in place so the user can retry
/// within the window. The final write is conditional on the token still
/// being live, so concurrent consumers cannot both succeed.
pub async fn consume_reset(
    users: &dyn UserStore,
    hasher: &PasswordHasher,
    token: &str,
    new_password: NewPassword<'_>,
    min_length: usize,
    now: OffsetDateTime,
) -> AppResult<User> {
    let digest = hash_reset_token(token);
    let Some(mut user) = users.find_by_reset_token(&digest, now).await? else {
        warn!("reset token invalid or expired");
        return Err(AppError::InvalidOrExpired);
    };

    pipeline::set_password(
        &mut user,
        hasher,
        new_password.password,
        new_password.password_confirm,
        min_length,
        now,
    )?;
    let changed_at = user.password_changed_at.unwrap_or(now);
    let Some(user) = users
        .consume_reset_token(&digest, now, &user.password_hash, changed_at)
        .await?
    else {
        warn!(user_id = %user.id, "reset token consumed concurrently");
        return Err(AppError::InvalidOrExpired);
    };

    info!(user_id = %user.id, "password reset completed");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::email::testing::RecordingMailer;
    use crate::users::memory::MemoryUserStore;
    use crate::users::pipeline::{prepare_new_user, SignupInput};
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Changes the user's password through the store while the reset email
    /// is in flight, then reports a delivery failure.
    struct PasswordChangingMailer {
        store: Arc<MemoryUserStore>,
        changed_at: OffsetDateTime,
    }

    #[async_trait]
    impl Mailer for PasswordChangingMailer {
        async fn send_welcome(&self, _user: &User, _url: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn send_password_reset(&self, user: &User, _url: &str) -> anyhow::Result<()> {
            let mut stored = self.store.get(user.id).unwrap();
            pipeline::set_password(&mut stored, &hasher(), "brand-new-pass", "brand-new-pass", 8, self.changed_at)
                .unwrap();
            self.store.save_password(&stored).await?;
            anyhow::bail!("smtp timed out")
        }
    }

    const BASE: &str = "http://tourbook.test";

    fn hasher() -> PasswordHasher {
        PasswordHasher::from(&AppConfig::test_default().password)
    }

    async fn seed(store: &MemoryUserStore) -> User {
        let new_user = prepare_new_user(
            SignupInput {
                name: "Ada Lovelace",
                email: "ada@example.com",
                password: "first-password",
                password_confirm: "first-password",
            },
            &hasher(),
            8,
        )
        .unwrap();
        store.insert(new_user).await.unwrap()
    }

    fn token_from(url: &str) -> String {
        url.rsplit('/').next().unwrap().to_string()
    }

    fn new_password(p: &str) -> NewPassword<'_> {
        NewPassword {
            password: p,
            password_confirm: p,
        }
    }

    #[test]
    fn tokens_are_random_hex() {
        let a = generate_reset_token();
        let b = generate_reset_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn digest_is_deterministic_and_differs_from_plaintext() {
        let token = generate_reset_token();
        assert_eq!(hash_reset_token(&token), hash_reset_token(&token));
        assert_ne!(hash_reset_token(&token), token);
        assert_eq!(
            hash_reset_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn request_stores_only_the_digest() {
        let store = MemoryUserStore::new();
        let mailer = RecordingMailer::default();
        let user = seed(&store).await;
        let now = OffsetDateTime::now_utc();

        request_reset(&store, &mailer, "ADA@example.com ", BASE, now).await.unwrap();

        let url = mailer.last_reset_url().expect("reset email sent");
        assert!(url.starts_with("http://tourbook.test/api/v1/users/resetPassword/"));
        let token = token_from(&url);

        let stored = store.get(user.id).unwrap();
        assert_eq!(stored.password_reset_hash.as_deref(), Some(hash_reset_token(&token).as_str()));
        assert_ne!(stored.password_reset_hash.as_deref(), Some(token.as_str()));
        assert_eq!(stored.password_reset_expires, Some(now + RESET_TOKEN_TTL));
    }

    #[tokio::test]
    async fn request_for_unknown_email_is_not_found() {
        let store = MemoryUserStore::new();
        let mailer = RecordingMailer::default();
        let err = request_reset(&store, &mailer, "nobody@example.com", BASE, OffsetDateTime::now_utc())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn delivery_failure_rolls_back_reset_state() {
        let store = MemoryUserStore::new();
        let mailer = RecordingMailer::failing();
        let user = seed(&store).await;

        let err = request_reset(&store, &mailer, "ada@example.com", BASE, OffsetDateTime::now_utc())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DeliveryFailure));

        let stored = store.get(user.id).unwrap();
        assert!(stored.password_reset_hash.is_none());
        assert!(stored.password_reset_expires.is_none());
    }

    #[tokio::test]
    async fn rollback_keeps_password_changed_during_delivery() {
        let store = Arc::new(MemoryUserStore::new());
        let user = seed(&store).await;
        let now = OffsetDateTime::now_utc();
        let mailer = PasswordChangingMailer {
            store: store.clone(),
            changed_at: now,
        };

        let err = request_reset(store.as_ref(), &mailer, "ada@example.com", BASE, now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DeliveryFailure));

        let stored = store.get(user.id).unwrap();
        assert!(hasher().verify("brand-new-pass", &stored.password_hash).unwrap());
        assert_eq!(stored.password_changed_at, Some(now - Duration::seconds(1)));
        assert!(stored.password_reset_hash.is_none());
        assert!(stored.password_reset_expires.is_none());
    }

    #[tokio::test]
    async fn reset_token_can_be_consumed_by_one_writer_only() {
        let store = MemoryUserStore::new();
        let user = seed(&store).await;
        let now = OffsetDateTime::now_utc();
        let digest = hash_reset_token("shared-token");
        store.set_reset_token(user.id, &digest, now + RESET_TOKEN_TTL).await.unwrap();

        let first = store
            .consume_reset_token(&digest, now, "$argon2id$first", now)
            .await
            .unwrap();
        let second = store
            .consume_reset_token(&digest, now, "$argon2id$second", now)
            .await
            .unwrap();
        assert_eq!(first.map(|u| u.id), Some(user.id));
        assert!(second.is_none());
        assert_eq!(store.get(user.id).unwrap().password_hash, "$argon2id$first");
    }

    #[tokio::test]
    async fn consume_succeeds_exactly_once() {
        let store = MemoryUserStore::new();
        let mailer = RecordingMailer::default();
        let user = seed(&store).await;
        let now = OffsetDateTime::now_utc();

        request_reset(&store, &mailer, "ada@example.com", BASE, now).await.unwrap();
        let token = token_from(&mailer.last_reset_url().unwrap());

        let later = now + Duration::minutes(5);
        let updated = consume_reset(&store, &hasher(), &token, new_password("second-password"), 8, later)
            .await
            .expect("first consume");
        assert_eq!(updated.id, user.id);
        assert!(hasher().verify("second-password", &updated.password_hash).unwrap());
        assert!(updated.password_reset_hash.is_none());
        assert_eq!(updated.password_changed_at, Some(later - Duration::seconds(1)));

        let again = consume_reset(&store, &hasher(), &token, new_password("third-password"), 8, later)
            .await
            .unwrap_err();
        assert!(matches!(again, AppError::InvalidOrExpired));
    }

    #[tokio::test]
    async fn consume_after_window_is_rejected() {
        let store = MemoryUserStore::new();
        let mailer = RecordingMailer::default();
        seed(&store).await;
        let now = OffsetDateTime::now_utc();

        request_reset(&store, &mailer, "ada@example.com", BASE, now).await.unwrap();
        let token = token_from(&mailer.last_reset_url().unwrap());

        let err = consume_reset(
            &store,
            &hasher(),
            &token,
            new_password("second-password"),
            8,
            now + Duration::seconds(601),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidOrExpired));
    }

    #[tokio::test]
    async fn only_latest_token_is_valid() {
        let store = MemoryUserStore::new();
        let mailer = RecordingMailer::default();
        seed(&store).await;
        let now = OffsetDateTime::now_utc();

        request_reset(&store, &mailer, "ada@example.com", BASE, now).await.unwrap();
        let first = token_from(&mailer.last_reset_url().unwrap());
        request_reset(&store, &mailer, "ada@example.com", BASE, now).await.unwrap();
        let second = token_from(&mailer.last_reset_url().unwrap());

        let err = consume_reset(&store, &hasher(), &first, new_password("second-password"), 8, now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidOrExpired));
        consume_reset(&store, &hasher(), &second, new_password("second-password"), 8, now)
            .await
            .expect("latest token works");
    }

    #[tokio::test]
    async fn bad_new_password_keeps_token_usable() {
        let store = MemoryUserStore::new();
        let mailer = RecordingMailer::default();
        seed(&store).await;
        let now = OffsetDateTime::now_utc();

        request_reset(&store, &mailer, "ada@example.com", BASE, now).await.unwrap();
        let token = token_from(&mailer.last_reset_url().unwrap());

        let mismatch = NewPassword {
            password: "second-password",
            password_confirm: "another-password",
        };
        let err = consume_reset(&store, &hasher(), &token, mismatch, 8, now).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        consume_reset(&store, &hasher(), &token, new_password("second-password"), 8, now)
            .await
            .expect("token still valid");
    }

    #[tokio::test]
    async fn inactive_users_cannot_reset() {
        let store = MemoryUserStore::new();
        let mailer = RecordingMailer::default();
        let mut user = seed(&store).await;
        user.active = false;
        store.put(user);

        let err = request_reset(&store, &mailer, "ada@example.com", BASE, OffsetDateTime::now_utc())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
