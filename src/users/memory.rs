use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::repo::{StoreError, StoreResult, UserStore};
use crate::users::repo_types::{NewUser, User, Visibility};

/// In-process `UserStore` used by tests.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw read that ignores visibility and expiry, for assertions.
    pub fn get(&self, id: Uuid) -> Option<User> {
        self.users.read().ok()?.get(&id).cloned()
    }

    pub fn put(&self, user: User) {
        if let Ok(mut users) = self.users.write() {
            users.insert(user.id, user);
        }
    }
}

fn poisoned() -> StoreError {
    StoreError::Other(anyhow::anyhow!("user store lock poisoned"))
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str, visibility: Visibility) -> StoreResult<Option<User>> {
        let users = self.users.read().map_err(|_| poisoned())?;
        Ok(users
            .values()
            .find(|u| u.email == email && visibility.admits(u.active))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid, visibility: Visibility) -> StoreResult<Option<User>> {
        let users = self.users.read().map_err(|_| poisoned())?;
        Ok(users
            .get(&id)
            .filter(|u| visibility.admits(u.active))
            .cloned())
    }

    async fn find_by_reset_token(&self, token_hash: &str, now: OffsetDateTime) -> StoreResult<Option<User>> {
        let users = self.users.read().map_err(|_| poisoned())?;
        Ok(users
            .values()
            .find(|u| {
                u.active
                    && u.password_reset_hash.as_deref() == Some(token_hash)
                    && u.password_reset_expires.is_some_and(|exp| exp > now)
            })
            .cloned())
    }

    async fn list(&self, visibility: Visibility, limit: i64, offset: i64) -> StoreResult<Vec<User>> {
        let users = self.users.read().map_err(|_| poisoned())?;
        let mut out: Vec<User> = users
            .values()
            .filter(|u| visibility.admits(u.active))
            .cloned()
            .collect();
        out.sort_by_key(|u| u.created_at);
        Ok(out
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn insert(&self, new_user: NewUser) -> StoreResult<User> {
        let mut users = self.users.write().map_err(|_| poisoned())?;
        if users.values().any(|u| u.email == new_user.email) {
            return Err(StoreError::Conflict);
        }
        let user = User {
            id: Uuid::new_v4(),
            name: new_user.name,
            email: new_user.email,
            role: new_user.role,
            password_hash: new_user.password_hash,
            password_changed_at: None,
            password_reset_hash: None,
            password_reset_expires: None,
            active: true,
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn save(&self, user: &User) -> StoreResult<()> {
        let mut users = self.users.write().map_err(|_| poisoned())?;
        if users.values().any(|u| u.id != user.id && u.email == user.email) {
            return Err(StoreError::Conflict);
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn save_password(&self, user: &User) -> StoreResult<()> {
        let mut users = self.users.write().map_err(|_| poisoned())?;
        if let Some(stored) = users.get_mut(&user.id) {
            stored.password_hash = user.password_hash.clone();
            stored.password_changed_at = user.password_changed_at;
        }
        Ok(())
    }

    async fn set_reset_token(&self, id: Uuid, token_hash: &str, expires: OffsetDateTime) -> StoreResult<()> {
        let mut users = self.users.write().map_err(|_| poisoned())?;
        if let Some(stored) = users.get_mut(&id) {
            stored.password_reset_hash = Some(token_hash.to_string());
            stored.password_reset_expires = Some(expires);
        }
        Ok(())
    }

    async fn clear_reset_token(&self, id: Uuid) -> StoreResult<()> {
        let mut users = self.users.write().map_err(|_| poisoned())?;
        if let Some(stored) = users.get_mut(&id) {
            stored.clear_reset();
        }
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> StoreResult<Option<User>> {
        let mut users = self.users.write().map_err(|_| poisoned())?;
        let Some(stored) = users.values_mut().find(|u| {
            u.active
                && u.password_reset_hash.as_deref() == Some(token_hash)
                && u.password_reset_expires.is_some_and(|exp| exp > now)
        }) else {
            return Ok(None);
        };
        stored.password_hash = password_hash.to_string();
        stored.password_changed_at = Some(changed_at);
        stored.clear_reset();
        Ok(Some(stored.clone()))
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let mut users = self.users.write().map_err(|_| poisoned())?;
        Ok(users.remove(&id).is_some())
    }
}
