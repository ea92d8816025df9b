use serde::{Deserialize, Serialize};

use crate::users::repo_types::{Role, User};

/// Self-service profile update. Password fields are accepted only so they can
/// be rejected with a pointer to the right route.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirm: Option<String>,
}

impl UpdateMeRequest {
    pub fn touches_password(&self) -> bool {
        self.password.is_some() || self.password_confirm.is_some()
    }
}

/// Admin update. Never changes passwords.
#[derive(Debug, Deserialize)]
pub struct AdminUpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub include_inactive: bool,
}
fn default_limit() -> i64 {
    100
}

/// Admin view of a user; unlike the public view it shows the active flag.
#[derive(Debug, Serialize)]
pub struct AdminUser {
    #[serde(flatten)]
    pub user: User,
    pub active: bool,
}

impl From<User> for AdminUser {
    fn from(user: User) -> Self {
        let active = user.active;
        Self { user, active }
    }
}

#[derive(Debug, Serialize)]
pub struct AdminUserData {
    pub user: AdminUser,
}

#[derive(Debug, Serialize)]
pub struct AdminUsersData {
    pub users: Vec<AdminUser>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_me_flags_password_fields() {
        let body: UpdateMeRequest = serde_json::from_str(r#"{"name":"New Name"}"#).unwrap();
        assert!(!body.touches_password());
        let body: UpdateMeRequest = serde_json::from_str(r#"{"passwordConfirm":"x"}"#).unwrap();
        assert!(body.touches_password());
    }

    #[test]
    fn admin_view_exposes_active_flag_only() {
        let user = User {
            id: uuid::Uuid::new_v4(),
            name: "Inactive".into(),
            email: "gone@example.com".into(),
            role: Role::Guide,
            password_hash: "$argon2id$hidden".into(),
            password_changed_at: None,
            password_reset_hash: None,
            password_reset_expires: None,
            active: false,
            created_at: time::OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_value(AdminUser::from(user)).unwrap();
        assert_eq!(json["active"], false);
        assert_eq!(json["role"], "guide");
        assert!(json.get("password_hash").is_none());
    }

    #[test]
    fn list_query_defaults() {
        let q: ListUsersQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.limit, 100);
        assert_eq!(q.offset, 0);
        assert!(!q.include_inactive);
    }
}
