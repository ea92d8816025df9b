use serde::{Deserialize, Serialize};

use crate::users::repo_types::User;

/// Request body for signup.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
}

/// Body of `PATCH /users/resetPassword/:token`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    #[serde(default)]
    pub password_current: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

/// `data` payload of responses carrying a single user.
#[derive(Debug, Serialize)]
pub struct UserData {
    pub user: User,
}

/// `data` payload of the soft session probe; `user` is `null` when anonymous.
#[derive(Debug, Serialize)]
pub struct SessionData {
    pub user: Option<User>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_camel_case_password_fields() {
        let body: UpdatePasswordRequest = serde_json::from_str(
            r#"{"passwordCurrent":"old-one","password":"new-one!","passwordConfirm":"new-one!"}"#,
        )
        .unwrap();
        assert_eq!(body.password_current, "old-one");
        assert_eq!(body.password_confirm, "new-one!");
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let body: LoginRequest = serde_json::from_str("{}").unwrap();
        assert!(body.email.is_empty());
        assert!(body.password.is_empty());
    }
}
