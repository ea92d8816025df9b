//! Write pipeline for user records.
//!
//! Every path that creates a user or changes a password goes through these
//! steps, in order: normalize, validate, hash, stamp. Hashing happens only in
//! the steps that receive a new plaintext password, so profile edits never
//! touch the stored hash.

use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration, OffsetDateTime};

use crate::auth::password::PasswordHasher;
use crate::error::{AppError, AppResult};
use crate::users::repo_types::{NewUser, Role, User};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_email(email: &str) -> AppResult<()> {
    if !is_valid_email(email) {
        return Err(AppError::validation("Please provide a valid email"));
    }
    Ok(())
}

pub fn validate_name(name: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::validation("Please tell us your name"));
    }
    Ok(())
}

/// Length and confirmation checks for a new plaintext password.
pub fn validate_password(password: &str, confirm: &str, min_length: usize) -> AppResult<()> {
    if password.chars().count() < min_length {
        return Err(AppError::validation(format!(
            "Password length should be greater than or equal to {min_length}"
        )));
    }
    if password != confirm {
        return Err(AppError::validation("Passwords are not the same"));
    }
    Ok(())
}

pub struct SignupInput<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub password_confirm: &'a str,
}

/// Builds the insert payload for a signup. New accounts always start as
/// plain users and carry no password-change stamp.
pub fn prepare_new_user(input: SignupInput<'_>, hasher: &PasswordHasher, min_length: usize) -> AppResult<NewUser> {
    let email = normalize_email(input.email);
    validate_name(input.name)?;
    validate_email(&email)?;
    validate_password(input.password, input.password_confirm, min_length)?;

    let password_hash = hasher.hash(input.password)?;
    Ok(NewUser {
        name: input.name.trim().to_string(),
        email,
        role: Role::User,
        password_hash,
    })
}

/// Replaces the password of an existing user.
///
/// The change stamp is set one second before `now` so a token issued right
/// after this write (same second) is still accepted.
pub fn set_password(
    user: &mut User,
    hasher: &PasswordHasher,
    password: &str,
    confirm: &str,
    min_length: usize,
    now: OffsetDateTime,
) -> AppResult<()> {
    validate_password(password, confirm, min_length)?;
    user.password_hash = hasher.hash(password)?;
    user.password_changed_at = Some(now - Duration::seconds(1));
    Ok(())
}
