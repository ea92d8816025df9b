//! Role-based route guarding.

use std::{future::Future, pin::Pin};

use axum::{extract::Request, middleware::Next, response::IntoResponse, response::Response};
use tracing::warn;

use super::session::CurrentUser;
use crate::error::AppError;
use crate::users::repo_types::{Role, User};

pub fn authorize(user: &User, allowed: &[Role]) -> Result<(), AppError> {
    if !allowed.contains(&user.role) {
        warn!(user_id = %user.id, role = %user.role, ?allowed, "role not permitted");
        return Err(AppError::Forbidden);
    }
    Ok(())
}

type GateFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Middleware restricting a route to `allowed` roles.
///
/// Needs a `CurrentUser` in the request extensions, so it must be layered
/// inside `session::require_auth`. Without one the request is rejected as
/// unauthenticated.
pub fn restrict_to(allowed: &'static [Role]) -> impl Fn(Request, Next) -> GateFuture + Clone + Send + Sync + 'static {
    move |req: Request, next: Next| {
        Box::pin(async move {
            let verdict = match req.extensions().get::<CurrentUser>() {
                Some(CurrentUser(user)) => authorize(user, allowed),
                None => Err(AppError::unauthenticated(
                    "You are not logged in. Please log in to get access",
                )),
            };
            if let Err(e) = verdict {
                return e.into_response();
            }
            next.run(req).await
        })
    }
}
