use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced at the HTTP boundary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthenticated(String),

    #[error("You do not have permission to perform this action")]
    Forbidden,

    /// Login failure. Unknown email and wrong password look the same.
    #[error("Incorrect email or password")]
    InvalidCredentials,

    /// Reset token unknown or past its window; the two are not told apart.
    #[error("Token is invalid or has expired")]
    InvalidOrExpired,

    #[error("{0}")]
    NotFound(String),

    #[error("There was an error sending the email. Please try again later")]
    DeliveryFailure,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::InvalidOrExpired | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::DeliveryFailure | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand to the client.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Internal(_) => "Something went wrong".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Internal(e) => tracing::error!(error = %format!("{e:#}"), "internal error"),
            AppError::DeliveryFailure => tracing::error!("email delivery failed"),
            AppError::Unauthenticated(_) | AppError::Forbidden | AppError::InvalidCredentials => {
                tracing::info!(error = %self, "auth rejected")
            }
            _ => tracing::debug!(error = %self, "client error"),
        }

        let status = self.status_code();
        let body = ErrorBody {
            status: if status.is_server_error() { "error" } else { "fail" },
            message: self.user_message(),
        };
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
