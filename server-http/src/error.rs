use crate::api::responses::ErrorResponse;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use keystone::auth::error::BoxError;
use keystone::auth::{
    LoginError, LogoutError, PurgeSessionsError, RegisterUserError, ValidateSessionError,
};
use keystone::persistence::TransactionError;
use tracing::error;

pub const USERNAME_TAKEN: &str = "ユーザー名が既に使われています";
pub const INVALID_CREDENTIALS: &str = "ユーザー名かパスワードが一致しません";
pub const NOT_LOGGED_IN: &str = "ログインしていません";

/// Errors surfaced at the HTTP boundary.
///
/// Handler outcomes carry a localized JSON string body; gateway rejections
/// and internal failures carry `{"error": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("username already taken")]
    UsernameTaken,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("not logged in")]
    NotLoggedIn,

    #[error("unauthorized")]
    Unauthorized,

    #[error("internal error: {0}")]
    Internal(#[source] BoxError),
}

impl ApiError {
    pub fn internal(err: impl Into<BoxError>) -> Self {
        ApiError::Internal(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(message) => (StatusCode::BAD_REQUEST, Json(message)).into_response(),
            ApiError::UsernameTaken => (StatusCode::BAD_REQUEST, Json(USERNAME_TAKEN)).into_response(),
            ApiError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, Json(INVALID_CREDENTIALS)).into_response()
            }
            ApiError::NotLoggedIn => (StatusCode::BAD_REQUEST, Json(NOT_LOGGED_IN)).into_response(),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("unauthorized")),
            )
                .into_response(),
            ApiError::Internal(source) => {
                error!("Request failed: {}", source);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new("internal server error")),
                )
                    .into_response()
            }
        }
    }
}

impl From<TransactionError> for ApiError {
    fn from(err: TransactionError) -> Self {
        ApiError::internal(err)
    }
}

impl From<RegisterUserError> for ApiError {
    fn from(err: RegisterUserError) -> Self {
        match err {
            RegisterUserError::AlreadyExists => ApiError::UsernameTaken,
            RegisterUserError::Unknown(_) => ApiError::internal(err),
        }
    }
}

impl From<LoginError> for ApiError {
    fn from(err: LoginError) -> Self {
        match err {
            // Unknown usernames are indistinguishable from bad passwords
            LoginError::UserNotFound | LoginError::InvalidCredentials => ApiError::InvalidCredentials,
            LoginError::Unknown(_) => ApiError::internal(err),
        }
    }
}

impl From<LogoutError> for ApiError {
    fn from(err: LogoutError) -> Self {
        ApiError::internal(err)
    }
}

impl From<ValidateSessionError> for ApiError {
    fn from(err: ValidateSessionError) -> Self {
        match err {
            ValidateSessionError::NotFound | ValidateSessionError::Expired => ApiError::Unauthorized,
            ValidateSessionError::Unknown(_) => ApiError::internal(err),
        }
    }
}

impl From<PurgeSessionsError> for ApiError {
    fn from(err: PurgeSessionsError) -> Self {
        ApiError::internal(err)
    }
}
