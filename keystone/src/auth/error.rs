use thiserror::Error;

/// Boxed underlying cause carried by `Unknown` variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Outcome classification returned by every repository operation.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,

    #[error("record already exists")]
    AlreadyExists,

    #[error("storage error: {0}")]
    Unknown(#[source] BoxError),
}

impl RepositoryError {
    pub fn unknown(err: impl Into<BoxError>) -> Self {
        RepositoryError::Unknown(err.into())
    }
}

#[derive(Debug, Error)]
#[error("password hashing error: {0}")]
pub struct PasswordHashError(pub String);

#[derive(Debug, Error)]
pub enum RegisterUserError {
    #[error("user already exists")]
    AlreadyExists,

    #[error("failed to register user: {0}")]
    Unknown(#[source] BoxError),
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("user not found")]
    UserNotFound,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("failed to log in: {0}")]
    Unknown(#[source] BoxError),
}

#[derive(Debug, Error)]
pub enum LogoutError {
    #[error("failed to log out: {0}")]
    Unknown(#[source] BoxError),
}

#[derive(Debug, Error)]
pub enum ValidateSessionError {
    #[error("session not found")]
    NotFound,

    #[error("session expired")]
    Expired,

    #[error("failed to validate session: {0}")]
    Unknown(#[source] BoxError),
}

#[derive(Debug, Error)]
pub enum PurgeSessionsError {
    #[error("failed to purge expired sessions: {0}")]
    Unknown(#[source] BoxError),
}

#[derive(Debug, Error)]
#[error("session expiration {0} is not in the future")]
pub struct ExpirationNotInFuture(pub chrono::DateTime<chrono::Utc>);
