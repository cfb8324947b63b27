use super::error::{
    ExpirationNotInFuture, LoginError, LogoutError, PasswordHashError, PurgeSessionsError,
    RegisterUserError, RepositoryError, ValidateSessionError,
};
use super::models::{CreateSessionParams, CreateUserParams, Role};
use super::password::{hash_password, verify_password};
use super::repository::AuthRepository;
use super::session::{generate_session_token, Session, SessionToken};
use chrono::{DateTime, Utc};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// Hash checked against when the username is unknown, so that a failed
/// login costs one Argon2 verification whether or not the user exists.
static DUMMY_PASSWORD_HASH: LazyLock<String> =
    LazyLock::new(|| hash_password("keystone-dummy-password").unwrap_or_default());

/// Stateless authentication workflow.
///
/// Every operation takes the repository of the transaction it runs in, so
/// the caller decides the transaction boundary.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthService;

impl AuthService {
    pub fn new() -> Self {
        Self
    }

    /// Register a new user with a hashed password
    pub async fn register_user(
        &self,
        repo: &mut dyn AuthRepository,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<(), RegisterUserError> {
        let password_hash = hash_blocking(password.to_string())
            .await
            .map_err(|e| RegisterUserError::Unknown(e.into()))?;

        let params = CreateUserParams {
            username: username.to_string(),
            password_hash,
            role,
        };

        match repo.create_user(params).await {
            Ok(user) => {
                info!("Registered user '{}' with role {}", user.username, user.role);
                Ok(())
            }
            Err(RepositoryError::AlreadyExists) => {
                debug!("Registration rejected, username '{}' is taken", username);
                Err(RegisterUserError::AlreadyExists)
            }
            Err(e) => Err(RegisterUserError::Unknown(e.into())),
        }
    }

    /// Check credentials and open a session that lives until `expires_at`
    pub async fn login(
        &self,
        repo: &mut dyn AuthRepository,
        username: &str,
        password: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<SessionToken, LoginError> {
        if expires_at <= Utc::now() {
            return Err(LoginError::Unknown(ExpirationNotInFuture(expires_at).into()));
        }

        let user = match repo.get_user_by_username(username).await {
            Ok(user) => user,
            Err(RepositoryError::NotFound) => {
                warn!("Login attempt for unknown user '{}'", username);
                // Outcome ignored; only the cost matters
                let _ = verify_dummy_blocking(password.to_string()).await;
                return Err(LoginError::UserNotFound);
            }
            Err(e) => return Err(LoginError::Unknown(e.into())),
        };

        let is_valid = verify_blocking(password.to_string(), user.password_hash.clone())
            .await
            .map_err(|e| LoginError::Unknown(e.into()))?;

        if !is_valid {
            warn!("Invalid password for user '{}'", username);
            return Err(LoginError::InvalidCredentials);
        }

        let params = CreateSessionParams {
            user_id: user.id,
            token: generate_session_token(),
            expires_at,
        };

        let session = repo
            .create_session(params)
            .await
            .map_err(|e| LoginError::Unknown(e.into()))?;

        info!("User '{}' logged in, session expires at {}", user.username, session.expires_at);
        Ok(session.token)
    }

    /// End the session behind `token`. Unknown tokens are not an error.
    pub async fn logout(
        &self,
        repo: &mut dyn AuthRepository,
        token: &str,
    ) -> Result<(), LogoutError> {
        repo.delete_session(token)
            .await
            .map_err(|e| LogoutError::Unknown(e.into()))?;

        debug!("Session deleted");
        Ok(())
    }

    /// Resolve a token to its live session
    pub async fn validate_session(
        &self,
        repo: &mut dyn AuthRepository,
        token: &str,
    ) -> Result<Session, ValidateSessionError> {
        let session = match repo.get_session_by_token(token).await {
            Ok(session) => session,
            Err(RepositoryError::NotFound) => return Err(ValidateSessionError::NotFound),
            Err(e) => return Err(ValidateSessionError::Unknown(e.into())),
        };

        if session.is_expired() {
            debug!("Session for user '{}' has expired", session.user.username);
            return Err(ValidateSessionError::Expired);
        }

        Ok(session)
    }

    /// Delete every expired session, returning how many were removed
    pub async fn purge_expired_sessions(
        &self,
        repo: &mut dyn AuthRepository,
    ) -> Result<u64, PurgeSessionsError> {
        let deleted = repo
            .delete_expired_sessions()
            .await
            .map_err(|e| PurgeSessionsError::Unknown(e.into()))?;

        if deleted > 0 {
            info!("Purged {} expired sessions", deleted);
        }
        Ok(deleted)
    }
}

// Argon2 hashing runs on the blocking pool.
async fn hash_blocking(password: String) -> Result<String, PasswordHashError> {
    run_blocking(move || hash_password(&password)).await
}

async fn verify_blocking(password: String, hash: String) -> Result<bool, PasswordHashError> {
    run_blocking(move || verify_password(&password, &hash)).await
}

async fn verify_dummy_blocking(password: String) -> Result<bool, PasswordHashError> {
    run_blocking(move || verify_password(&password, &DUMMY_PASSWORD_HASH)).await
}

async fn run_blocking<T, F>(f: F) -> Result<T, PasswordHashError>
where
    F: FnOnce() -> Result<T, PasswordHashError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(join_err) => match join_err.try_into_panic() {
            Ok(payload) => std::panic::resume_unwind(payload),
            Err(join_err) => Err(PasswordHashError(join_err.to_string())),
        },
    }
}
