use super::error::RepositoryError;
use super::models::{CreateSessionParams, CreateUserParams, User};
use super::session::Session;
use async_trait::async_trait;

/// Credential and session storage bound to one open transaction.
///
/// Implementations translate storage-specific failures into
/// [`RepositoryError`]; callers never see backend error codes.
#[async_trait]
pub trait AuthRepository: Send {
    /// Insert a new user. A taken username yields `AlreadyExists` and leaves
    /// the surrounding transaction usable.
    async fn create_user(&mut self, params: CreateUserParams) -> Result<User, RepositoryError>;

    /// Find a user by username
    async fn get_user_by_username(&mut self, username: &str) -> Result<User, RepositoryError>;

    /// Insert a session and return it with its owning user
    async fn create_session(
        &mut self,
        params: CreateSessionParams,
    ) -> Result<Session, RepositoryError>;

    /// Find a session, with its owning user, by token
    async fn get_session_by_token(&mut self, token: &str) -> Result<Session, RepositoryError>;

    /// Delete a session by token. Deleting an absent token succeeds.
    async fn delete_session(&mut self, token: &str) -> Result<(), RepositoryError>;

    /// Delete every session whose expiration is strictly before now and
    /// return how many were removed.
    async fn delete_expired_sessions(&mut self) -> Result<u64, RepositoryError>;
}
