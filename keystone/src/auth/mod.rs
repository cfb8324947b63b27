// Public API
pub mod auth_service;
pub mod error;
pub mod models;
pub mod password;
pub mod repository;
pub mod session;

// Re-export commonly used types
pub use auth_service::AuthService;
pub use error::{
    LoginError, LogoutError, PurgeSessionsError, RegisterUserError, RepositoryError,
    ValidateSessionError,
};
pub use models::{Role, User};
pub use repository::AuthRepository;
pub use session::{generate_session_token, Session, SessionToken};
