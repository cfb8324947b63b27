pub mod auth;
pub mod health;

pub use auth::{login, logout, me, purge_sessions, signup};
pub use health::health_check;
