pub mod authentication;

pub use authentication::{
    extract_cookie, session_gate, AuthGate, AuthenticatedUser, RequiredRoles, SESSION_COOKIE,
};
