use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use keystone::auth::Role;
use keystone::persistence::transactional;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Name of the cookie that carries the session token
pub const SESSION_COOKIE: &str = "session_token";

/// Find a cookie value in the request's `Cookie` headers
pub fn extract_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Roles allowed through a gated route. Membership only, no hierarchy.
#[derive(Debug, Clone)]
pub struct RequiredRoles(Arc<[Role]>);

impl RequiredRoles {
    pub fn any_of(roles: &[Role]) -> Self {
        Self(roles.into())
    }

    pub fn allows(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// State for [`session_gate`]: the app state plus the route's role set.
#[derive(Clone)]
pub struct AuthGate {
    pub state: AppState,
    pub roles: RequiredRoles,
}

impl AuthGate {
    pub fn new(state: AppState, roles: &[Role]) -> Self {
        Self {
            state,
            roles: RequiredRoles::any_of(roles),
        }
    }
}

/// Identity of the caller, inserted by [`session_gate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(ApiError::Unauthorized)
    }
}

/// Session authentication middleware.
///
/// Resolves the `session_token` cookie to a live session and checks the
/// owner's role against the route's [`RequiredRoles`]. The lookup commits
/// before the wrapped handler runs.
pub async fn session_gate(
    State(gate): State<AuthGate>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if gate.roles.is_empty() {
        return Ok(next.run(request).await);
    }

    let token = match extract_cookie(request.headers(), SESSION_COOKIE) {
        Some(token) => token.to_string(),
        None => {
            debug!("Rejected {}: no session cookie", request.uri().path());
            return Err(ApiError::Unauthorized);
        }
    };

    let service = gate.state.auth_service;
    let session = transactional(gate.state.tx_manager.as_ref(), move |repo| {
        Box::pin(async move {
            service
                .validate_session(repo, &token)
                .await
                .map_err(ApiError::from)
        })
    })
    .await?;

    if !gate.roles.allows(session.user.role) {
        warn!(
            "User '{}' with role {} denied access to {}",
            session.user.username,
            session.user.role,
            request.uri().path()
        );
        return Err(ApiError::Unauthorized);
    }

    request.extensions_mut().insert(AuthenticatedUser {
        user_id: session.user.id,
        username: session.user.username,
        role: session.user.role,
    });

    Ok(next.run(request).await)
}
