use crate::api::requests::{LoginRequest, SignupRequest};
use crate::api::responses::{MeResponse, PurgeResponse};
use crate::error::ApiError;
use crate::middleware::{extract_cookie, AuthenticatedUser, SESSION_COOKIE};
use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{AppendHeaders, IntoResponse},
    Json,
};
use chrono::{DateTime, TimeDelta, Utc};
use keystone::persistence::transactional;
use std::time::Duration;

const OK: &str = "OK";

/// `Set-Cookie` value for a session cookie. Not `Secure`, so it also works
/// over plain HTTP.
fn session_cookie(token: &str, max_age: Duration) -> String {
    format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly",
        SESSION_COOKIE,
        token,
        max_age.as_secs()
    )
}

fn session_expiry(ttl: Duration) -> Result<DateTime<Utc>, ApiError> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .ok_or_else(|| ApiError::internal(format!("session lifetime {:?} is out of range", ttl)))
}

/// POST /signup
///
/// Body: `{"username": "...", "password": "...", "role": "writer"}`. The
/// role is optional and defaults to `reader`.
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<&'static str>, ApiError> {
    req.validate()?;

    let service = state.auth_service;
    let role = req.role.unwrap_or_default();
    transactional(state.tx_manager.as_ref(), move |repo| {
        Box::pin(async move {
            service
                .register_user(repo, &req.username, &req.password, role)
                .await
                .map_err(ApiError::from)
        })
    })
    .await?;

    Ok(Json(OK))
}

/// POST /login
///
/// On success the session token is returned only in the `session_token`
/// cookie. Empty credentials fail like any other mismatch.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let expires_at = session_expiry(state.session_ttl)?;

    let service = state.auth_service;
    let token = transactional(state.tx_manager.as_ref(), move |repo| {
        Box::pin(async move {
            service
                .login(repo, &req.username, &req.password, expires_at)
                .await
                .map_err(ApiError::from)
        })
    })
    .await?;

    Ok((
        AppendHeaders([(header::SET_COOKIE, session_cookie(&token, state.session_ttl))]),
        Json(OK),
    ))
}

/// POST /logout
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_cookie(&headers, SESSION_COOKIE)
        .ok_or(ApiError::NotLoggedIn)?
        .to_string();

    let service = state.auth_service;
    transactional(state.tx_manager.as_ref(), move |repo| {
        Box::pin(async move {
            service
                .logout(repo, &token)
                .await
                .map_err(ApiError::from)
        })
    })
    .await?;

    Ok((
        AppendHeaders([(header::SET_COOKIE, session_cookie("", Duration::ZERO))]),
        Json(OK),
    ))
}

/// GET /me
pub async fn me(user: AuthenticatedUser) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: user.user_id,
        username: user.username,
        role: user.role,
    })
}

/// POST /admin/sessions/purge
pub async fn purge_sessions(State(state): State<AppState>) -> Result<Json<PurgeResponse>, ApiError> {
    let service = state.auth_service;
    let deleted = transactional(state.tx_manager.as_ref(), move |repo| {
        Box::pin(async move {
            service
                .purge_expired_sessions(repo)
                .await
                .map_err(ApiError::from)
        })
    })
    .await?;

    Ok(Json(PurgeResponse { deleted }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("abc", Duration::from_secs(86_400));
        assert_eq!(cookie, "session_token=abc; Path=/; Max-Age=86400; HttpOnly");
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn test_session_expiry_rejects_overflow() {
        assert!(session_expiry(Duration::from_secs(60)).unwrap() > Utc::now());
        assert!(session_expiry(Duration::from_secs(u64::MAX)).is_err());
    }

    #[test]
    fn test_cleared_cookie_expires_immediately() {
        assert_eq!(
            session_cookie("", Duration::ZERO),
            "session_token=; Path=/; Max-Age=0; HttpOnly"
        );
    }
}
