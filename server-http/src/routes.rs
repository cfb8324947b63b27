use crate::handlers;
use crate::middleware::{session_gate, AuthGate};
use crate::state::AppState;
use axum::{
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use keystone::auth::Role;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Build and configure the application router
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    // Any signed-in user
    let account = Router::new()
        .route("/me", get(handlers::me))
        .route_layer(from_fn_with_state(
            AuthGate::new(state.clone(), &Role::ALL),
            session_gate,
        ));

    let admin = Router::new()
        .route("/admin/sessions/purge", post(handlers::purge_sessions))
        .route_layer(from_fn_with_state(
            AuthGate::new(state.clone(), &[Role::SystemAdmin, Role::Admin]),
            session_gate,
        ));

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session lifecycle
        .route("/signup", post(handlers::signup))
        .route("/login", post(handlers::login))
        .route("/logout", post(handlers::logout))
        .merge(account)
        .merge(admin)
        // Middleware
        .layer(CatchPanicLayer::new())
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() || allowed_origins.iter().any(|origin| origin == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    // Credentialed requests need explicit methods and headers
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .allow_credentials(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{INVALID_CREDENTIALS, NOT_LOGGED_IN, USERNAME_TAKEN};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use keystone::persistence::MemoryTransactionManager;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(store: &MemoryTransactionManager) -> Router {
        let state = AppState::new(Arc::new(store.clone()), Duration::from_secs(86_400));
        build_router(state, &["*".to_string()])
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn with_cookie(method: &str, uri: &str, cookie: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// The `name=value` part of the response's `Set-Cookie` header
    fn cookie_pair(response: &Response) -> String {
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    async fn signup(store: &MemoryTransactionManager, username: &str, role: &str) -> Response {
        app(store)
            .oneshot(post_json(
                "/signup",
                json!({ "username": username, "password": "pw123", "role": role }),
            ))
            .await
            .unwrap()
    }

    async fn login(store: &MemoryTransactionManager, username: &str, password: &str) -> Response {
        app(store)
            .oneshot(post_json(
                "/login",
                json!({ "username": username, "password": password }),
            ))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let store = MemoryTransactionManager::new();

        let response = signup(&store, "alice", "writer").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!("OK"));

        let response = login(&store, "alice", "pw123").await;
        assert_eq!(response.status(), StatusCode::OK);
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(set_cookie.ends_with("; Path=/; Max-Age=86400; HttpOnly"));
        let cookie = cookie_pair(&response);

        let response = login(&store, "alice", "wrong").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await, json!(INVALID_CREDENTIALS));

        let response = app(&store)
            .oneshot(with_cookie("GET", "/me", &cookie))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let me = json_body(response).await;
        assert_eq!(me["username"], "alice");
        assert_eq!(me["role"], "writer");

        let response = app(&store)
            .oneshot(with_cookie("POST", "/logout", &cookie))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(cookie_pair(&response), "session_token=");

        let response = app(&store)
            .oneshot(with_cookie("GET", "/me", &cookie))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(store.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_signup_leaves_one_user() {
        let store = MemoryTransactionManager::new();

        assert_eq!(signup(&store, "alice", "writer").await.status(), StatusCode::OK);

        let response = signup(&store, "alice", "reader").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await, json!(USERNAME_TAKEN));
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_signup_defaults_to_reader() {
        let store = MemoryTransactionManager::new();

        let response = app(&store)
            .oneshot(post_json("/signup", json!({ "username": "bob", "password": "pw123" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let cookie = cookie_pair(&login(&store, "bob", "pw123").await);
        let response = app(&store)
            .oneshot(with_cookie("GET", "/me", &cookie))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["role"], "reader");
    }

    #[tokio::test]
    async fn test_signup_rejects_empty_credentials() {
        let store = MemoryTransactionManager::new();

        let response = app(&store)
            .oneshot(post_json("/signup", json!({ "username": "", "password": "pw123" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_login_unknown_user_matches_wrong_password() {
        let store = MemoryTransactionManager::new();

        let response = login(&store, "nobody", "pw123").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await, json!(INVALID_CREDENTIALS));
    }

    #[tokio::test]
    async fn test_login_with_empty_credentials_is_unauthorized() {
        let store = MemoryTransactionManager::new();
        signup(&store, "alice", "writer").await;

        for (username, password) in [("alice", ""), ("", "pw123")] {
            let response = login(&store, username, password).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(json_body(response).await, json!(INVALID_CREDENTIALS));
        }
        assert_eq!(store.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_logout_without_cookie() {
        let store = MemoryTransactionManager::new();

        let request = Request::builder()
            .method("POST")
            .uri("/logout")
            .body(Body::empty())
            .unwrap();
        let response = app(&store).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await, json!(NOT_LOGGED_IN));
    }

    #[tokio::test]
    async fn test_purge_requires_admin_role() {
        let store = MemoryTransactionManager::new();
        signup(&store, "wendy", "writer").await;
        signup(&store, "ada", "admin").await;

        let writer = cookie_pair(&login(&store, "wendy", "pw123").await);
        let response = app(&store)
            .oneshot(with_cookie("POST", "/admin/sessions/purge", &writer))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let admin = cookie_pair(&login(&store, "ada", "pw123").await);
        let response = app(&store)
            .oneshot(with_cookie("POST", "/admin/sessions/purge", &admin))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "deleted": 0 }));
    }

    #[tokio::test]
    async fn test_storage_failure_returns_500() {
        let store = MemoryTransactionManager::new();
        store.set_unavailable(true);

        let response = signup(&store, "alice", "writer").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await,
            json!({ "error": "internal server error" })
        );
    }

    #[tokio::test]
    async fn test_health() {
        let store = MemoryTransactionManager::new();

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app(&store).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "message": "OK" }));
    }
}
