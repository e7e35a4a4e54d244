//! Test utilities and common setup.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use rivulet::api::{AppState, create_router};
use rivulet::auth::AuthState;
use rivulet::db::Database;
use rivulet::provider::{ChatProvider, FragmentStream, ProviderError, ProviderRegistry, Turn};

const TEST_JWT_SECRET: &str = "test-secret-for-integration-tests-minimum-32-chars";

/// Yields two fragments and completes.
struct ScriptedProvider;

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn stream_chat(
        &self,
        _prompt: &str,
        _model: &str,
        _history: &[Turn],
    ) -> Result<FragmentStream, ProviderError> {
        Ok(Box::pin(futures::stream::iter(vec![
            Ok("Hello".to_string()),
            Ok(" world".to_string()),
        ])))
    }
}

/// Yields one fragment, then fails mid-stream.
struct FlakyProvider;

#[async_trait]
impl ChatProvider for FlakyProvider {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn stream_chat(
        &self,
        _prompt: &str,
        _model: &str,
        _history: &[Turn],
    ) -> Result<FragmentStream, ProviderError> {
        Ok(Box::pin(futures::stream::iter(vec![
            Ok("partial".to_string()),
            Err(ProviderError::Connection {
                provider: "flaky",
                message: "connection reset".to_string(),
            }),
        ])))
    }
}

/// Create a test application with an in-memory database and deterministic
/// providers instead of real upstream backends.
pub async fn test_app() -> Router {
    let db = Database::in_memory().await.unwrap();
    let auth_state = AuthState::new(TEST_JWT_SECRET, 30);

    let mut registry = ProviderRegistry::new();
    registry.register("scripted", || Box::new(ScriptedProvider));
    registry.register("flaky", || Box::new(FlakyProvider));

    let state = AppState::new(db, auth_state, Arc::new(registry), Duration::ZERO);
    create_router(state)
}

/// Register a user through the API and return their bearer token.
pub async fn register_user(app: &Router, username: &str) -> String {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/auth/register")
                .method(Method::POST)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::to_string(&json!({
                        "username": username,
                        "email": format!("{username}@example.com"),
                        "password": "password123"
                    }))
                    .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = body_json(response).await;
    json["token"].as_str().unwrap().to_string()
}

/// Create a session for the given token, returning its id.
pub async fn create_session(app: &Router, token: &str, title: Option<&str>) -> String {
    let body = match title {
        Some(title) => json!({ "title": title }),
        None => json!({}),
    };
    let response = app
        .clone()
        .oneshot(authed_request(
            Method::POST,
            "/sessions",
            token,
            Some(body),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = body_json(response).await;
    json["id"].as_str().unwrap().to_string()
}

/// Build a bearer-authenticated request with an optional JSON body.
pub fn authed_request(
    method: Method,
    uri: &str,
    token: &str,
    body: Option<Value>,
) -> Request<Body> {
    let builder = Request::builder()
        .uri(uri)
        .method(method)
        .header(header::AUTHORIZATION, format!("Bearer {token}"));
    match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_string(&value).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Collect a response body as parsed JSON.
pub async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Collect a response body as a UTF-8 string.
pub async fn body_text(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}
