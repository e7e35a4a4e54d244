//! API integration tests.

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::json;
use tower::ServiceExt;

mod common;
use common::{authed_request, body_json, body_text, create_session, register_user, test_app};

/// Health endpoint works without authentication.
#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .method(Method::GET)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_register_returns_token_and_user() {
    let app = test_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/auth/register")
                .method(Method::POST)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::to_string(&json!({
                        "username": "alice",
                        "email": "alice@example.com",
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
    assert!(json["token"].is_string());
    assert_eq!(json["user"]["username"], "alice");
    assert_eq!(json["user"]["email"], "alice@example.com");
    assert!(json["user"]["password_hash"].is_null());
}

#[tokio::test]
async fn test_register_duplicate_username_conflicts() {
    let app = test_app().await;
    register_user(&app, "alice").await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/register")
                .method(Method::POST)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::to_string(&json!({
                        "username": "alice",
                        "email": "other@example.com",
                        "password": "password123"
                    }))
                    .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_register_rejects_invalid_email() {
    let app = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/register")
                .method(Method::POST)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::to_string(&json!({
                        "username": "alice",
                        "email": "not-an-email",
                        "password": "password123"
                    }))
                    .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_by_email() {
    let app = test_app().await;
    register_user(&app, "alice").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/auth/login")
                .method(Method::POST)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::to_string(&json!({
                        "email": "alice@example.com",
                        "password": "password123"
                    }))
                    .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["token"].is_string());
    assert_eq!(json["user"]["username"], "alice");
}

#[tokio::test]
async fn test_login_wrong_password_unauthorized() {
    let app = test_app().await;
    register_user(&app, "alice").await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/login")
                .method(Method::POST)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::to_string(&json!({
                        "email": "alice@example.com",
                        "password": "wrong"
                    }))
                    .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = test_app().await;

    for uri in ["/me", "/sessions"] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .method(Method::GET)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
    }
}

#[tokio::test]
async fn test_get_me() {
    let app = test_app().await;
    let token = register_user(&app, "alice").await;

    let response = app
        .oneshot(authed_request(Method::GET, "/me", &token, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["username"], "alice");
}

#[tokio::test]
async fn test_session_crud_cycle() {
    let app = test_app().await;
    let token = register_user(&app, "alice").await;

    // Untitled sessions get the default title.
    let session_id = create_session(&app, &token, None).await;

    let response = app
        .clone()
        .oneshot(authed_request(Method::GET, "/sessions", &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["title"], "New Chat");

    // Rename it.
    let response = app
        .clone()
        .oneshot(authed_request(
            Method::PUT,
            &format!("/sessions/{session_id}"),
            &token,
            Some(json!({ "title": "Rust questions" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["title"], "Rust questions");

    // Detail view carries the (empty) message list.
    let response = app
        .clone()
        .oneshot(authed_request(
            Method::GET,
            &format!("/sessions/{session_id}"),
            &token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["id"], session_id.as_str());
    assert_eq!(json["messages"].as_array().unwrap().len(), 0);

    // Delete it.
    let response = app
        .clone()
        .oneshot(authed_request(
            Method::DELETE,
            &format!("/sessions/{session_id}"),
            &token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(authed_request(
            Method::GET,
            &format!("/sessions/{session_id}"),
            &token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sessions_are_scoped_per_user() {
    let app = test_app().await;
    let alice = register_user(&app, "alice").await;
    let bob = register_user(&app, "bob").await;

    let session_id = create_session(&app, &alice, Some("Alice's chat")).await;

    let response = app
        .clone()
        .oneshot(authed_request(
            Method::GET,
            &format!("/sessions/{session_id}"),
            &bob,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(authed_request(Method::GET, "/sessions", &bob, None))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_chat_stream_end_to_end() {
    let app = test_app().await;
    let token = register_user(&app, "alice").await;
    let session_id = create_session(&app, &token, None).await;

    let response = app
        .clone()
        .oneshot(authed_request(
            Method::POST,
            "/chat/stream",
            &token,
            Some(json!({
                "session_id": session_id,
                "prompt": "say hello",
                "provider": "scripted",
                "model": "test-model"
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let body = body_text(response).await;
    let events: Vec<&str> = body
        .split("\n\n")
        .filter(|chunk| !chunk.is_empty())
        .collect();
    assert_eq!(
        events,
        vec![
            "data: {\"delta\":\"Hello\"}",
            "data: {\"delta\":\" world\"}",
            "data: [DONE]",
        ]
    );

    // Both sides of the exchange were persisted.
    let response = app
        .oneshot(authed_request(
            Method::GET,
            &format!("/sessions/{session_id}"),
            &token,
            None,
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    let messages = json["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "say hello");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"], "Hello world");
}

#[tokio::test]
async fn test_chat_stream_unknown_provider_emits_error_event() {
    let app = test_app().await;
    let token = register_user(&app, "alice").await;
    let session_id = create_session(&app, &token, None).await;

    let response = app
        .clone()
        .oneshot(authed_request(
            Method::POST,
            "/chat/stream",
            &token,
            Some(json!({
                "session_id": session_id,
                "prompt": "hello",
                "provider": "mystery",
                "model": "test-model"
            })),
        ))
        .await
        .unwrap();

    // The response already committed to streaming, so the failure arrives
    // as an error event rather than a status code.
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("\"error\""));
    assert!(body.contains("unsupported provider: mystery"));
    assert!(!body.contains("[DONE]"));

    // The prompt was saved before provider resolution.
    let response = app
        .oneshot(authed_request(
            Method::GET,
            &format!("/sessions/{session_id}"),
            &token,
            None,
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    let messages = json["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["role"], "user");
}

#[tokio::test]
async fn test_chat_stream_mid_stream_failure_keeps_partial() {
    let app = test_app().await;
    let token = register_user(&app, "alice").await;
    let session_id = create_session(&app, &token, None).await;

    let response = app
        .clone()
        .oneshot(authed_request(
            Method::POST,
            "/chat/stream",
            &token,
            Some(json!({
                "session_id": session_id,
                "prompt": "hello",
                "provider": "flaky",
                "model": "test-model"
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("{\"delta\":\"partial\"}"));
    assert!(body.contains("\"error\""));
    assert!(!body.contains("[DONE]"));

    let response = app
        .oneshot(authed_request(
            Method::GET,
            &format!("/sessions/{session_id}"),
            &token,
            None,
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    let messages = json["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"], "partial");
}

#[tokio::test]
async fn test_chat_stream_missing_session_is_404() {
    let app = test_app().await;
    let token = register_user(&app, "alice").await;

    let response = app
        .oneshot(authed_request(
            Method::POST,
            "/chat/stream",
            &token,
            Some(json!({
                "session_id": "ses_missing",
                "prompt": "hello",
                "provider": "scripted",
                "model": "test-model"
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_chat_stream_foreign_session_is_404_with_no_writes() {
    let app = test_app().await;
    let alice = register_user(&app, "alice").await;
    let bob = register_user(&app, "bob").await;
    let session_id = create_session(&app, &alice, None).await;

    let response = app
        .clone()
        .oneshot(authed_request(
            Method::POST,
            "/chat/stream",
            &bob,
            Some(json!({
                "session_id": session_id,
                "prompt": "hello",
                "provider": "scripted",
                "model": "test-model"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Nothing was written to the other user's session.
    let response = app
        .oneshot(authed_request(
            Method::GET,
            &format!("/sessions/{session_id}"),
            &alice,
            None,
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["messages"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_chat_stream_rejects_empty_prompt() {
    let app = test_app().await;
    let token = register_user(&app, "alice").await;
    let session_id = create_session(&app, &token, None).await;

    let response = app
        .oneshot(authed_request(
            Method::POST,
            "/chat/stream",
            &token,
            Some(json!({
                "session_id": session_id,
                "prompt": "   ",
                "provider": "scripted",
                "model": "test-model"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_history_grows_across_turns() {
    let app = test_app().await;
    let token = register_user(&app, "alice").await;
    let session_id = create_session(&app, &token, None).await;

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(authed_request(
                Method::POST,
                "/chat/stream",
                &token,
                Some(json!({
                    "session_id": session_id,
                    "prompt": "again",
                    "provider": "scripted",
                    "model": "test-model"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        // Drain the stream to completion.
        body_text(response).await;
    }

    let response = app
        .oneshot(authed_request(
            Method::GET,
            &format!("/sessions/{session_id}"),
            &token,
            None,
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    let messages = json["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    let roles: Vec<&str> = messages
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["user", "assistant", "user", "assistant"]);
}
