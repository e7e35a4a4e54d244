//! API request handlers.

use std::convert::Infallible;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    response::sse::{Event, Sse},
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tracing::{info, instrument};

use crate::auth::CurrentUser;
use crate::chat::{ChatTurnRequest, StreamEvent};
use crate::session::{CreateSessionRequest, UpdateSessionRequest};
use crate::user::UserInfo;

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let healthy = state.db.is_healthy().await;
    let status = if healthy {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    (
        status.0,
        Json(HealthResponse {
            status: status.1.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Registration request.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Login request. Accounts are identified by email.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token response shared by register and login.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub user: UserInfo,
}

/// Register a new user and log them in.
#[instrument(skip(state, request), fields(username = %request.username))]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .users
        .register(&request.username, &request.email, &request.password)
        .await?;
    let token = state.auth.generate_token(&user)?;

    info!(user_id = %user.id, username = %user.username, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            token,
            user: user.into(),
        }),
    ))
}

/// Login endpoint.
#[instrument(skip(state, request))]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let user = state
        .users
        .verify_credentials(&request.email, &request.password)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;

    let token = state.auth.generate_token(&user)?;

    info!(user_id = %user.id, "User logged in");

    Ok(Json(TokenResponse {
        token,
        user: user.into(),
    }))
}

/// Current user's profile.
pub async fn get_me(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Json<UserInfo>> {
    let user = state
        .users
        .get_user(user.id())
        .await?
        .ok_or_else(|| ApiError::not_found(format!("User not found: {}", user.id())))?;
    Ok(Json(user.into()))
}

/// List the caller's sessions, newest first.
pub async fn list_sessions(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    let sessions = state.sessions.list_sessions(user.id()).await?;
    Ok(Json(sessions))
}

/// Create a new session.
#[instrument(skip(state, user))]
pub async fn create_session(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<impl IntoResponse> {
    let session = state
        .sessions
        .create_session(user.id(), request.title)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// Get a session with its full message history.
pub async fn get_session(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let detail = state
        .sessions
        .get_session_detail(&session_id, user.id())
        .await?;
    Ok(Json(detail))
}

/// Rename a session.
#[instrument(skip(state, user, request))]
pub async fn rename_session(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(session_id): Path<String>,
    Json(request): Json<UpdateSessionRequest>,
) -> ApiResult<impl IntoResponse> {
    let session = state
        .sessions
        .rename_session(&session_id, user.id(), &request.title)
        .await?;
    Ok(Json(session))
}

/// Delete a session and its messages.
#[instrument(skip(state, user))]
pub async fn delete_session(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(session_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.sessions.delete_session(&session_id, user.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Chat stream request.
#[derive(Debug, Deserialize)]
pub struct ChatStreamRequest {
    pub session_id: String,
    pub prompt: String,
    pub provider: String,
    pub model: String,
}

/// Stream one chat turn as server-sent events.
///
/// Ownership is validated before the response commits to streaming, so a
/// missing or foreign session is still an ordinary 404 with nothing
/// persisted. Everything after that surfaces through the event stream:
/// `{"delta": ...}` fragments, at most one `{"error": ...}`, and a literal
/// `[DONE]` sentinel on normal completion. Nothing follows the sentinel or
/// an error event, so the stream carries no keep-alive comments.
#[instrument(skip(state, user, request), fields(session_id = %request.session_id, provider = %request.provider))]
pub async fn chat_stream(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<ChatStreamRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    if request.prompt.trim().is_empty() {
        return Err(ApiError::bad_request("Prompt must not be empty"));
    }

    state
        .sessions
        .require_session(&request.session_id, user.id())
        .await?;

    let turn = ChatTurnRequest {
        user_id: user.id().to_string(),
        session_id: request.session_id,
        provider: request.provider,
        model: request.model,
        prompt: request.prompt,
    };

    // Capacity 1: at most one undelivered fragment sits in the channel, so
    // the per-fragment liveness check tracks what the client actually
    // received when deciding how much of a partial response to keep.
    let (tx, rx) = mpsc::channel(1);
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        let outcome = orchestrator.run(turn, tx).await;
        info!(?outcome, "chat turn finished");
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        let event = match event {
            StreamEvent::Delta(text) => {
                Event::default().data(json!({ "delta": text }).to_string())
            }
            StreamEvent::Error(message) => {
                Event::default().data(json!({ "error": message }).to_string())
            }
            StreamEvent::Done => Event::default().data("[DONE]"),
        };
        Ok(event)
    });

    Ok(Sse::new(stream))
}
