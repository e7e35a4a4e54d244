//! Chat session and message data models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Role of a chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            _ => Err(format!("unknown message role: {}", s)),
        }
    }
}

impl TryFrom<String> for MessageRole {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A chat session owned by a user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChatSession {
    /// Unique session ID.
    pub id: String,
    /// User ID who owns this session.
    pub user_id: String,
    /// Display title.
    pub title: String,
    /// When the session was created (RFC 3339).
    pub created_at: String,
}

/// A persisted chat message. Content is immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChatMessage {
    /// Unique message ID.
    pub id: String,
    /// Session this message belongs to.
    pub session_id: String,
    /// Author role.
    #[sqlx(try_from = "String")]
    pub role: MessageRole,
    /// Message text.
    pub content: String,
    /// When the message was created (RFC 3339).
    pub created_at: String,
}

/// Request to create a new session.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateSessionRequest {
    /// Optional title; defaults to "New Chat".
    #[serde(default)]
    pub title: Option<String>,
}

/// Request to rename a session.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSessionRequest {
    pub title: String,
}

/// Session detail including its messages in creation order.
#[derive(Debug, Clone, Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: ChatSession,
    pub messages: Vec<ChatMessage>,
}
