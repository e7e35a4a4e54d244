//! Repository for session and message persistence.
//!
//! Every query is scoped to the acting user, so a caller can never read or
//! write another user's sessions through this layer.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::instrument;

use super::models::{ChatMessage, ChatSession, MessageRole};

/// Repository for chat session database operations.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn generate_id() -> String {
        format!("ses_{}", nanoid::nanoid!(12))
    }

    /// Create a new session for a user.
    #[instrument(skip(self))]
    pub async fn create(&self, user_id: &str, title: &str) -> Result<ChatSession> {
        let id = Self::generate_id();
        let created_at = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, title, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(title)
        .bind(&created_at)
        .execute(&self.pool)
        .await
        .context("inserting session")?;

        Ok(ChatSession {
            id,
            user_id: user_id.to_string(),
            title: title.to_string(),
            created_at,
        })
    }

    /// Get a session by ID, scoped to the owning user.
    #[instrument(skip(self))]
    pub async fn get(&self, session_id: &str, user_id: &str) -> Result<Option<ChatSession>> {
        sqlx::query_as::<_, ChatSession>(
            "SELECT id, user_id, title, created_at FROM sessions WHERE id = ? AND user_id = ?",
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("fetching session")
    }

    /// List a user's sessions, newest first.
    #[instrument(skip(self))]
    pub async fn list(&self, user_id: &str) -> Result<Vec<ChatSession>> {
        sqlx::query_as::<_, ChatSession>(
            r#"
            SELECT id, user_id, title, created_at
            FROM sessions
            WHERE user_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("listing sessions")
    }

    /// Rename a session. Returns false when the session does not exist or
    /// is not owned by the user.
    #[instrument(skip(self))]
    pub async fn rename(&self, session_id: &str, user_id: &str, title: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE sessions SET title = ? WHERE id = ? AND user_id = ?")
            .bind(title)
            .bind(session_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("renaming session")?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a session; owned messages are removed by the FK cascade.
    #[instrument(skip(self))]
    pub async fn delete(&self, session_id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ? AND user_id = ?")
            .bind(session_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("deleting session")?;

        Ok(result.rows_affected() > 0)
    }

    /// Append a message to a session's log.
    ///
    /// The write fails when the session is missing or not owned by the
    /// acting user, so the append-only log cannot leak across users.
    #[instrument(skip(self, content))]
    pub async fn append_message(
        &self,
        session_id: &str,
        user_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ChatMessage> {
        let id = format!("msg_{}", nanoid::nanoid!(12));
        let created_at = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO messages (id, session_id, role, content, created_at)
            SELECT ?, id, ?, ?, ?
            FROM sessions WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(&id)
        .bind(role.to_string())
        .bind(content)
        .bind(&created_at)
        .bind(session_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("inserting message")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("session not found: {}", session_id);
        }

        Ok(ChatMessage {
            id,
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            created_at,
        })
    }

    /// Load a session's messages in creation order, rowid breaking ties.
    #[instrument(skip(self))]
    pub async fn list_messages(&self, session_id: &str, user_id: &str) -> Result<Vec<ChatMessage>> {
        sqlx::query_as::<_, ChatMessage>(
            r#"
            SELECT m.id, m.session_id, m.role, m.content, m.created_at
            FROM messages m
            JOIN sessions s ON s.id = m.session_id
            WHERE m.session_id = ? AND s.user_id = ?
            ORDER BY m.created_at ASC, m.rowid ASC
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("listing messages")
    }

}
