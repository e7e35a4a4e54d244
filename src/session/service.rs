//! Session service for business logic.

use anyhow::{Result, bail};
use tracing::{info, instrument};

use super::models::{ChatSession, SessionDetail};
use super::repository::SessionRepository;

/// Default title for sessions created without one.
pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

/// Service for chat session operations.
#[derive(Debug, Clone)]
pub struct SessionService {
    repo: SessionRepository,
}

impl SessionService {
    pub fn new(repo: SessionRepository) -> Self {
        Self { repo }
    }

    /// Create a new session. Empty or missing titles fall back to the default.
    #[instrument(skip(self))]
    pub async fn create_session(
        &self,
        user_id: &str,
        title: Option<String>,
    ) -> Result<ChatSession> {
        let title = match title {
            Some(t) if !t.trim().is_empty() => t,
            _ => DEFAULT_SESSION_TITLE.to_string(),
        };
        let session = self.repo.create(user_id, &title).await?;
        info!(session_id = %session.id, user_id = %user_id, "Created session");
        Ok(session)
    }

    /// List a user's sessions.
    #[instrument(skip(self))]
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>> {
        self.repo.list(user_id).await
    }

    /// Get a session, failing when it is missing or not owned by the caller.
    #[instrument(skip(self))]
    pub async fn require_session(&self, session_id: &str, user_id: &str) -> Result<ChatSession> {
        match self.repo.get(session_id, user_id).await? {
            Some(session) => Ok(session),
            None => bail!("Session not found: {}", session_id),
        }
    }

    /// Get a session with its messages in creation order.
    #[instrument(skip(self))]
    pub async fn get_session_detail(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<SessionDetail> {
        let session = self.require_session(session_id, user_id).await?;
        let messages = self.repo.list_messages(session_id, user_id).await?;
        Ok(SessionDetail { session, messages })
    }

    /// Rename a session.
    #[instrument(skip(self))]
    pub async fn rename_session(
        &self,
        session_id: &str,
        user_id: &str,
        title: &str,
    ) -> Result<ChatSession> {
        if title.trim().is_empty() {
            bail!("Invalid title: must not be empty");
        }
        if !self.repo.rename(session_id, user_id, title).await? {
            bail!("Session not found: {}", session_id);
        }
        info!(session_id = %session_id, "Renamed session");
        self.require_session(session_id, user_id).await
    }

    /// Delete a session and all of its messages.
    #[instrument(skip(self))]
    pub async fn delete_session(&self, session_id: &str, user_id: &str) -> Result<()> {
        if !self.repo.delete(session_id, user_id).await? {
            bail!("Session not found: {}", session_id);
        }
        info!(session_id = %session_id, "Deleted session");
        Ok(())
    }
}
