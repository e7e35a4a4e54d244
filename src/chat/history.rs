//! Conversation history assembly for provider calls.

use anyhow::Result;

use crate::provider::Turn;
use crate::session::SessionRepository;

/// Builds the prior-turn context handed to a provider.
///
/// The in-flight user message is persisted before the provider call, so it
/// is excluded here by id and passed to the adapter as the standalone
/// prompt instead. Truncation/summarization is left to the backends'
/// context windows.
#[derive(Clone)]
pub struct HistoryAssembler {
    repo: SessionRepository,
}

impl HistoryAssembler {
    pub fn new(repo: SessionRepository) -> Self {
        Self { repo }
    }

    /// All persisted turns of the session in creation order, minus the
    /// message identified by `exclude_message_id`.
    pub async fn load(
        &self,
        session_id: &str,
        user_id: &str,
        exclude_message_id: &str,
    ) -> Result<Vec<Turn>> {
        let messages = self.repo.list_messages(session_id, user_id).await?;
        Ok(messages
            .into_iter()
            .filter(|m| m.id != exclude_message_id)
            .map(|m| Turn::new(m.role, m.content))
            .collect())
    }
}
