//! Stream orchestration for one chat turn.
//!
//! Each request walks a one-directional lifecycle: persist the user
//! message, assemble history, open the provider stream, relay fragments
//! while accumulating them, then settle in exactly one terminal state.
//! There are no retries here; a failed or disconnected stream is final and
//! the client starts a fresh request if it wants another attempt.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, instrument, warn};

use crate::provider::ProviderRegistry;
use crate::session::{MessageRole, SessionRepository};

use super::history::HistoryAssembler;

/// Inter-fragment delay so slow consumers are not flooded.
pub const DEFAULT_PACING: Duration = Duration::from_millis(10);

/// One client-facing unit of stream output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// An incremental text fragment.
    Delta(String),
    /// A terminal, sanitized error description. Nothing follows it.
    Error(String),
    /// Normal completion sentinel. Nothing follows it.
    Done,
}

/// Terminal state of one chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    Disconnected,
    Failed,
}

/// Parameters of one chat turn, validated and ownership-checked upstream.
#[derive(Debug, Clone)]
pub struct ChatTurnRequest {
    pub user_id: String,
    pub session_id: String,
    pub provider: String,
    pub model: String,
    pub prompt: String,
}

#[derive(Clone)]
pub struct StreamOrchestrator {
    repo: SessionRepository,
    history: HistoryAssembler,
    registry: Arc<ProviderRegistry>,
    pacing: Duration,
}

impl StreamOrchestrator {
    pub fn new(repo: SessionRepository, registry: Arc<ProviderRegistry>, pacing: Duration) -> Self {
        Self {
            history: HistoryAssembler::new(repo.clone()),
            repo,
            registry,
            pacing,
        }
    }

    /// Runs one chat turn to its terminal state, sending events on `tx`.
    ///
    /// The user message is written before anything can fail downstream, so
    /// the prompt survives provider and transport trouble. A dropped
    /// receiver is the disconnect signal: relaying stops, no further
    /// fragments are pulled, and whatever accumulated is kept as a partial
    /// answer.
    #[instrument(skip(self, request, tx), fields(session_id = %request.session_id, provider = %request.provider))]
    pub async fn run(
        &self,
        request: ChatTurnRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> StreamOutcome {
        use futures::StreamExt;

        let user_message = match self
            .repo
            .append_message(
                &request.session_id,
                &request.user_id,
                MessageRole::User,
                &request.prompt,
            )
            .await
        {
            Ok(message) => message,
            Err(err) => {
                error!(error = %err, "failed to persist user message");
                let _ = tx
                    .send(StreamEvent::Error("failed to save message".to_string()))
                    .await;
                return StreamOutcome::Failed;
            }
        };

        let history = match self
            .history
            .load(&request.session_id, &request.user_id, &user_message.id)
            .await
        {
            Ok(history) => history,
            Err(err) => {
                error!(error = %err, "failed to load session history");
                let _ = tx
                    .send(StreamEvent::Error("failed to load history".to_string()))
                    .await;
                return StreamOutcome::Failed;
            }
        };

        // From here on the user message is already durable; resolution and
        // provider failures surface through the stream, not as a 4xx.
        let provider = match self.registry.resolve(&request.provider) {
            Ok(provider) => provider,
            Err(err) => {
                warn!(provider = %request.provider, "unknown provider requested");
                let _ = tx.send(StreamEvent::Error(err.to_string())).await;
                return StreamOutcome::Failed;
            }
        };

        let mut fragments = match provider
            .stream_chat(&request.prompt, &request.model, &history)
            .await
        {
            Ok(fragments) => fragments,
            Err(err) => {
                warn!(error = %err, "provider refused stream");
                let _ = tx.send(StreamEvent::Error(err.to_string())).await;
                return StreamOutcome::Failed;
            }
        };

        let mut accumulator = String::new();

        loop {
            // Liveness check between fragments. Once the receiver is gone
            // we stop pulling from the provider entirely.
            if tx.is_closed() {
                drop(fragments);
                self.persist_partial(&request, &accumulator).await;
                return StreamOutcome::Disconnected;
            }

            match fragments.next().await {
                Some(Ok(fragment)) => {
                    if tx.send(StreamEvent::Delta(fragment.clone())).await.is_err() {
                        // Receiver dropped while we awaited the fragment. It
                        // was never forwarded, so it is not part of the answer.
                        drop(fragments);
                        self.persist_partial(&request, &accumulator).await;
                        return StreamOutcome::Disconnected;
                    }
                    accumulator.push_str(&fragment);
                    if !self.pacing.is_zero() {
                        tokio::time::sleep(self.pacing).await;
                    }
                }
                Some(Err(err)) => {
                    warn!(error = %err, "provider stream failed");
                    self.persist_partial(&request, &accumulator).await;
                    let _ = tx.send(StreamEvent::Error(err.to_string())).await;
                    return StreamOutcome::Failed;
                }
                None => break,
            }
        }

        if !accumulator.is_empty() {
            if let Err(err) = self
                .repo
                .append_message(
                    &request.session_id,
                    &request.user_id,
                    MessageRole::Assistant,
                    &accumulator,
                )
                .await
            {
                error!(error = %err, "failed to persist assistant message");
                let _ = tx
                    .send(StreamEvent::Error("failed to save response".to_string()))
                    .await;
                return StreamOutcome::Failed;
            }
        }

        let _ = tx.send(StreamEvent::Done).await;
        StreamOutcome::Completed
    }

    /// Keeps a partial answer if any text accumulated before the stream
    /// ended abnormally. With no client left (or an error event about to
    /// go out instead), a write failure here can only be logged.
    async fn persist_partial(&self, request: &ChatTurnRequest, accumulator: &str) {
        if accumulator.is_empty() {
            return;
        }
        if let Err(err) = self
            .repo
            .append_message(
                &request.session_id,
                &request.user_id,
                MessageRole::Assistant,
                accumulator,
            )
            .await
        {
            error!(error = %err, "failed to persist partial assistant message");
        }
    }
}
