//! Upstream AI providers behind one incremental-generation interface.
//!
//! Each adapter translates the uniform prompt/history/model input into its
//! backend's wire request, decodes that backend's incremental framing into
//! plain text fragments, and surfaces failures as a single [`ProviderError`].
//! Raw upstream payloads never cross this boundary.

mod anthropic;
mod gemini;
mod ollama;
mod openai;
mod registry;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use registry::{ProviderRegistry, UnsupportedProviderError};

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

use crate::session::MessageRole;

/// One prior conversation turn, oldest first when in a history slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: MessageRole,
    pub content: String,
}

impl Turn {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A lazy, finite sequence of non-empty text fragments in generation order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// Uniform incremental-generation interface over heterogeneous backends.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Backend identifier, e.g. "openai".
    fn name(&self) -> &'static str;

    /// Open a streaming generation for the prompt against the given model.
    ///
    /// `history` holds the prior turns only; the in-flight prompt is passed
    /// separately and must not appear in it.
    async fn stream_chat(
        &self,
        prompt: &str,
        model: &str,
        history: &[Turn],
    ) -> Result<FragmentStream, ProviderError>;
}

impl std::fmt::Debug for dyn ChatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatProvider")
            .field("name", &self.name())
            .finish()
    }
}

/// A failure from an upstream provider, with a sanitized human-readable
/// cause. Backend exception text is never embedded verbatim.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("authentication with {provider} failed (check API key)")]
    Auth { provider: &'static str },

    #[error("{provider} rate limit exceeded")]
    RateLimited { provider: &'static str },

    #[error("{provider} request failed with status {status}")]
    Upstream { provider: &'static str, status: u16 },

    #[error("could not reach {provider}: {message}")]
    Connection {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} returned an unreadable stream")]
    MalformedStream { provider: &'static str },

    #[error("{provider} error: {message}")]
    Other {
        provider: &'static str,
        message: String,
    },
}

/// Build the HTTP client adapters use. No overall request timeout: streams
/// stay open for the full generation, so only the connect phase is bounded.
pub(crate) fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_default()
}

/// Map an SSE transport error to a [`ProviderError`].
pub(crate) fn map_eventsource_error(
    provider: &'static str,
    err: reqwest_eventsource::Error,
) -> ProviderError {
    use reqwest_eventsource::Error;

    match err {
        Error::InvalidStatusCode(status, _) => match status.as_u16() {
            401 | 403 => ProviderError::Auth { provider },
            429 => ProviderError::RateLimited { provider },
            code => ProviderError::Upstream {
                provider,
                status: code,
            },
        },
        Error::Transport(e) => ProviderError::Connection {
            provider,
            message: connection_cause(&e),
        },
        Error::InvalidContentType(_, _) => ProviderError::Other {
            provider,
            message: "unexpected response content type".to_string(),
        },
        Error::Utf8(_) | Error::Parser(_) => ProviderError::MalformedStream { provider },
        other => ProviderError::Other {
            provider,
            message: other.to_string(),
        },
    }
}

/// Reduce a reqwest error to a short transport-level cause.
pub(crate) fn connection_cause(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "connection timed out".to_string()
    } else if err.is_connect() {
        "connection refused or unreachable".to_string()
    } else {
        "connection reset".to_string()
    }
}
