//! OpenAI chat-completions streaming adapter.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{
    ChatProvider, FragmentStream, ProviderError, Turn, build_http_client, map_eventsource_error,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const PROVIDER: &str = "openai";

/// Adapter for the OpenAI chat completions API.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

impl CompletionChunk {
    /// Extract the delta text, if the chunk carries any.
    fn delta_text(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|s| !s.is_empty())
    }
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>) -> Self {
        Self {
            client: build_http_client(),
            api_key: api_key.into(),
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/').to_string(),
        }
    }

    fn wire_messages(prompt: &str, history: &[Turn]) -> Vec<WireMessage> {
        let mut messages: Vec<WireMessage> = history
            .iter()
            .map(|turn| WireMessage {
                role: match turn.role {
                    crate::session::MessageRole::User => "user",
                    crate::session::MessageRole::Assistant => "assistant",
                },
                content: turn.content.clone(),
            })
            .collect();
        messages.push(WireMessage {
            role: "user",
            content: prompt.to_string(),
        });
        messages
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn stream_chat(
        &self,
        prompt: &str,
        model: &str,
        history: &[Turn],
    ) -> Result<FragmentStream, ProviderError> {
        let body = CompletionRequest {
            model: model.to_string(),
            messages: Self::wire_messages(prompt, history),
            stream: true,
        };

        let mut source = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .eventsource()
            .map_err(|e| ProviderError::Other {
                provider: PROVIDER,
                message: e.to_string(),
            })?;

        let stream = async_stream::stream! {
            let mut yielded = 0usize;
            let mut malformed = 0usize;

            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => {}
                    Ok(Event::Message(message)) => {
                        if message.data == "[DONE]" {
                            source.close();
                            break;
                        }
                        match serde_json::from_str::<CompletionChunk>(&message.data) {
                            Ok(chunk) => {
                                if let Some(text) = chunk.delta_text() {
                                    yielded += 1;
                                    yield Ok(text);
                                }
                            }
                            Err(err) => {
                                malformed += 1;
                                warn!(provider = PROVIDER, error = %err, "skipping malformed stream payload");
                            }
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(err) => {
                        yield Err(map_eventsource_error(PROVIDER, err));
                        break;
                    }
                }
            }

            // A stream that only ever produced undecodable payloads is a
            // provider failure, not silence.
            if yielded == 0 && malformed > 0 {
                yield Err(ProviderError::MalformedStream { provider: PROVIDER });
            }
        };

        Ok(Box::pin(stream))
    }
}
