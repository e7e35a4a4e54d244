//! Google Gemini streaming adapter.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{
    ChatProvider, FragmentStream, ProviderError, Turn, build_http_client, map_eventsource_error,
};
use crate::session::MessageRole;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const PROVIDER: &str = "gemini";

/// Adapter for the Gemini generateContent API.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct WireContent {
    role: &'static str,
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
struct WirePart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<WireContent>,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateChunk {
    /// Concatenate the chunk's text parts, if any.
    fn text(self) -> Option<String> {
        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() { None } else { Some(text) }
    }
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>) -> Self {
        Self {
            client: build_http_client(),
            api_key: api_key.into(),
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/').to_string(),
        }
    }

    /// Gemini names the assistant role "model".
    fn wire_contents(prompt: &str, history: &[Turn]) -> Vec<WireContent> {
        let mut contents: Vec<WireContent> = history
            .iter()
            .map(|turn| WireContent {
                role: match turn.role {
                    MessageRole::User => "user",
                    MessageRole::Assistant => "model",
                },
                parts: vec![WirePart {
                    text: turn.content.clone(),
                }],
            })
            .collect();
        contents.push(WireContent {
            role: "user",
            parts: vec![WirePart {
                text: prompt.to_string(),
            }],
        });
        contents
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn stream_chat(
        &self,
        prompt: &str,
        model: &str,
        history: &[Turn],
    ) -> Result<FragmentStream, ProviderError> {
        let body = GenerateRequest {
            contents: Self::wire_contents(prompt, history),
        };

        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, model
        );

        let mut source = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
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
                        match serde_json::from_str::<GenerateChunk>(&message.data) {
                            Ok(chunk) => {
                                if let Some(text) = chunk.text() {
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

            if yielded == 0 && malformed > 0 {
                yield Err(ProviderError::MalformedStream { provider: PROVIDER });
            }
        };

        Ok(Box::pin(stream))
    }
}
