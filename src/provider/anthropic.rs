//! Anthropic messages-API streaming adapter.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{
    ChatProvider, FragmentStream, ProviderError, Turn, build_http_client, map_eventsource_error,
};
use crate::session::MessageRole;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;
const PROVIDER: &str = "anthropic";

/// Adapter for the Anthropic messages API.
pub struct AnthropicProvider {
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
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<WireMessage>,
    stream: bool,
}

/// Streaming frame. Only `content_block_delta` frames carry text; everything
/// else (message_start, ping, content_block_stop, ...) is control traffic.
#[derive(Debug, Deserialize)]
struct StreamFrame {
    #[serde(rename = "type")]
    frame_type: String,
    #[serde(default)]
    delta: Option<FrameDelta>,
    #[serde(default)]
    error: Option<FrameError>,
}

#[derive(Debug, Deserialize)]
struct FrameDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FrameError {
    #[serde(rename = "type", default)]
    error_type: String,
}

impl AnthropicProvider {
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
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
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
impl ChatProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn stream_chat(
        &self,
        prompt: &str,
        model: &str,
        history: &[Turn],
    ) -> Result<FragmentStream, ProviderError> {
        let body = MessagesRequest {
            model: model.to_string(),
            max_tokens: MAX_TOKENS,
            messages: Self::wire_messages(prompt, history),
            stream: true,
        };

        let mut source = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
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
                        match serde_json::from_str::<StreamFrame>(&message.data) {
                            Ok(frame) => match frame.frame_type.as_str() {
                                "content_block_delta" => {
                                    let text = frame
                                        .delta
                                        .and_then(|d| d.text)
                                        .filter(|t| !t.is_empty());
                                    if let Some(text) = text {
                                        yielded += 1;
                                        yield Ok(text);
                                    }
                                }
                                "message_stop" => {
                                    source.close();
                                    break;
                                }
                                "error" => {
                                    let cause = frame
                                        .error
                                        .map(|e| e.error_type)
                                        .unwrap_or_else(|| "unknown".to_string());
                                    yield Err(ProviderError::Other {
                                        provider: PROVIDER,
                                        message: format!("upstream reported {}", cause),
                                    });
                                    source.close();
                                    break;
                                }
                                // message_start, ping, content_block_start,
                                // content_block_stop, message_delta
                                _ => {}
                            },
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
