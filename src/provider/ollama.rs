//! Ollama local-model streaming adapter.
//!
//! Talks to the `/api/generate` endpoint, which frames its stream as one
//! JSON object per line rather than SSE. The generate endpoint is prompt
//! oriented; history turns are not transmitted.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{ChatProvider, FragmentStream, ProviderError, Turn, build_http_client, connection_cause};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const PROVIDER: &str = "ollama";

/// Adapter for a local Ollama server.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
}

impl OllamaProvider {
    pub fn new(base_url: Option<&str>) -> Self {
        Self {
            client: build_http_client(),
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn stream_chat(
        &self,
        prompt: &str,
        model: &str,
        _history: &[Turn],
    ) -> Result<FragmentStream, ProviderError> {
        let body = GenerateRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Connection {
                provider: PROVIDER,
                message: connection_cause(&e),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status.as_u16() {
                401 | 403 => ProviderError::Auth { provider: PROVIDER },
                429 => ProviderError::RateLimited { provider: PROVIDER },
                code => ProviderError::Upstream {
                    provider: PROVIDER,
                    status: code,
                },
            });
        }

        let mut bytes = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer: Vec<u8> = Vec::new();
            let mut yielded = 0usize;
            let mut malformed = 0usize;
            let mut done = false;

            'outer: while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        yield Err(ProviderError::Connection {
                            provider: PROVIDER,
                            message: connection_cause(&err),
                        });
                        break;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    match serde_json::from_str::<GenerateChunk>(line) {
                        Ok(parsed) => {
                            if parsed.done {
                                done = true;
                                break 'outer;
                            }
                            let text = parsed.response.filter(|t| !t.is_empty());
                            if let Some(text) = text {
                                yielded += 1;
                                yield Ok(text);
                            }
                        }
                        Err(err) => {
                            malformed += 1;
                            warn!(provider = PROVIDER, error = %err, "could not decode stream line");
                        }
                    }
                }
            }

            if !done && yielded == 0 && malformed > 0 {
                yield Err(ProviderError::MalformedStream { provider: PROVIDER });
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::serve_once;

    #[test]
    fn test_chunk_parsing() {
        let chunk: GenerateChunk =
            serde_json::from_str(r#"{"model":"llama3","response":"Hi","done":false}"#).unwrap();
        assert_eq!(chunk.response.as_deref(), Some("Hi"));
        assert!(!chunk.done);

        let last: GenerateChunk =
            serde_json::from_str(r#"{"model":"llama3","response":"","done":true}"#).unwrap();
        assert!(last.done);

        assert!(serde_json::from_str::<GenerateChunk>("not json").is_err());
    }

    #[tokio::test]
    async fn test_stream_skips_malformed_lines() {
        let base = serve_once(
            "application/x-ndjson",
            vec![
                "{\"response\":\"Hel\",\"done\":false}\n",
                "this is not json\n",
                "{\"response\":\"lo\",\"done\":false}\n",
                "{\"response\":\"\",\"done\":true}\n",
            ],
        )
        .await;
        let provider = OllamaProvider::new(Some(&base));

        let events: Vec<_> = provider
            .stream_chat("hi", "llama3", &[])
            .await
            .unwrap()
            .collect()
            .await;
        let fragments: Vec<String> = events.into_iter().collect::<Result<_, _>>().unwrap();
        assert_eq!(fragments, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_all_malformed_stream_yields_single_error() {
        let base = serve_once(
            "application/x-ndjson",
            vec!["this is not json\n", "neither is this\n"],
        )
        .await;
        let provider = OllamaProvider::new(Some(&base));

        let mut events: Vec<_> = provider
            .stream_chat("hi", "llama3", &[])
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events.pop(),
            Some(Err(ProviderError::MalformedStream { provider: "ollama" }))
        ));
    }

    #[tokio::test]
    async fn test_line_split_across_chunks_is_reassembled() {
        // A JSON line arriving in two transport chunks must decode as one
        // fragment once the newline lands.
        let base = serve_once(
            "application/x-ndjson",
            vec![
                "{\"response\":\"Hel",
                "lo\",\"done\":false}\n{\"response\":\" world\",\"done\":false}\n",
                "{\"response\":\"\",\"done\":true}\n",
            ],
        )
        .await;
        let provider = OllamaProvider::new(Some(&base));

        let events: Vec<_> = provider
            .stream_chat("hi", "llama3", &[])
            .await
            .unwrap()
            .collect()
            .await;
        let fragments: Vec<String> = events.into_iter().collect::<Result<_, _>>().unwrap();
        assert_eq!(fragments, vec!["Hello", " world"]);
    }
}
