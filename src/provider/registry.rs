//! Provider registry: maps provider ids to adapter factories.
//!
//! Resolution fails closed: an id that was never registered yields
//! [`UnsupportedProviderError`] and no upstream connection is attempted.
//! Adapters are constructed fresh per resolution so no connection state
//! leaks between chat turns.

use std::collections::HashMap;

use crate::config::ProvidersConfig;

use super::{AnthropicProvider, ChatProvider, GeminiProvider, OllamaProvider, OpenAiProvider};

type ProviderFactory = Box<dyn Fn() -> Box<dyn ChatProvider> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
#[error("unsupported provider: {0}")]
pub struct UnsupportedProviderError(pub String);

#[derive(Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry with the built-in adapters, wired with the
    /// credentials and endpoints from configuration.
    pub fn from_config(config: &ProvidersConfig) -> Self {
        let mut registry = Self::new();

        let openai = config.openai.clone();
        registry.register("openai", move || {
            Box::new(OpenAiProvider::new(
                openai.api_key.clone().unwrap_or_default(),
                openai.base_url.as_deref(),
            ))
        });

        let gemini = config.gemini.clone();
        registry.register("gemini", move || {
            Box::new(GeminiProvider::new(
                gemini.api_key.clone().unwrap_or_default(),
                gemini.base_url.as_deref(),
            ))
        });

        let anthropic = config.anthropic.clone();
        registry.register("anthropic", move || {
            Box::new(AnthropicProvider::new(
                anthropic.api_key.clone().unwrap_or_default(),
                anthropic.base_url.as_deref(),
            ))
        });

        let ollama = config.ollama.clone();
        registry.register("ollama", move || {
            Box::new(OllamaProvider::new(ollama.base_url.as_deref()))
        });

        registry
    }

    /// Registers (or replaces) a factory under the given id.
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn ChatProvider> + Send + Sync + 'static,
    {
        self.factories.insert(id.into(), Box::new(factory));
    }

    /// Constructs a fresh adapter for the given id.
    pub fn resolve(
        &self,
        id: &str,
    ) -> Result<Box<dyn ChatProvider>, UnsupportedProviderError> {
        self.factories
            .get(id)
            .map(|factory| factory())
            .ok_or_else(|| UnsupportedProviderError(id.to_string()))
    }

    /// Ids currently registered, sorted for stable output.
    pub fn known_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.factories.keys().cloned().collect();
        ids.sort();
        ids
    }
}
