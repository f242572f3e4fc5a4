pub mod gemini;
pub mod ollama;
pub mod openai;

use crate::domain::error::Result;
use crate::domain::llm_config::LLMConfig;
use crate::domain::llm_config::LLMProvider;
use crate::infrastructure::config::ConfigService;
use async_trait::async_trait;
use gemini::GeminiClient;
use ollama::OllamaClient;
use openai::OpenAIClient;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait LLMClient {
    /// Generates a completion. Output is cut at the first of `stop`, when the provider supports it.
    async fn generate(
        &self,
        config: &LLMConfig,
        system: &str,
        user: &str,
        stop: &[String],
    ) -> Result<String>;
}

pub struct RouterClient {
    openai: OpenAIClient,
    gemini: GeminiClient,
    ollama: OllamaClient,
}

impl RouterClient {
    pub fn new() -> Self {
        Self {
            openai: OpenAIClient::new(),
            gemini: GeminiClient::new(),
            ollama: OllamaClient::new(),
        }
    }

    /// Per-provider timeouts from configuration. The OpenAI-compatible client serves
    /// OpenRouter and local servers too and takes the longest of their timeouts.
    pub fn from_config(config: &ConfigService) -> Self {
        let openai_timeout = [LLMProvider::OpenAI, LLMProvider::OpenRouter, LLMProvider::Local]
            .into_iter()
            .map(|provider| config.timeout_secs(provider))
            .max()
            .unwrap_or(120);
        Self {
            openai: OpenAIClient::with_timeout(openai_timeout),
            gemini: GeminiClient::with_timeout(config.timeout_secs(LLMProvider::Gemini)),
            ollama: OllamaClient::with_timeout(config.timeout_secs(LLMProvider::Ollama)),
        }
    }
}

impl Default for RouterClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMClient for RouterClient {
    async fn generate(
        &self,
        config: &LLMConfig,
        system: &str,
        user: &str,
        stop: &[String],
    ) -> Result<String> {
        match config.provider {
            LLMProvider::Gemini => self.gemini.generate(config, system, user, stop).await,
            LLMProvider::Ollama => self.ollama.generate(config, system, user, stop).await,
            LLMProvider::OpenAI | LLMProvider::OpenRouter | LLMProvider::Local => {
                self.openai.generate(config, system, user, stop).await
            }
        }
    }
}

/// A named model endpoint: one client bound to one configuration.
///
/// The pipeline holds two of these, the user-selected `primary` backend and the fixed
/// `critique` backend.
#[derive(Clone)]
pub struct ModelBackend {
    name: &'static str,
    client: Arc<dyn LLMClient + Send + Sync>,
    config: LLMConfig,
}

impl ModelBackend {
    pub const PRIMARY: &'static str = "primary";
    pub const CRITIQUE: &'static str = "critique";

    pub fn new(
        name: &'static str,
        client: Arc<dyn LLMClient + Send + Sync>,
        config: LLMConfig,
    ) -> Self {
        Self {
            name,
            client,
            config,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn config(&self) -> &LLMConfig {
        &self.config
    }

    pub async fn invoke(&self, prompt: &str) -> Result<String> {
        self.invoke_with_stop(prompt, &[]).await
    }

    pub async fn invoke_with_stop(&self, prompt: &str, stop: &[String]) -> Result<String> {
        debug!(
            backend = self.name,
            provider = %self.config.provider,
            model = %self.config.model,
            prompt_chars = prompt.len(),
            "Invoking model"
        );
        self.client.generate(&self.config, "", prompt, stop).await
    }
}

impl std::fmt::Debug for ModelBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBackend")
            .field("name", &self.name)
            .field("provider", &self.config.provider)
            .field("model", &self.config.model)
            .finish()
    }
}
