use crate::domain::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LLMProvider {
    OpenAI,
    OpenRouter,
    Local,
    Gemini,
    Ollama,
}

impl LLMProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LLMProvider::OpenAI => "openai",
            LLMProvider::OpenRouter => "openrouter",
            LLMProvider::Local => "local",
            LLMProvider::Gemini => "gemini",
            LLMProvider::Ollama => "ollama",
        }
    }

    /// Endpoint used when the configuration does not name one.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            LLMProvider::OpenAI => "https://api.openai.com/v1",
            LLMProvider::OpenRouter => "https://openrouter.ai/api/v1",
            LLMProvider::Local => "http://localhost:1234/v1",
            LLMProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta/models",
            LLMProvider::Ollama => "http://localhost:11434",
        }
    }

    /// Model used when neither the session nor the provider settings name one.
    pub fn default_model(&self) -> &'static str {
        match self {
            LLMProvider::OpenAI => "gpt-4o-mini",
            LLMProvider::OpenRouter => "openai/gpt-4o-mini",
            LLMProvider::Local => "local-model",
            LLMProvider::Gemini => "gemini-1.5-flash",
            LLMProvider::Ollama => "llama3",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(
            self,
            LLMProvider::OpenAI | LLMProvider::OpenRouter | LLMProvider::Gemini
        )
    }
}

impl fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LLMProvider {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "openai" => Ok(LLMProvider::OpenAI),
            "openrouter" => Ok(LLMProvider::OpenRouter),
            "local" | "lmstudio" => Ok(LLMProvider::Local),
            "gemini" | "google" => Ok(LLMProvider::Gemini),
            "ollama" => Ok(LLMProvider::Ollama),
            other => Err(AppError::ConfigError(format!(
                "Unknown LLM provider '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::OpenAI,
            base_url: LLMProvider::OpenAI.default_base_url().to_string(),
            model: LLMProvider::OpenAI.default_model().to_string(),
            api_key: None,
            max_tokens: Some(2048),
            temperature: Some(0.7),
        }
    }
}
