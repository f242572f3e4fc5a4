//! Layered configuration: built-in defaults, then `sqlsight.toml`, then `SQLSIGHT_*` env vars.
//!
//! Nested keys use a double underscore in the environment, e.g. `SQLSIGHT_DATABASE__URL` or
//! `SQLSIGHT_PROVIDERS__OPENAI__API_KEY`.

use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{LLMConfig, LLMProvider};
use crate::domain::session::SessionContext;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

pub const ENV_PREFIX: &str = "SQLSIGHT_";
pub const DEFAULT_CONFIG_FILE: &str = "sqlsight.toml";
const KEYRING_SERVICE: &str = "sqlsight";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    pub query_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://analytics.db".to_string(),
            max_connections: 5,
            connect_timeout_secs: 10,
            query_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Model for sessions on this provider that did not pick one.
    pub default_model: Option<String>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            default_model: None,
            max_tokens: Some(2048),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai: ProviderSettings,
    pub openrouter: ProviderSettings,
    pub local: ProviderSettings,
    pub gemini: ProviderSettings,
    pub ollama: ProviderSettings,
}

impl ProvidersConfig {
    pub fn get(&self, provider: LLMProvider) -> &ProviderSettings {
        match provider {
            LLMProvider::OpenAI => &self.openai,
            LLMProvider::OpenRouter => &self.openrouter,
            LLMProvider::Local => &self.local,
            LLMProvider::Gemini => &self.gemini,
            LLMProvider::Ollama => &self.ollama,
        }
    }
}

/// The fixed secondary backend that reviews every answer. Not user-selectable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CritiqueConfig {
    pub enabled: bool,
    pub provider: LLMProvider,
    pub model: String,
    pub temperature: f32,
}

impl Default for CritiqueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: LLMProvider::Ollama,
            model: "deepseek-r1:8b".to_string(),
            temperature: 0.7,
        }
    }
}

/// Fallback selection for hosts that pass no session of their own. `model` applies only to
/// `provider`; other providers fall back to their own `default_model`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub provider: LLMProvider,
    pub model: String,
    pub temperature: f32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::OpenAI,
            model: LLMProvider::OpenAI.default_model().to_string(),
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub providers: ProvidersConfig,
    pub critique: CritiqueConfig,
    pub defaults: DefaultsConfig,
}

impl AppConfig {
    pub fn figment(path: Option<&Path>) -> Figment {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Loads `.env` (if present) and then the layered configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Err(err) = dotenvy::dotenv() {
            debug!("No .env file loaded: {}", err);
        }
        let config: AppConfig = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(AppError::ConfigError("database.url must be set".to_string()));
        }
        if self.critique.model.trim().is_empty() {
            return Err(AppError::ConfigError("critique.model must be set".to_string()));
        }
        for (name, temperature) in [
            ("critique.temperature", self.critique.temperature),
            ("defaults.temperature", self.defaults.temperature),
        ] {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(AppError::ConfigError(format!(
                    "{} must be between 0 and 2, got {}",
                    name, temperature
                )));
            }
        }
        for provider in [
            LLMProvider::OpenAI,
            LLMProvider::OpenRouter,
            LLMProvider::Local,
            LLMProvider::Gemini,
            LLMProvider::Ollama,
        ] {
            if let Some(base_url) = self.providers.get(provider).base_url.as_deref() {
                url::Url::parse(base_url).map_err(|e| {
                    AppError::ConfigError(format!(
                        "providers.{}.base_url is not a valid URL: {}",
                        provider, e
                    ))
                })?;
            }
        }
        Ok(())
    }
}

/// Resolves provider settings and secrets into ready-to-use model configurations.
pub struct ConfigService {
    config: AppConfig,
    keyring_service: String,
}

impl ConfigService {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            keyring_service: KEYRING_SERVICE.to_string(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn entry(&self, provider: LLMProvider) -> Result<Entry> {
        Entry::new(&self.keyring_service, provider.as_str())
            .map_err(|e| AppError::SecurityError(format!("Failed to create entry: {}", e)))
    }

    pub fn save_api_key(&self, provider: LLMProvider, key: &str) -> Result<()> {
        self.entry(provider)?
            .set_password(key)
            .map_err(|e| AppError::SecurityError(format!("Failed to set password: {}", e)))
    }

    pub fn get_api_key(&self, provider: LLMProvider) -> Result<String> {
        self.entry(provider)?
            .get_password()
            .map_err(|e| AppError::SecurityError(format!("Failed to get password: {}", e)))
    }

    pub fn delete_api_key(&self, provider: LLMProvider) -> Result<()> {
        self.entry(provider)?
            .delete_credential()
            .map_err(|e| AppError::SecurityError(format!("Failed to delete password: {}", e)))
    }

    /// Configured key first, then the OS keychain. Providers without keys resolve to `None`.
    pub fn resolve_api_key(&self, provider: LLMProvider) -> Option<String> {
        let settings = self.config.providers.get(provider);
        if let Some(key) = settings.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Some(key.clone());
        }
        if !provider.requires_api_key() {
            return None;
        }
        match self.get_api_key(provider) {
            Ok(key) => Some(key),
            Err(err) => {
                warn!(provider = %provider, "No API key configured or stored: {}", err);
                None
            }
        }
    }

    /// Builds the configuration for a provider/model/temperature selection.
    pub fn llm_config(
        &self,
        provider: LLMProvider,
        model_name: Option<&str>,
        temperature: f32,
    ) -> LLMConfig {
        let settings = self.config.providers.get(provider);
        let model = model_name
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.default_model(provider));

        LLMConfig {
            provider,
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| provider.default_base_url().to_string()),
            model,
            api_key: self.resolve_api_key(provider),
            max_tokens: settings.max_tokens,
            temperature: Some(temperature),
        }
    }

    /// Session-independent fallback model for a provider.
    pub fn default_model(&self, provider: LLMProvider) -> String {
        let defaults = &self.config.defaults;
        if provider == defaults.provider && !defaults.model.trim().is_empty() {
            return defaults.model.clone();
        }
        self.config
            .providers
            .get(provider)
            .default_model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| provider.default_model())
            .to_string()
    }

    /// Session for hosts that did not make a provider selection.
    pub fn default_session(&self) -> SessionContext {
        let defaults = &self.config.defaults;
        SessionContext::new(
            defaults.provider,
            Some(defaults.model.clone()).filter(|m| !m.trim().is_empty()),
            defaults.temperature,
        )
    }

    pub fn critique_llm_config(&self) -> LLMConfig {
        let critique = &self.config.critique;
        self.llm_config(critique.provider, Some(&critique.model), critique.temperature)
    }

    pub fn timeout_secs(&self, provider: LLMProvider) -> u64 {
        self.config.providers.get(provider).timeout_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_point_critique_at_ollama() {
        let config = AppConfig::default();
        assert_eq!(config.critique.provider, LLMProvider::Ollama);
        assert_eq!(config.critique.temperature, 0.7);
        assert_eq!(config.defaults.provider, LLMProvider::OpenAI);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_and_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
                [database]
                url = "postgres://analytics@localhost/warehouse"

                [critique]
                model = "qwen3:8b"

                [providers.openai]
                api_key = "from-file"
                "#,
            )?;
            jail.set_env("SQLSIGHT_CRITIQUE__TEMPERATURE", "0.2");
            jail.set_env("SQLSIGHT_DATABASE__QUERY_TIMEOUT_SECS", "5");

            let config: AppConfig = AppConfig::figment(None).extract()?;
            assert_eq!(config.database.url, "postgres://analytics@localhost/warehouse");
            assert_eq!(config.database.query_timeout_secs, 5);
            assert_eq!(config.database.max_connections, 5);
            assert_eq!(config.critique.model, "qwen3:8b");
            assert!((config.critique.temperature - 0.2).abs() < f32::EPSILON);
            assert_eq!(config.critique.provider, LLMProvider::Ollama);
            assert_eq!(config.providers.openai.api_key.as_deref(), Some("from-file"));
            Ok(())
        });
    }

    #[test]
    fn test_validate_rejects_out_of_range_temperature() {
        let mut config = AppConfig::default();
        config.critique.temperature = 3.5;
        assert!(matches!(config.validate(), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_validate_rejects_malformed_base_url() {
        let mut config = AppConfig::default();
        config.providers.ollama.base_url = Some("not a url".to_string());
        assert!(matches!(config.validate(), Err(AppError::ConfigError(msg)) if msg.contains("ollama")));

        config.providers.ollama.base_url = Some("http://gpu-box:11434".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_llm_config_uses_configured_key_and_default_url() {
        let mut config = AppConfig::default();
        config.providers.openai.api_key = Some("sk-test".to_string());
        let service = ConfigService::new(config);

        let llm = service.llm_config(LLMProvider::OpenAI, Some("gpt-4o"), 0.3);
        assert_eq!(llm.model, "gpt-4o");
        assert_eq!(llm.base_url, "https://api.openai.com/v1");
        assert_eq!(llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(llm.temperature, Some(0.3));
    }

    #[test]
    fn test_default_model_only_applies_to_default_provider() {
        let service = ConfigService::new(AppConfig::default());
        let llm = service.llm_config(LLMProvider::Ollama, None, 0.7);
        assert_eq!(llm.model, "llama3");
        assert_eq!(llm.base_url, "http://localhost:11434");
        assert_eq!(llm.api_key, None);

        let mut config = AppConfig::default();
        config.defaults.provider = LLMProvider::Local;
        config.defaults.model = "qwen2.5-coder".to_string();
        config.providers.ollama.default_model = Some("mistral".to_string());
        let service = ConfigService::new(config);
        assert_eq!(
            service.llm_config(LLMProvider::Local, Some("  "), 0.7).model,
            "qwen2.5-coder"
        );
        assert_eq!(service.llm_config(LLMProvider::Ollama, None, 0.7).model, "mistral");
        assert_eq!(
            service.llm_config(LLMProvider::Gemini, None, 0.7).model,
            "gemini-1.5-flash"
        );
    }

    #[test]
    fn test_default_session_comes_from_defaults_section() {
        let mut config = AppConfig::default();
        config.defaults.provider = LLMProvider::Ollama;
        config.defaults.model = "llama3.1".to_string();
        config.defaults.temperature = 0.2;
        let service = ConfigService::new(config);

        let session = service.default_session();
        assert_eq!(session.llm_provider, LLMProvider::Ollama);
        assert_eq!(session.llm_model_name.as_deref(), Some("llama3.1"));
        assert!((session.llm_temperature - 0.2).abs() < f32::EPSILON);
        assert!(session.last_context.is_empty());

        let llm = service.llm_config(
            session.llm_provider,
            session.llm_model_name.as_deref(),
            session.llm_temperature,
        );
        assert_eq!(llm.model, "llama3.1");
        assert_eq!(llm.temperature, Some(0.2));
    }

    #[test]
    fn test_critique_config_is_independent_of_defaults() {
        let mut config = AppConfig::default();
        config.defaults.provider = LLMProvider::Gemini;
        config.defaults.model = "gemini-1.5-pro".to_string();
        let service = ConfigService::new(config);

        let critique = service.critique_llm_config();
        assert_eq!(critique.provider, LLMProvider::Ollama);
        assert_eq!(critique.model, "deepseek-r1:8b");
    }
}
