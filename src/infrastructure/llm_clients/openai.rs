use super::LLMClient;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Chat-completions client for OpenAI and API-compatible servers (OpenRouter, LM Studio, vLLM).
pub struct OpenAIClient {
    client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new() -> Self {
        Self::with_timeout(120)
    }

    pub fn with_timeout(timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    fn endpoint(base_url: &str) -> String {
        if base_url.ends_with('/') {
            format!("{}chat/completions", base_url)
        } else {
            format!("{}/chat/completions", base_url)
        }
    }

    pub(crate) fn request_body(
        config: &LLMConfig,
        system: &str,
        user: &str,
        stop: &[String],
    ) -> serde_json::Value {
        let mut messages = Vec::new();
        if !system.trim().is_empty() {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": user }));

        let mut body = json!({
            "model": config.model,
            "messages": messages,
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
        });
        if !stop.is_empty() {
            body["stop"] = json!(stop);
        }
        body
    }
}

impl Default for OpenAIClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn generate(
        &self,
        config: &LLMConfig,
        system: &str,
        user: &str,
        stop: &[String],
    ) -> Result<String> {
        let url = Self::endpoint(&config.base_url);
        let body = Self::request_body(config, system, user, stop);

        let mut request = self.client.post(&url).json(&body);
        match config.api_key.as_deref() {
            Some(key) => request = request.bearer_auth(key),
            None if config.provider.requires_api_key() => {
                return Err(AppError::LLMError(format!(
                    "Missing API key for {}",
                    config.provider
                )))
            }
            None => {}
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::LLMError(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::LLMError(format!(
                "API error ({}): {}",
                status, text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::LLMError(format!("Failed to parse JSON: {}", e)))?;

        json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::LLMError("Invalid response format".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm_config::LLMProvider;

    #[test]
    fn test_endpoint_handles_trailing_slash() {
        assert_eq!(
            OpenAIClient::endpoint("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            OpenAIClient::endpoint("http://localhost:1234/v1"),
            "http://localhost:1234/v1/chat/completions"
        );
    }

    #[test]
    fn test_request_body_includes_stop_only_when_given() {
        let config = LLMConfig {
            provider: LLMProvider::OpenAI,
            model: "gpt-4o-mini".to_string(),
            ..LLMConfig::default()
        };

        let body = OpenAIClient::request_body(&config, "", "Question?", &[]);
        assert!(body.get("stop").is_none());
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");

        let stop = vec!["\nSQLResult:".to_string()];
        let body = OpenAIClient::request_body(&config, "Be terse.", "Question?", &stop);
        assert_eq!(body["stop"][0], "\nSQLResult:");
        assert_eq!(body["messages"][0]["role"], "system");
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_request() {
        let client = OpenAIClient::new();
        let config = LLMConfig {
            api_key: None,
            base_url: "http://127.0.0.1:9".to_string(),
            ..LLMConfig::default()
        };
        let err = client.generate(&config, "", "hi", &[]).await.unwrap_err();
        assert!(matches!(err, AppError::LLMError(msg) if msg.contains("Missing API key")));
    }
}
