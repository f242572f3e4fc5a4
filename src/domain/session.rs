use crate::domain::llm_config::LLMProvider;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Read-only snapshot of the host's session state, taken when a request starts.
///
/// The pipeline never reads ambient state; the host passes this explicitly. Hosts without a
/// selection of their own start from `ConfigService::default_session`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub llm_provider: LLMProvider,
    pub llm_model_name: Option<String>,
    pub llm_temperature: f32,
    #[serde(default)]
    pub last_context: Vec<Value>,
}

impl SessionContext {
    pub fn new(provider: LLMProvider, model_name: Option<String>, temperature: f32) -> Self {
        Self {
            llm_provider: provider,
            llm_model_name: model_name,
            llm_temperature: temperature,
            last_context: Vec::new(),
        }
    }

    pub fn with_last_context(mut self, context: Vec<Value>) -> Self {
        self.last_context = context;
        self
    }
}
