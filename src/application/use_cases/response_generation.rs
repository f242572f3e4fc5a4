use crate::application::use_cases::prompts::PromptTemplate;
use crate::domain::error::Result;
use crate::domain::query_context::EnrichedPayload;
use crate::infrastructure::llm_clients::ModelBackend;
use tracing::{debug, error};

/// Renders the enriched payload through the response prompt and returns the model's prose,
/// including any trailing `DATA:` payload, untouched.
pub struct ResponseGenerationUseCase;

impl ResponseGenerationUseCase {
    pub async fn execute(
        payload: &EnrichedPayload,
        backend: &ModelBackend,
        prompt: &PromptTemplate,
    ) -> Result<String> {
        let rendered = prompt.render(&payload.prompt_variables()).map_err(|e| {
            error!("Error rendering response prompt: {}", e);
            e
        })?;

        let response = backend.invoke(&rendered).await.map_err(|e| {
            error!(backend = backend.name(), "Error generating response: {}", e);
            e
        })?;

        debug!(chars = response.len(), "Response generated");
        Ok(response)
    }
}
