//! Appends an independent critique to the generated answer.
//!
//! Nothing in here can fail the request: every problem is logged and the answer is returned
//! without a critique. A trailing `DATA:` payload always stays at the very end.

use crate::application::use_cases::prompts::PromptTemplate;
use crate::domain::error::Result;
use crate::infrastructure::llm_clients::ModelBackend;
use crate::infrastructure::response::{clean_llm_response, collapse_blank_lines};
use tracing::{debug, info};

pub const VISUALIZATION_MARKER: &str = "DATA:";
pub const CRITIQUE_HEADER: &str = "## 🐋 Análisis Crítico del Razonamiento";
pub const MIN_CRITIQUE_CHARS: usize = 50;

/// Splits on the first `DATA:` into trimmed prose and the payload, marker included.
pub fn split_visualization(response: &str) -> (String, Option<String>) {
    match response.split_once(VISUALIZATION_MARKER) {
        Some((main, viz)) => (
            main.trim().to_string(),
            Some(format!("{}{}", VISUALIZATION_MARKER, viz)),
        ),
        None => (response.to_string(), None),
    }
}

pub fn is_valid_critique(critique: &str) -> bool {
    critique.trim().chars().count() > MIN_CRITIQUE_CHARS
}

pub fn append_critique(main: &str, critique: &str) -> String {
    format!("{}\n\n{}\n{}", main, CRITIQUE_HEADER, critique)
}

pub struct CriticalAnalysisUseCase {
    backend: Option<ModelBackend>,
    prompt: PromptTemplate,
}

impl CriticalAnalysisUseCase {
    /// `backend` is `None` when critiques are switched off.
    pub fn new(backend: Option<ModelBackend>, prompt: PromptTemplate) -> Self {
        Self { backend, prompt }
    }

    pub fn backend(&self) -> Option<&ModelBackend> {
        self.backend.as_ref()
    }

    pub async fn augment(&self, response: &str) -> String {
        let Some(backend) = self.backend.as_ref() else {
            debug!("Critical analysis disabled");
            return response.to_string();
        };

        let (main, viz) = split_visualization(response);
        let mut output = self.add_critical_analysis(backend, &main).await;
        if let Some(viz) = viz {
            output.push_str("\n\n");
            output.push_str(&viz);
        }
        output
    }

    async fn add_critical_analysis(&self, backend: &ModelBackend, main: &str) -> String {
        match self.critique(backend, main).await {
            Ok(critique) if is_valid_critique(&critique) => append_critique(main, &critique),
            Ok(_) => {
                info!("Critical analysis was too short or invalid - skipping");
                main.to_string()
            }
            Err(e) => {
                info!(backend = backend.name(), "Critical analysis generation failed - skipping: {}", e);
                main.to_string()
            }
        }
    }

    async fn critique(&self, backend: &ModelBackend, main: &str) -> Result<String> {
        let analysis = collapse_blank_lines(main);
        let rendered = self.prompt.render_with(&[("analysis", analysis.as_str())])?;
        let raw = backend.invoke(&rendered).await?;
        Ok(clean_llm_response(&raw))
    }
}
