pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

pub use application::{
    AnalyticsAnswer, AnalyticsPipeline, InsightGenerator, PromptLibrary, PromptTemplate,
    TableInsightGenerator,
};
pub use domain::error::{AppError, Result};
pub use domain::llm_config::{LLMConfig, LLMProvider};
pub use domain::query_context::QueryRequest;
pub use domain::session::SessionContext;
pub use infrastructure::config::{AppConfig, ConfigService};
pub use infrastructure::db::SqlDatabase;

use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber. `RUST_LOG` wins over the `info` default; calling it twice is
/// harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
