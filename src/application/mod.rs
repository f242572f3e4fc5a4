pub mod use_cases;

pub use use_cases::insights::{InsightGenerator, TableInsightGenerator};
pub use use_cases::pipeline::{AnalyticsAnswer, AnalyticsPipeline};
pub use use_cases::prompts::{PromptLibrary, PromptTemplate};
