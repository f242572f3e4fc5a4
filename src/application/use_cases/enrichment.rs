use crate::application::use_cases::insights::InsightGenerator;
use crate::domain::error::Result;
use crate::domain::query_context::{analysis_value, AnalyzerKind, EnrichedPayload, QueryContext, QueryOutput};
use crate::domain::session::SessionContext;
use crate::shared::literal::parse_literal;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

/// Structured form of the executor output. Text that is not a literal we understand is kept
/// as-is.
pub fn parse_response(output: &QueryOutput) -> Value {
    match output {
        QueryOutput::Rows(_) => output.to_value(),
        QueryOutput::Text(text) => match parse_literal(text) {
            Ok(value) => value,
            Err(e) => {
                debug!("Keeping raw query response: {}", e);
                Value::String(text.clone())
            }
        },
    }
}

pub struct ResponseEnrichmentUseCase {
    insights: Arc<dyn InsightGenerator + Send + Sync>,
}

impl ResponseEnrichmentUseCase {
    pub fn new(insights: Arc<dyn InsightGenerator + Send + Sync>) -> Self {
        Self { insights }
    }

    pub async fn execute(
        &self,
        context: QueryContext,
        session: &SessionContext,
    ) -> Result<EnrichedPayload> {
        let insights = self
            .insights
            .get_default_insights(&context.selected_tables)
            .await
            .map_err(|e| {
                error!("Error processing enhanced response: {}", e);
                e
            })?;
        let suggestions = self
            .insights
            .generate_schema_suggestions(&insights)
            .await
            .map_err(|e| {
                error!("Error processing enhanced response: {}", e);
                e
            })?;

        let analyses = &context.analyses;
        Ok(EnrichedPayload {
            response: parse_response(&context.response),
            temporal_analysis: analysis_value(analyses.get(AnalyzerKind::Temporal)),
            statistical_analysis: analysis_value(analyses.get(AnalyzerKind::Statistical)),
            comparative_analysis: analysis_value(analyses.get(AnalyzerKind::Comparative)),
            insights,
            suggestions,
            rag_context: session.last_context.clone(),
            question: context.question,
            query: context.query,
            schema: context.schema,
            selected_tables: context.selected_tables,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::insights::TableInsightGenerator;
    use crate::application::use_cases::test_support::{row, tables, FakeExecutor};
    use crate::domain::error::AppError;
    use crate::domain::llm_config::LLMProvider;
    use crate::domain::query_context::{AnalysisBundle, AnalysisReport};
    use serde_json::json;

    fn context(response: QueryOutput) -> QueryContext {
        let mut analyses = AnalysisBundle::default();
        let mut comparative = AnalysisReport::new(AnalyzerKind::Comparative);
        comparative.results.insert(
            "sales.region".to_string(),
            QueryOutput::Rows(vec![row(&[("region", json!("north")), ("count", json!(2))])]),
        );
        analyses.set(Some(comparative), AnalyzerKind::Comparative);

        QueryContext {
            question: "Sales by region?".to_string(),
            selected_tables: tables(&["sales"]),
            schema: "region text (sales)".to_string(),
            query: "SELECT region FROM sales;".to_string(),
            response,
            analyses,
        }
    }

    #[test]
    fn test_parse_response_literal_text() {
        let parsed = parse_response(&QueryOutput::Text("[('north', 2), ('south', 1)]".to_string()));
        assert_eq!(parsed, json!([["north", 2], ["south", 1]]));

        let parsed = parse_response(&QueryOutput::Text("{'total': Decimal('10.50')}".to_string()));
        assert!(parsed.is_object());
    }

    #[test]
    fn test_parse_response_keeps_unparsable_text() {
        let raw = "Error: something went wrong at line 3";
        assert_eq!(
            parse_response(&QueryOutput::Text(raw.to_string())),
            Value::String(raw.to_string())
        );
        assert_eq!(
            parse_response(&QueryOutput::Text("__import__('os')".to_string())),
            json!("__import__('os')")
        );
    }

    #[tokio::test]
    async fn test_payload_merges_context_insights_and_session() {
        let executor = Arc::new(FakeExecutor::new().on(
            "COUNT(*) AS row_count",
            QueryOutput::Rows(vec![row(&[("row_count", json!(3))])]),
        ));
        let use_case = ResponseEnrichmentUseCase::new(Arc::new(TableInsightGenerator::new(executor)));
        let session = SessionContext::new(LLMProvider::Local, None, 0.7)
            .with_last_context(vec![json!({"q": "earlier"})]);

        let payload = use_case
            .execute(context(QueryOutput::Text("[(1,)]".to_string())), &session)
            .await
            .unwrap();

        assert_eq!(payload.response, json!([[1]]));
        assert_eq!(payload.temporal_analysis, json!({}));
        assert_eq!(payload.statistical_analysis, json!({}));
        assert_eq!(
            payload.comparative_analysis,
            json!({"comparative_analysis": {"sales.region": [{"region": "north", "count": 2}]}})
        );
        assert_eq!(payload.insights["total_rows"], 3);
        assert_eq!(payload.rag_context, vec![json!({"q": "earlier"})]);
        assert_eq!(payload.question, "Sales by region?");
        assert_eq!(payload.selected_tables, vec!["sales".to_string()]);
    }

    #[tokio::test]
    async fn test_insight_failure_is_fatal() {
        let executor = Arc::new(FakeExecutor::new().fail_on("row_count", "timeout"));
        let use_case = ResponseEnrichmentUseCase::new(Arc::new(TableInsightGenerator::new(executor)));

        let session = SessionContext::new(LLMProvider::Local, None, 0.7);
        let err = use_case
            .execute(context(QueryOutput::default()), &session)
            .await
            .unwrap_err();
        assert_eq!(err, AppError::DatabaseError("timeout".to_string()));
    }
}
