use crate::application::use_cases::prompts::PromptTemplate;
use crate::domain::error::Result;
use crate::domain::query_context::QueryRequest;
use crate::infrastructure::db::SchemaIntrospector;
use crate::infrastructure::llm_clients::ModelBackend;
use std::sync::Arc;
use tracing::{debug, error};

/// Cuts generation before the model starts inventing query results.
pub const SQL_STOP_SEQUENCE: &str = "\nSQLResult:";

/// Strips markdown fencing and guarantees a trailing semicolon.
pub fn clean_sql_query(raw: &str) -> String {
    let mut query = raw.replace("```sql", "").replace("```", "").trim().to_string();
    if !query.ends_with(';') {
        query.push(';');
    }
    query
}

/// `'a','b'` for the prompt, or `''` when no tables were selected.
pub fn format_table_list(tables: &[String]) -> String {
    if tables.is_empty() {
        "''".to_string()
    } else {
        format!("'{}'", tables.join("','"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedSql {
    pub schema: String,
    pub query: String,
}

pub struct SqlGenerationUseCase {
    introspector: Arc<dyn SchemaIntrospector + Send + Sync>,
}

impl SqlGenerationUseCase {
    pub fn new(introspector: Arc<dyn SchemaIntrospector + Send + Sync>) -> Self {
        Self { introspector }
    }

    /// Fetches the schema once and returns it alongside the generated query so later stages
    /// reuse the same text.
    pub async fn execute(
        &self,
        request: &QueryRequest,
        backend: &ModelBackend,
        prompt: &PromptTemplate,
    ) -> Result<GeneratedSql> {
        let schema = self
            .introspector
            .get_schema(&request.selected_tables)
            .await
            .map_err(|e| {
                error!("Error getting schema: {}", e);
                e
            })?;

        let table_list = format_table_list(&request.selected_tables);
        let rendered = prompt
            .render_with(&[
                ("schema", schema.as_str()),
                ("question", request.question.as_str()),
                ("table_list", table_list.as_str()),
            ])
            .map_err(|e| {
                error!("Error formatting SQL input: {}", e);
                e
            })?;

        let raw = backend
            .invoke_with_stop(&rendered, &[SQL_STOP_SEQUENCE.to_string()])
            .await
            .map_err(|e| {
                error!(backend = backend.name(), "Error generating SQL: {}", e);
                e
            })?;

        let query = clean_sql_query(&raw);
        debug!(query = %query, "SQL generated");

        Ok(GeneratedSql { schema, query })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::test_support::{backend, tables, FakeIntrospector, FakeLlm};
    use crate::domain::error::AppError;

    #[test]
    fn test_clean_sql_query() {
        assert_eq!(clean_sql_query("```sql SELECT 1```"), "SELECT 1;");
        assert_eq!(clean_sql_query("SELECT 1"), "SELECT 1;");
        assert_eq!(clean_sql_query("SELECT 1;"), "SELECT 1;");
        assert_eq!(clean_sql_query("```sql\nSELECT 1;\n```\n"), "SELECT 1;");
    }

    #[test]
    fn test_clean_sql_query_is_idempotent() {
        let once = clean_sql_query("```sql\nSELECT region FROM sales\n```");
        assert_eq!(clean_sql_query(&once), once);
    }

    #[test]
    fn test_format_table_list() {
        assert_eq!(format_table_list(&[]), "''");
        assert_eq!(format_table_list(&tables(&["sales"])), "'sales'");
        assert_eq!(
            format_table_list(&tables(&["sales", "stores"])),
            "'sales','stores'"
        );
    }

    #[tokio::test]
    async fn test_execute_renders_prompt_and_binds_stop_sequence() {
        let introspector = Arc::new(FakeIntrospector::new("region text (sales)"));
        let llm = Arc::new(FakeLlm::replying(&["```sql\nSELECT region FROM sales\n```"]));
        let use_case = SqlGenerationUseCase::new(introspector.clone());
        let prompt = PromptTemplate::new("{schema}|{question}|{table_list}");

        let request = QueryRequest::new("Which regions?", tables(&["sales"]));
        let generated = use_case
            .execute(&request, &backend("primary", &llm), &prompt)
            .await
            .unwrap();

        assert_eq!(generated.query, "SELECT region FROM sales;");
        assert_eq!(generated.schema, "region text (sales)");
        assert_eq!(
            llm.prompts(),
            vec!["region text (sales)|Which regions?|'sales'".to_string()]
        );
        assert_eq!(llm.stops(), vec![vec!["\nSQLResult:".to_string()]]);
        assert_eq!(introspector.call_count(), 1);
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let introspector = Arc::new(FakeIntrospector::new("id int (t)"));
        let llm = Arc::new(FakeLlm::new(vec![Err(AppError::LLMError(
            "API error (500): boom".to_string(),
        ))]));
        let use_case = SqlGenerationUseCase::new(introspector);
        let request = QueryRequest::new("Count rows", tables(&["t"]));

        let err = use_case
            .execute(
                &request,
                &backend("primary", &llm),
                &PromptTemplate::new("{schema}{question}{table_list}"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::LLMError(_)));
    }

    #[tokio::test]
    async fn test_schema_failure_skips_model() {
        let introspector = Arc::new(FakeIntrospector::failing("connection refused"));
        let llm = Arc::new(FakeLlm::replying(&["SELECT 1"]));
        let use_case = SqlGenerationUseCase::new(introspector);
        let request = QueryRequest::new("Count rows", vec![]);

        let err = use_case
            .execute(
                &request,
                &backend("primary", &llm),
                &PromptTemplate::new("{schema}{question}{table_list}"),
            )
            .await
            .unwrap_err();
        assert_eq!(err, AppError::DatabaseError("connection refused".to_string()));
        assert!(llm.prompts().is_empty());
    }
}
