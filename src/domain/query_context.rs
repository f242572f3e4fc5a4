//! Data carried through one analytics request.
//!
//! Every entity here is built fresh per request and handed from stage to stage by value.

use crate::domain::error::{AppError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use validator::Validate;

/// One result row, columns in the order the database returned them.
pub type Row = IndexMap<String, Value>;

/// What the query executor hands back: decoded rows, or the textual form some executors produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryOutput {
    Rows(Vec<Row>),
    Text(String),
}

impl QueryOutput {
    pub fn to_value(&self) -> Value {
        match self {
            QueryOutput::Rows(rows) => Value::Array(
                rows.iter()
                    .map(|row| {
                        Value::Object(
                            row.iter()
                                .map(|(k, v)| (k.clone(), v.clone()))
                                .collect::<Map<String, Value>>(),
                        )
                    })
                    .collect(),
            ),
            QueryOutput::Text(text) => Value::String(text.clone()),
        }
    }

    pub fn row_count(&self) -> Option<usize> {
        match self {
            QueryOutput::Rows(rows) => Some(rows.len()),
            QueryOutput::Text(_) => None,
        }
    }
}

impl Default for QueryOutput {
    fn default() -> Self {
        QueryOutput::Rows(Vec::new())
    }
}

/// Incoming question plus the tables the user picked.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(min = 1, max = 4096))]
    pub question: String,
    #[serde(default)]
    pub selected_tables: Vec<String>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>, selected_tables: Vec<String>) -> Self {
        Self {
            question: question.into(),
            selected_tables,
        }
    }

    pub fn validate_request(&self) -> Result<()> {
        self.validate()
            .map_err(|e| AppError::ValidationError(format!("Invalid query request: {}", e)))?;
        if self.question.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Question must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

/// The three secondary analyses derived from schema introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerKind {
    Temporal,
    Statistical,
    Comparative,
}

impl AnalyzerKind {
    pub const ALL: [AnalyzerKind; 3] = [
        AnalyzerKind::Temporal,
        AnalyzerKind::Statistical,
        AnalyzerKind::Comparative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyzerKind::Temporal => "temporal",
            AnalyzerKind::Statistical => "statistical",
            AnalyzerKind::Comparative => "comparative",
        }
    }

    /// Key the per-column results are wrapped under.
    pub fn section_key(&self) -> &'static str {
        match self {
            AnalyzerKind::Temporal => "temporal_patterns",
            AnalyzerKind::Statistical => "statistical_summary",
            AnalyzerKind::Comparative => "comparative_analysis",
        }
    }
}

/// Results of one analyzer, keyed by `table.column` in discovery order.
///
/// An analyzer that found no candidate columns produces no report at all; one that found
/// columns but whose queries all failed produces a report with an empty `results` map.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    pub kind: AnalyzerKind,
    pub results: IndexMap<String, QueryOutput>,
}

impl AnalysisReport {
    pub fn new(kind: AnalyzerKind) -> Self {
        Self {
            kind,
            results: IndexMap::new(),
        }
    }

    pub fn to_value(&self) -> Value {
        let results: Map<String, Value> = self
            .results
            .iter()
            .map(|(key, output)| (key.clone(), output.to_value()))
            .collect();
        let mut wrapped = Map::new();
        wrapped.insert(self.kind.section_key().to_string(), Value::Object(results));
        Value::Object(wrapped)
    }
}

/// JSON form of an optional report: `{}` when the analyzer produced nothing.
pub fn analysis_value(report: Option<&AnalysisReport>) -> Value {
    report.map(AnalysisReport::to_value).unwrap_or_else(|| json!({}))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisBundle {
    pub temporal: Option<AnalysisReport>,
    pub statistical: Option<AnalysisReport>,
    pub comparative: Option<AnalysisReport>,
}

impl AnalysisBundle {
    pub fn set(&mut self, report: Option<AnalysisReport>, kind: AnalyzerKind) {
        match kind {
            AnalyzerKind::Temporal => self.temporal = report,
            AnalyzerKind::Statistical => self.statistical = report,
            AnalyzerKind::Comparative => self.comparative = report,
        }
    }

    pub fn get(&self, kind: AnalyzerKind) -> Option<&AnalysisReport> {
        match kind {
            AnalyzerKind::Temporal => self.temporal.as_ref(),
            AnalyzerKind::Statistical => self.statistical.as_ref(),
            AnalyzerKind::Comparative => self.comparative.as_ref(),
        }
    }
}

/// Everything known about the request once SQL was generated, executed and analysed.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryContext {
    pub question: String,
    pub selected_tables: Vec<String>,
    pub schema: String,
    pub query: String,
    pub response: QueryOutput,
    pub analyses: AnalysisBundle,
}

/// Final input to the response prompt: the query context plus insights, suggestions and
/// conversational context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedPayload {
    pub question: String,
    pub query: String,
    pub schema: String,
    pub selected_tables: Vec<String>,
    pub response: Value,
    pub temporal_analysis: Value,
    pub statistical_analysis: Value,
    pub comparative_analysis: Value,
    pub insights: Value,
    pub suggestions: Value,
    pub rag_context: Vec<Value>,
}

impl EnrichedPayload {
    /// Flattens the payload into template variables. Text fields are passed through as-is,
    /// structured fields are rendered as pretty JSON.
    pub fn prompt_variables(&self) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), self.question.clone());
        vars.insert("query".to_string(), self.query.clone());
        vars.insert("schema".to_string(), self.schema.clone());
        vars.insert("selected_tables".to_string(), self.selected_tables.join(", "));
        vars.insert("response".to_string(), render_value(&self.response));
        vars.insert(
            "temporal_analysis".to_string(),
            render_value(&self.temporal_analysis),
        );
        vars.insert(
            "statistical_analysis".to_string(),
            render_value(&self.statistical_analysis),
        );
        vars.insert(
            "comparative_analysis".to_string(),
            render_value(&self.comparative_analysis),
        );
        vars.insert("insights".to_string(), render_value(&self.insights));
        vars.insert("suggestions".to_string(), render_value(&self.suggestions));
        vars.insert(
            "rag_context".to_string(),
            render_value(&Value::Array(self.rag_context.clone())),
        );
        vars
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_blank_question_is_rejected() {
        let request = QueryRequest::new("   ", vec![]);
        assert!(matches!(
            request.validate_request(),
            Err(AppError::ValidationError(_))
        ));

        let request = QueryRequest::new("", vec!["sales".to_string()]);
        assert!(request.validate_request().is_err());

        let request = QueryRequest::new("How many sales?", vec![]);
        assert!(request.validate_request().is_ok());
    }

    #[test]
    fn test_missing_report_renders_as_empty_object() {
        assert_eq!(analysis_value(None), json!({}));
    }

    #[test]
    fn test_report_is_wrapped_under_section_key() {
        let mut report = AnalysisReport::new(AnalyzerKind::Comparative);
        report.results.insert(
            "sales.region".to_string(),
            QueryOutput::Rows(vec![row(&[("region", json!("north")), ("count", json!(4))])]),
        );

        let value = report.to_value();
        assert_eq!(
            value,
            json!({"comparative_analysis": {"sales.region": [{"region": "north", "count": 4}]}})
        );

        let empty = AnalysisReport::new(AnalyzerKind::Temporal);
        assert_eq!(empty.to_value(), json!({"temporal_patterns": {}}));
    }

    #[test]
    fn test_rows_keep_column_order_when_serialized() {
        let output = QueryOutput::Rows(vec![row(&[
            ("year", json!(2024)),
            ("month", json!(1)),
            ("count", json!(3)),
        ])]);
        let text = serde_json::to_string(&output.to_value()).unwrap();
        assert_eq!(text, r#"[{"year":2024,"month":1,"count":3}]"#);
    }

    #[test]
    fn test_prompt_variables_keep_discovery_order() {
        let mut report = AnalysisReport::new(AnalyzerKind::Statistical);
        report
            .results
            .insert("sales.id".to_string(), QueryOutput::Rows(vec![]));
        report
            .results
            .insert("sales.amount".to_string(), QueryOutput::Rows(vec![]));

        let compact = serde_json::to_string(&report.to_value()).unwrap();
        assert_eq!(
            compact,
            r#"{"statistical_summary":{"sales.id":[],"sales.amount":[]}}"#
        );

        let payload = EnrichedPayload {
            question: "Totals?".to_string(),
            query: "SELECT 1;".to_string(),
            schema: String::new(),
            selected_tables: vec!["sales".to_string()],
            response: QueryOutput::Rows(vec![row(&[("zeta", json!(1)), ("alpha", json!(2))])])
                .to_value(),
            temporal_analysis: json!({}),
            statistical_analysis: report.to_value(),
            comparative_analysis: json!({}),
            insights: json!({}),
            suggestions: json!([]),
            rag_context: vec![],
        };

        let vars = payload.prompt_variables();
        let stats = &vars["statistical_analysis"];
        let id_at = stats.find("sales.id").unwrap();
        let amount_at = stats.find("sales.amount").unwrap();
        assert!(id_at < amount_at);

        let response = &vars["response"];
        assert!(response.find("zeta").unwrap() < response.find("alpha").unwrap());
    }

    #[test]
    fn test_prompt_variables_keep_text_raw() {
        let payload = EnrichedPayload {
            question: "Top regions?".to_string(),
            query: "SELECT 1;".to_string(),
            schema: "region text (sales)".to_string(),
            selected_tables: vec!["sales".to_string(), "stores".to_string()],
            response: json!("not structured"),
            temporal_analysis: json!({}),
            statistical_analysis: json!({}),
            comparative_analysis: json!({}),
            insights: json!({"tables": []}),
            suggestions: json!([]),
            rag_context: vec![],
        };

        let vars = payload.prompt_variables();
        assert_eq!(vars["question"], "Top regions?");
        assert_eq!(vars["selected_tables"], "sales, stores");
        assert_eq!(vars["response"], "not structured");
        assert_eq!(vars["temporal_analysis"], "{}");
        assert_eq!(vars["rag_context"], "[]");
    }
}
