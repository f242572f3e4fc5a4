use crate::domain::error::{AppError, Result};
use crate::domain::query_context::QueryOutput;
use crate::infrastructure::db::QueryExecutor;
use crate::shared::literal::parse_literal;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Basic facts about the selected tables, plus suggestions derived from them.
#[async_trait]
pub trait InsightGenerator {
    async fn get_default_insights(&self, tables: &[String]) -> Result<Value>;
    async fn generate_schema_suggestions(&self, data: &Value) -> Result<Value>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInsight {
    pub table: String,
    pub row_count: i64,
}

/// Counts rows per table through the query executor.
pub struct TableInsightGenerator {
    executor: Arc<dyn QueryExecutor + Send + Sync>,
}

impl TableInsightGenerator {
    pub fn new(executor: Arc<dyn QueryExecutor + Send + Sync>) -> Self {
        Self { executor }
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        if !table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        {
            return Err(AppError::ValidationError(format!(
                "Invalid table name: {}",
                table
            )));
        }
        let output = self
            .executor
            .run_query(&format!("SELECT COUNT(*) AS row_count FROM {}", table))
            .await?;
        first_integer(&output).ok_or_else(|| {
            AppError::ParseError(format!("Could not read row count for table {}", table))
        })
    }
}

fn first_integer(output: &QueryOutput) -> Option<i64> {
    let value = match output {
        QueryOutput::Rows(rows) => rows.first()?.values().next()?.clone(),
        QueryOutput::Text(text) => parse_literal(text).ok()?,
    };
    scalar_integer(&value)
}

fn scalar_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Array(items) => scalar_integer(items.first()?),
        Value::Object(map) => scalar_integer(map.values().next()?),
        _ => None,
    }
}

#[async_trait]
impl InsightGenerator for TableInsightGenerator {
    async fn get_default_insights(&self, tables: &[String]) -> Result<Value> {
        let mut insights = Vec::with_capacity(tables.len());
        for table in tables {
            let row_count = self.row_count(table).await?;
            insights.push(TableInsight {
                table: table.clone(),
                row_count,
            });
        }
        let total_rows: i64 = insights.iter().map(|i| i.row_count).sum();
        debug!(tables = insights.len(), total_rows, "Default insights collected");

        Ok(json!({
            "tables": insights,
            "total_rows": total_rows,
        }))
    }

    async fn generate_schema_suggestions(&self, data: &Value) -> Result<Value> {
        let insights: Vec<TableInsight> = data
            .get("tables")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| AppError::ParseError(format!("Invalid insight data: {}", e)))?
            .unwrap_or_default();

        if insights.is_empty() {
            return Ok(json!([
                "Select one or more tables to get suggestions about their contents."
            ]));
        }

        let suggestions: Vec<String> = insights
            .iter()
            .map(|insight| match insight.row_count {
                0 => format!(
                    "Table '{}' is empty; results that depend on it will be blank.",
                    insight.table
                ),
                n if n > 1_000_000 => format!(
                    "Table '{}' has {} rows; filter by date or category before aggregating.",
                    insight.table, n
                ),
                n => format!(
                    "Table '{}' has {} rows; try grouping it by its categorical columns.",
                    insight.table, n
                ),
            })
            .collect();

        Ok(json!(suggestions))
    }
}
