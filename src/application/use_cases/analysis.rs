//! Secondary analyses derived from the schema text rather than from the question.
//!
//! One pass over the schema assigns each column line to every analyzer whose type keywords it
//! mentions; each analyzer then runs one aggregate query per discovered column. A failing column is logged and
//! skipped; a failing analyzer degrades to no report.

use crate::domain::error::{AppError, Result};
use crate::domain::query_context::{AnalysisBundle, AnalysisReport, AnalyzerKind};
use crate::infrastructure::db::QueryExecutor;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

static IDENTIFIER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*(\.[A-Za-z_][A-Za-z0-9_$]*)?$").unwrap());

/// Maps a set of type keywords to the analyzer that handles matching columns.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisRule {
    pub kind: AnalyzerKind,
    pub keywords: &'static [&'static str],
}

impl AnalysisRule {
    /// Case-insensitive substring match against any keyword.
    pub fn matches(&self, line: &str) -> bool {
        let lower = line.to_lowercase();
        self.keywords.iter().any(|keyword| lower.contains(keyword))
    }
}

pub const ANALYSIS_RULES: [AnalysisRule; 3] = [
    AnalysisRule {
        kind: AnalyzerKind::Temporal,
        keywords: &["date", "timestamp"],
    },
    AnalysisRule {
        kind: AnalyzerKind::Statistical,
        keywords: &["int", "decimal", "float", "double"],
    },
    AnalysisRule {
        kind: AnalyzerKind::Comparative,
        keywords: &["varchar", "char", "text"],
    },
];

pub fn rule_for(kind: AnalyzerKind) -> &'static AnalysisRule {
    match kind {
        AnalyzerKind::Temporal => &ANALYSIS_RULES[0],
        AnalyzerKind::Statistical => &ANALYSIS_RULES[1],
        AnalyzerKind::Comparative => &ANALYSIS_RULES[2],
    }
}

/// Every analyzer whose keywords appear in the line. A line may feed more than one analyzer.
pub fn classify_line(line: &str) -> Vec<AnalyzerKind> {
    ANALYSIS_RULES
        .iter()
        .filter(|rule| rule.matches(line))
        .map(|rule| rule.kind)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredColumn {
    pub table: String,
    pub column: String,
}

/// Candidate columns keyed by `table.column`, in discovery order.
pub type ColumnMap = IndexMap<String, DiscoveredColumn>;

/// Candidate columns for every analyzer, found in one pass over the schema.
///
/// A schema line belongs to a table when it contains the table name anywhere; the column is
/// the line's first whitespace-separated token. Each line goes through the rule table once.
pub fn discover_all(schema: &str, tables: &[String]) -> HashMap<AnalyzerKind, ColumnMap> {
    let mut plan: HashMap<AnalyzerKind, ColumnMap> = HashMap::new();

    for table in tables {
        for line in schema.lines().filter(|line| line.contains(table.as_str())) {
            let Some(column) = line.split_whitespace().next() else {
                continue;
            };
            for kind in classify_line(line) {
                plan.entry(kind).or_default().insert(
                    format!("{}.{}", table, column),
                    DiscoveredColumn {
                        table: table.clone(),
                        column: column.to_string(),
                    },
                );
            }
        }
    }

    plan
}

/// Candidate columns for one analyzer.
pub fn discover_columns(schema: &str, tables: &[String], kind: AnalyzerKind) -> ColumnMap {
    discover_all(schema, tables).remove(&kind).unwrap_or_default()
}

fn ensure_identifier(name: &str) -> Result<()> {
    if IDENTIFIER_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(AppError::ValidationError(format!(
            "Refusing to interpolate identifier: {}",
            name
        )))
    }
}

/// The aggregate query an analyzer runs for one column.
pub fn build_query(kind: AnalyzerKind, table: &str, column: &str) -> Result<String> {
    ensure_identifier(table)?;
    ensure_identifier(column)?;

    let query = match kind {
        AnalyzerKind::Temporal => format!(
            "SELECT EXTRACT(YEAR FROM {col}) as year, EXTRACT(MONTH FROM {col}) as month, \
             COUNT(*) as count FROM {table} \
             GROUP BY EXTRACT(YEAR FROM {col}), EXTRACT(MONTH FROM {col}) \
             ORDER BY year, month",
            col = column,
            table = table
        ),
        AnalyzerKind::Statistical => format!(
            "SELECT AVG({col}) as mean, STDDEV({col}) as std_dev, MIN({col}) as min_val, \
             MAX({col}) as max_val, COUNT(*) as count FROM {table}",
            col = column,
            table = table
        ),
        AnalyzerKind::Comparative => format!(
            "SELECT {col}, COUNT(*) as count FROM {table} \
             GROUP BY {col} ORDER BY count DESC LIMIT 10",
            col = column,
            table = table
        ),
    };
    Ok(query)
}

pub struct AnalysisUseCase {
    executor: Arc<dyn QueryExecutor + Send + Sync>,
}

impl AnalysisUseCase {
    pub fn new(executor: Arc<dyn QueryExecutor + Send + Sync>) -> Self {
        Self { executor }
    }

    /// Runs a single analyzer. `None` means nothing to report: no schema, no tables, or no
    /// candidate columns.
    pub async fn analyze(
        &self,
        kind: AnalyzerKind,
        schema: &str,
        tables: &[String],
    ) -> Option<AnalysisReport> {
        if schema.trim().is_empty() || tables.is_empty() {
            return None;
        }
        let columns = discover_columns(schema, tables, kind);
        run_analyzer(self.executor.as_ref(), kind, &columns).await
    }

    /// Runs the three analyzers concurrently over one discovery pass. Each one runs in its own
    /// task so a panic in one only costs that analyzer's report.
    pub async fn run_all(&self, schema: &str, tables: &[String]) -> AnalysisBundle {
        let mut bundle = AnalysisBundle::default();
        if schema.trim().is_empty() || tables.is_empty() {
            return bundle;
        }
        let mut plan = discover_all(schema, tables);

        let handles: Vec<_> = AnalyzerKind::ALL
            .iter()
            .map(|&kind| {
                let executor = self.executor.clone();
                let columns = plan.remove(&kind).unwrap_or_default();
                let handle =
                    tokio::spawn(async move { run_analyzer(executor.as_ref(), kind, &columns).await });
                (kind, handle)
            })
            .collect();

        for (kind, handle) in handles {
            match handle.await {
                Ok(report) => bundle.set(report, kind),
                Err(e) => {
                    warn!(analyzer = kind.as_str(), "Error in {} analysis: {}", kind.as_str(), e);
                    bundle.set(None, kind);
                }
            }
        }
        bundle
    }
}

async fn run_analyzer(
    executor: &(dyn QueryExecutor + Send + Sync),
    kind: AnalyzerKind,
    columns: &ColumnMap,
) -> Option<AnalysisReport> {
    if columns.is_empty() {
        debug!(analyzer = kind.as_str(), "No candidate columns");
        return None;
    }

    let mut report = AnalysisReport::new(kind);
    for (key, candidate) in columns {
        let result = match build_query(kind, &candidate.table, &candidate.column) {
            Ok(query) => executor.run_query(&query).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(output) => {
                report.results.insert(key.clone(), output);
            }
            Err(e) => {
                warn!(
                    analyzer = kind.as_str(),
                    column = %key,
                    "Error analyzing {} for {}: {}",
                    kind.as_str(),
                    key,
                    e
                );
            }
        }
    }

    info!(
        analyzer = kind.as_str(),
        candidates = columns.len(),
        succeeded = report.results.len(),
        "Analysis finished"
    );
    Some(report)
}
