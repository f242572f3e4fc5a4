use crate::domain::error::{AppError, Result};
use std::collections::HashMap;

const SQL_TEMPLATE: &str = r#"You are a SQL expert. Given an input question, write a syntactically correct SQL query that answers it.

Only use the following tables: {table_list}
Only use the columns listed in the schema below. Never query columns that do not exist, and qualify
column names with their table when more than one table is involved.
Return only the SQL statement, without explanations or markdown fences.

Schema:
{schema}

Question: {question}
SQLQuery:"#;

const RESPONSE_TEMPLATE: &str = r#"You are a data analyst. Answer the user's question using the query results and the supporting analyses.

Question: {question}
Tables: {selected_tables}

Schema:
{schema}

SQL query that was executed:
{query}

Query results:
{response}

Temporal analysis:
{temporal_analysis}

Statistical analysis:
{statistical_analysis}

Comparative analysis:
{comparative_analysis}

Table insights:
{insights}

Suggestions:
{suggestions}

Previous conversation context:
{rag_context}

Write a clear answer in markdown. Ground every claim in the data above and say when the data is not
enough to answer. If a chart would help, end the answer with a single line starting with "DATA:"
followed by a JSON object such as {{"type": "bar", "labels": [...], "values": [...]}}.
Answer:"#;

const CRITICAL_ANALYSIS_TEMPLATE: &str = r#"Review the following data analysis critically.

{analysis}

Point out unsupported conclusions, missing context, possible biases in the data and alternative
interpretations. Be concise and specific. Do not repeat the analysis."#;

/// A prompt with `{name}` placeholders. `{{` and `}}` render as literal braces.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Placeholder names in order of first appearance.
    pub fn variables(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut chars = self.template.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                }
                '{' => {
                    let name: String = chars.by_ref().take_while(|ch| *ch != '}').collect();
                    let name = name.trim().to_string();
                    if !name.is_empty() && !names.contains(&name) {
                        names.push(name);
                    }
                }
                _ => {}
            }
        }
        names
    }

    pub fn render(&self, vars: &HashMap<String, String>) -> Result<String> {
        let mut out = String::with_capacity(self.template.len());
        let mut chars = self.template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    out.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    out.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for ch in chars.by_ref() {
                        if ch == '}' {
                            closed = true;
                            break;
                        }
                        name.push(ch);
                    }
                    if !closed {
                        return Err(AppError::PromptError(format!(
                            "Unclosed placeholder '{{{}' in template",
                            name
                        )));
                    }
                    let name = name.trim();
                    let value = vars.get(name).ok_or_else(|| {
                        AppError::PromptError(format!("Missing prompt variable: {}", name))
                    })?;
                    out.push_str(value);
                }
                other => out.push(other),
            }
        }

        Ok(out)
    }

    pub fn render_with(&self, vars: &[(&str, &str)]) -> Result<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.render(&map)
    }
}

/// The three prompts the pipeline renders. Hosts may replace any of them.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    sql: PromptTemplate,
    response: PromptTemplate,
    critical_analysis: PromptTemplate,
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self {
            sql: PromptTemplate::new(SQL_TEMPLATE),
            response: PromptTemplate::new(RESPONSE_TEMPLATE),
            critical_analysis: PromptTemplate::new(CRITICAL_ANALYSIS_TEMPLATE),
        }
    }
}

impl PromptLibrary {
    pub fn sql_prompt(&self) -> &PromptTemplate {
        &self.sql
    }

    pub fn response_prompt(&self) -> &PromptTemplate {
        &self.response
    }

    pub fn critical_analysis_prompt(&self) -> &PromptTemplate {
        &self.critical_analysis
    }

    pub fn with_sql_prompt(mut self, template: PromptTemplate) -> Self {
        self.sql = template;
        self
    }

    pub fn with_response_prompt(mut self, template: PromptTemplate) -> Self {
        self.response = template;
        self
    }

    pub fn with_critical_analysis_prompt(mut self, template: PromptTemplate) -> Self {
        self.critical_analysis = template;
        self
    }
}
