//! Read-only guard applied before any SQL reaches the database.

use crate::domain::error::{AppError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static FORBIDDEN_KEYWORD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(INSERT|UPDATE|DELETE|DROP|ALTER|TRUNCATE|CREATE|GRANT|REVOKE|MERGE|COPY|VACUUM|PRAGMA|ATTACH|DETACH)\b",
    )
    .unwrap()
});

static LITERAL_OR_COMMENT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"'(?:[^']|'')*'|"(?:[^"]|"")*"|--[^\n]*|/\*[\s\S]*?\*/"#).unwrap()
});

static LEADING_COMMENT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*(--[^\n]*\n|/\*[\s\S]*?\*/))*\s*").unwrap());

/// Rejects anything that is not a single read-only statement.
///
/// Returns the statement with leading comments removed.
pub fn ensure_read_only(sql: &str) -> Result<&str> {
    let statement = LEADING_COMMENT_PATTERN
        .find(sql)
        .map(|m| &sql[m.end()..])
        .unwrap_or(sql)
        .trim();

    if statement.is_empty() {
        return Err(AppError::ValidationError("No query provided".to_string()));
    }

    let upper = statement.trim_start_matches('(').to_uppercase();
    if !(upper.starts_with("SELECT") || upper.starts_with("WITH")) {
        return Err(AppError::ValidationError(
            "Only SELECT queries are allowed".to_string(),
        ));
    }

    let masked = mask_literals_and_comments(statement);
    let body = masked.trim_end().trim_end_matches(';');
    if body.contains(';') {
        return Err(AppError::ValidationError(
            "Multiple statements are not allowed".to_string(),
        ));
    }

    if let Some(found) = FORBIDDEN_KEYWORD_PATTERN.find(body) {
        return Err(AppError::ValidationError(format!(
            "Query contains forbidden keyword: {}",
            found.as_str().to_uppercase()
        )));
    }

    Ok(statement)
}

/// Replaces quoted literals and comments with inert placeholders so only SQL text is checked.
fn mask_literals_and_comments(statement: &str) -> String {
    LITERAL_OR_COMMENT_PATTERN
        .replace_all(statement, |caps: &regex::Captures| {
            if caps[0].starts_with('\'') || caps[0].starts_with('"') {
                "''"
            } else {
                " "
            }
        })
        .into_owned()
}
