//! Database collaborators: schema introspection and query execution.

pub mod guard;
pub mod sql_database;

use crate::domain::error::Result;
use crate::domain::query_context::QueryOutput;
use async_trait::async_trait;

pub use sql_database::SqlDatabase;

/// Describes the columns of the given tables as free text, one line per column.
///
/// Each line starts with the column name and mentions its table and data type.
#[async_trait]
pub trait SchemaIntrospector {
    async fn get_schema(&self, tables: &[String]) -> Result<String>;
}

#[async_trait]
pub trait QueryExecutor {
    async fn run_query(&self, sql: &str) -> Result<QueryOutput>;
}
