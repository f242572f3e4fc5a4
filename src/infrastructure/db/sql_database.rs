//! sqlx-backed schema introspector and query executor for PostgreSQL and SQLite.

use super::guard::ensure_read_only;
use super::{QueryExecutor, SchemaIntrospector};
use crate::domain::error::{AppError, Result};
use crate::domain::query_context::{QueryOutput, Row};
use crate::infrastructure::config::DatabaseConfig;
use async_trait::async_trait;
use serde_json::{Number, Value};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub enum DatabasePool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

pub struct SqlDatabase {
    pool: DatabasePool,
    query_timeout: Duration,
}

impl SqlDatabase {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config.url.trim();
        let acquire_timeout = Duration::from_secs(config.connect_timeout_secs);

        let pool = if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(acquire_timeout)
                .connect(url)
                .await
                .map_err(|e| {
                    error!("Failed to connect to PostgreSQL: {}", e);
                    AppError::DatabaseError(format!("Failed to connect to PostgreSQL: {}", e))
                })?;
            DatabasePool::Postgres(pool)
        } else if url.starts_with("sqlite:") {
            let options = SqliteConnectOptions::from_str(url)
                .map_err(|e| {
                    AppError::DatabaseError(format!("Failed to parse connection string: {}", e))
                })?
                .create_if_missing(true);
            // every in-memory connection is its own database
            let max_connections = if url.contains(":memory:") {
                1
            } else {
                config.max_connections
            };
            let pool = SqlitePoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(acquire_timeout)
                .connect_with(options)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to connect: {}", e)))?;
            DatabasePool::Sqlite(pool)
        } else {
            return Err(AppError::ConfigError(format!(
                "Unsupported database url '{}': expected postgres:// or sqlite:",
                url
            )));
        };

        let database = Self {
            pool,
            query_timeout: Duration::from_secs(config.query_timeout_secs),
        };
        info!("Connected to {} database", database.backend());
        Ok(database)
    }

    pub fn from_pool(pool: DatabasePool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    pub fn backend(&self) -> &'static str {
        match self.pool {
            DatabasePool::Postgres(_) => "postgres",
            DatabasePool::Sqlite(_) => "sqlite",
        }
    }

    pub async fn close(&self) {
        match &self.pool {
            DatabasePool::Postgres(pool) => pool.close().await,
            DatabasePool::Sqlite(pool) => pool.close().await,
        }
    }

    async fn with_timeout<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        tokio::time::timeout(self.query_timeout, fut)
            .await
            .map_err(|_| {
                AppError::DatabaseError(format!(
                    "{} timed out after {} seconds",
                    what,
                    self.query_timeout.as_secs()
                ))
            })?
            .map_err(|e| AppError::DatabaseError(format!("{} failed: {}", what, e)))
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        match &self.pool {
            DatabasePool::Postgres(pool) => {
                let rows = self
                    .with_timeout(
                        "Table listing",
                        sqlx::query(
                            "SELECT table_name::text AS table_name FROM information_schema.tables \
                             WHERE table_schema = current_schema() ORDER BY table_name",
                        )
                        .fetch_all(pool),
                    )
                    .await?;
                rows.iter()
                    .map(|row| {
                        row.try_get::<String, _>("table_name").map_err(|e| {
                            AppError::DatabaseError(format!("Failed to parse table_name: {}", e))
                        })
                    })
                    .collect()
            }
            DatabasePool::Sqlite(pool) => {
                let rows = self
                    .with_timeout(
                        "Table listing",
                        sqlx::query(
                            "SELECT name FROM sqlite_master \
                             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                        )
                        .fetch_all(pool),
                    )
                    .await?;
                rows.iter()
                    .map(|row| {
                        row.try_get::<String, _>("name").map_err(|e| {
                            AppError::DatabaseError(format!("Failed to parse table name: {}", e))
                        })
                    })
                    .collect()
            }
        }
    }

    /// `(column_name, data_type)` pairs in declaration order.
    async fn list_columns(&self, table: &str) -> Result<Vec<(String, String)>> {
        match &self.pool {
            DatabasePool::Postgres(pool) => {
                let rows = self
                    .with_timeout(
                        "Column listing",
                        sqlx::query(
                            "SELECT column_name::text AS column_name, data_type::text AS data_type \
                             FROM information_schema.columns \
                             WHERE table_schema = current_schema() AND table_name = $1 \
                             ORDER BY ordinal_position",
                        )
                        .bind(table)
                        .fetch_all(pool),
                    )
                    .await?;
                rows.iter()
                    .map(|row| {
                        let name: String = row.try_get("column_name").map_err(|e| {
                            AppError::DatabaseError(format!("Failed to parse column_name: {}", e))
                        })?;
                        let data_type: String = row.try_get("data_type").map_err(|e| {
                            AppError::DatabaseError(format!("Failed to parse data_type: {}", e))
                        })?;
                        Ok((name, data_type))
                    })
                    .collect()
            }
            DatabasePool::Sqlite(pool) => {
                let rows = self
                    .with_timeout(
                        "Column listing",
                        sqlx::query("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")
                            .bind(table)
                            .fetch_all(pool),
                    )
                    .await?;
                rows.iter()
                    .map(|row| {
                        let name: String = row.try_get("name").map_err(|e| {
                            AppError::DatabaseError(format!("Failed to parse column name: {}", e))
                        })?;
                        let data_type: String = row.try_get("type").map_err(|e| {
                            AppError::DatabaseError(format!("Failed to parse column type: {}", e))
                        })?;
                        Ok((name, data_type))
                    })
                    .collect()
            }
        }
    }
}

/// One schema line per column: `<column> <data_type> (<table>)`.
pub fn format_schema_line(table: &str, column: &str, data_type: &str) -> String {
    let data_type = if data_type.trim().is_empty() {
        "unknown"
    } else {
        data_type.trim()
    };
    format!("{} {} ({})", column, data_type.to_lowercase(), table)
}

#[async_trait]
impl SchemaIntrospector for SqlDatabase {
    async fn get_schema(&self, tables: &[String]) -> Result<String> {
        let tables = if tables.is_empty() {
            self.list_tables().await?
        } else {
            tables.to_vec()
        };

        let mut lines = Vec::new();
        for table in &tables {
            let columns = self.list_columns(table).await?;
            if columns.is_empty() {
                warn!(table = %table, "Table has no visible columns");
            }
            lines.extend(
                columns
                    .iter()
                    .map(|(column, data_type)| format_schema_line(table, column, data_type)),
            );
        }

        debug!(tables = tables.len(), columns = lines.len(), "Schema introspected");
        Ok(lines.join("\n"))
    }
}

#[async_trait]
impl QueryExecutor for SqlDatabase {
    async fn run_query(&self, sql: &str) -> Result<QueryOutput> {
        let statement = ensure_read_only(sql)?;

        let rows: Vec<Row> = match &self.pool {
            DatabasePool::Postgres(pool) => self
                .with_timeout("Query execution", sqlx::query(statement).fetch_all(pool))
                .await?
                .iter()
                .map(pg_row_to_json)
                .collect(),
            DatabasePool::Sqlite(pool) => self
                .with_timeout("Query execution", sqlx::query(statement).fetch_all(pool))
                .await?
                .iter()
                .map(sqlite_row_to_json)
                .collect(),
        };

        debug!(rows = rows.len(), "Query executed");
        Ok(QueryOutput::Rows(rows))
    }
}

fn float_value(n: f64) -> Value {
    Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn pg_row_to_json(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, column)| (column.name().to_string(), pg_column_value(row, i)))
        .collect()
}

fn pg_column_value(row: &PgRow, index: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(index) {
        return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i16>, _>(index) {
        return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map(float_value).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(index) {
        return v.map(|n| float_value(n as f64)).unwrap_or(Value::Null);
    }
    // AVG, STDDEV and EXTRACT return NUMERIC
    if let Ok(v) = row.try_get::<Option<bigdecimal::BigDecimal>, _>(index) {
        return v
            .map(|d| {
                let text = d.normalized().to_string();
                text.parse::<i64>()
                    .map(|n| Value::Number(n.into()))
                    .or_else(|_| text.parse::<f64>().map(float_value))
                    .unwrap_or(Value::String(text))
            })
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index) {
        return v
            .map(|dt| Value::String(dt.to_rfc3339()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(index) {
        return v
            .map(|dt| Value::String(dt.format("%Y-%m-%dT%H:%M:%S").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(index) {
        return v.map(|d| Value::String(d.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Value>, _>(index) {
        return v.unwrap_or(Value::Null);
    }

    Value::Null
}

fn sqlite_row_to_json(row: &SqliteRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, column)| (column.name().to_string(), sqlite_column_value(row, i)))
        .collect()
}

fn sqlite_column_value(row: &SqliteRow, index: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map(float_value).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }

    Value::Null
}
