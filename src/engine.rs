//! Live database execution seam
//!
//! Each generation request owns one engine handle; nothing is pooled or
//! shared across requests. Every statement passes the injection guard
//! before it reaches the wire.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use regex::Regex;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Column, Row};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::error::{AgentError, AgentResult};

/// SQL dialect of the target database, derived from the connection URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Dialect {
    PostgreSql,
    MySql,
    Sqlite,
}

impl Dialect {
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::PostgreSql => "PostgreSQL",
            Dialect::MySql => "MySQL",
            Dialect::Sqlite => "SQLite",
        }
    }

    pub fn from_url(url: &str) -> AgentResult<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| AgentError::Configuration(format!("invalid connection URL: {e}")))?;
        match parsed.scheme() {
            "postgres" | "postgresql" => Ok(Dialect::PostgreSql),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "sqlite" => Ok(Dialect::Sqlite),
            other => Err(AgentError::Configuration(format!(
                "unsupported database scheme: {other}"
            ))),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Connection descriptor consumed from the surrounding request layer.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConnectionSpec {
    /// Database URL (postgres://, mysql://, sqlite://).
    pub url: String,
    /// Optional schema filter applied to the catalog snapshot.
    #[serde(default)]
    pub schemas: Vec<String>,
}

/// Errors from live SQL execution.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The injection guard rejected the statement before execution.
    #[error("unsafe SQL statement rejected: {0}")]
    UnsafeStatement(String),

    #[error("SQL execution error: {0}")]
    Execution(String),

    #[error("connection error: {0}")]
    Connection(String),
}

/// Result rows from one query, already stringified and capped.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// True when the row cap truncated the result set.
    pub truncated: bool,
}

impl QueryResult {
    /// Compact textual rendering used as a tool observation.
    pub fn render(&self) -> String {
        if self.rows.is_empty() {
            return "(no rows)".to_string();
        }
        let mut out = self.columns.join(" | ");
        out.push('\n');
        for row in &self.rows {
            out.push_str(&row.join(" | "));
            out.push('\n');
        }
        if self.truncated {
            out.push_str(&format!("({} rows, truncated)", self.rows.len()));
        } else {
            out.push_str(&format!("({} rows)", self.rows.len()));
        }
        out
    }
}

/// Seam for running SQL against the target database. A single trait method
/// keeps the tools and the result validator testable against fakes.
#[async_trait]
pub trait SqlEngine: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Run a statement and return at most `max_rows` stringified rows.
    async fn run_sql(&self, sql: &str, max_rows: usize) -> Result<QueryResult, EngineError>;
}

fn unsafe_keyword_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(insert|update|delete|drop|alter|create|truncate|replace|grant|revoke|attach|detach|vacuum|pragma)\b",
        )
        .expect("valid regex")
    })
}

/// Reject statements the agent must never run: anything mutating, and
/// stacked statements that smuggle a second command behind the first.
pub fn guard_statement(sql: &str) -> Result<(), EngineError> {
    let trimmed = sql.trim();
    if let Some(m) = unsafe_keyword_regex().find(trimmed) {
        return Err(EngineError::UnsafeStatement(format!(
            "statement contains forbidden keyword `{}`",
            m.as_str()
        )));
    }
    if let Some((_, rest)) = trimmed.split_once(';') {
        if !rest.trim().is_empty() {
            return Err(EngineError::UnsafeStatement(
                "multiple statements are not allowed".to_string(),
            ));
        }
    }
    Ok(())
}

/// sqlx-backed engine over the `Any` driver.
pub struct SqlxEngine {
    pool: AnyPool,
    dialect: Dialect,
}

impl SqlxEngine {
    /// Open a dedicated connection for one generation request.
    pub async fn connect(spec: &ConnectionSpec) -> AgentResult<Self> {
        let dialect = Dialect::from_url(&spec.url)?;
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect(&spec.url)
            .await?;
        debug!("connected to {} database", dialect);
        Ok(Self { pool, dialect })
    }
}

#[async_trait]
impl SqlEngine for SqlxEngine {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn run_sql(&self, sql: &str, max_rows: usize) -> Result<QueryResult, EngineError> {
        guard_statement(sql)?;
        // Incremental fetch: the row cap bounds the transfer, not just the
        // returned slice.
        let mut stream = sqlx::query(sql).fetch(&self.pool);
        let mut fetched: Vec<AnyRow> = Vec::new();
        let mut truncated = false;
        while let Some(row) = stream
            .try_next()
            .await
            .map_err(|e| EngineError::Execution(e.to_string()))?
        {
            if fetched.len() >= max_rows {
                truncated = true;
                break;
            }
            fetched.push(row);
        }

        let columns = fetched
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|column| column.name().to_string())
                    .collect()
            })
            .unwrap_or_default();
        let rows = fetched
            .iter()
            .map(|row| {
                (0..row.columns().len())
                    .map(|idx| any_value_to_string(row, idx))
                    .collect()
            })
            .collect();

        Ok(QueryResult {
            columns,
            rows,
            truncated,
        })
    }
}

/// Best-effort stringification of an `Any` driver value.
fn any_value_to_string(row: &AnyRow, idx: usize) -> String {
    if let Ok(value) = row.try_get::<Option<String>, _>(idx) {
        return value.unwrap_or_else(|| "NULL".to_string());
    }
    if let Ok(value) = row.try_get::<Option<i64>, _>(idx) {
        return value.map_or_else(|| "NULL".to_string(), |v| v.to_string());
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(idx) {
        return value.map_or_else(|| "NULL".to_string(), |v| v.to_string());
    }
    if let Ok(value) = row.try_get::<Option<bool>, _>(idx) {
        return value.map_or_else(|| "NULL".to_string(), |v| v.to_string());
    }
    "<unprintable>".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("SELECT * FROM users")]
    #[case("select count(*) from orders where created_date > '2024-01-01'")]
    #[case("SELECT 1;")]
    #[case("WITH t AS (SELECT 1 AS n) SELECT n FROM t")]
    fn guard_accepts_read_queries(#[case] sql: &str) {
        assert!(guard_statement(sql).is_ok());
    }

    #[rstest]
    #[case("DROP TABLE users")]
    #[case("SELECT 1; DELETE FROM users")]
    #[case("update accounts set balance = 0")]
    #[case("CREATE TABLE t (id INT)")]
    #[case("SELECT * FROM a; SELECT * FROM b")]
    fn guard_rejects_unsafe_statements(#[case] sql: &str) {
        assert!(matches!(
            guard_statement(sql),
            Err(EngineError::UnsafeStatement(_))
        ));
    }

    #[test]
    fn dialect_from_url() {
        assert_eq!(
            Dialect::from_url("postgres://localhost/db").unwrap(),
            Dialect::PostgreSql
        );
        assert_eq!(
            Dialect::from_url("mysql://localhost/db").unwrap(),
            Dialect::MySql
        );
        assert_eq!(
            Dialect::from_url("sqlite:///tmp/db.sqlite").unwrap(),
            Dialect::Sqlite
        );
        assert!(Dialect::from_url("mongodb://localhost").is_err());
    }

    #[tokio::test]
    async fn row_cap_bounds_the_fetch() {
        let engine = SqlxEngine::connect(&ConnectionSpec {
            url: "sqlite::memory:".to_string(),
            schemas: vec![],
        })
        .await
        .unwrap();
        let result = engine
            .run_sql(
                "WITH RECURSIVE cnt(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM cnt WHERE x < 100) \
                 SELECT x FROM cnt",
                10,
            )
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 10);
        assert!(result.truncated);
    }

    #[test]
    fn render_marks_truncation() {
        let result = QueryResult {
            columns: vec!["city".to_string()],
            rows: vec![vec!["New York".to_string()], vec!["Boston".to_string()]],
            truncated: true,
        };
        let rendered = result.render();
        assert!(rendered.starts_with("city\n"));
        assert!(rendered.contains("New York"));
        assert!(rendered.ends_with("(2 rows, truncated)"));

        let empty = QueryResult::default();
        assert_eq!(empty.render(), "(no rows)");
    }
}
