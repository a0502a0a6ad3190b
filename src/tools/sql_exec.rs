//! `SqlDbQuery` and `SqlPreviewQuery`: live statement execution.
//!
//! Execution failures come back as observations so the model can correct
//! the statement. A rejected unsafe statement is the one exception: it
//! aborts the whole run.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::info;

use crate::engine::{EngineError, SqlEngine};
use crate::error::AgentError;
use crate::followup::rewrite_for_preview;
use crate::tools::{Tool, ToolError};

/// Strip the markdown fences and backticks models wrap statements in.
fn clean_sql(input: &str) -> String {
    input
        .trim()
        .trim_start_matches("```sql")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim_matches('`')
        .trim()
        .to_string()
}

async fn execute(
    engine: &dyn SqlEngine,
    sql: &str,
    max_rows: usize,
    deadline: Duration,
) -> Result<String, ToolError> {
    info!("executing SQL: {sql}");
    let outcome = timeout(deadline, engine.run_sql(sql, max_rows))
        .await
        .map_err(|_| ToolError::Timeout)?;
    match outcome {
        Ok(result) => Ok(result.render()),
        Err(EngineError::UnsafeStatement(reason)) => Err(ToolError::Fatal(
            AgentError::SecurityViolation(reason),
        )),
        Err(e) => Ok(format!("Error: {e}")),
    }
}

/// Executes the model's candidate statement and returns the capped result
/// set as the observation.
pub struct SqlExecuteTool {
    engine: Arc<dyn SqlEngine>,
    max_rows: usize,
    deadline: Duration,
}

impl SqlExecuteTool {
    pub fn new(engine: Arc<dyn SqlEngine>, max_rows: usize, deadline: Duration) -> Self {
        Self {
            engine,
            max_rows,
            deadline,
        }
    }
}

#[async_trait]
impl Tool for SqlExecuteTool {
    fn name(&self) -> &'static str {
        "SqlDbQuery"
    }

    fn description(&self) -> &'static str {
        "Input: a SQL query. \
         Output: the result from the database or an error message if the query is incorrect. \
         If an error occurs, rewrite the query and try again. \
         Use this tool to execute the SQL query on the database and check that it is correct."
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        let sql = clean_sql(input);
        if sql.is_empty() {
            return Err(ToolError::InvalidInput(
                "Input must be a SQL query".to_string(),
            ));
        }
        execute(self.engine.as_ref(), &sql, self.max_rows, self.deadline).await
    }
}

/// Executes a broadened preview of a prior statement. The input is first
/// rewritten into wildcard form with a fixed row cap.
pub struct FollowupPreviewTool {
    engine: Arc<dyn SqlEngine>,
    deadline: Duration,
}

impl FollowupPreviewTool {
    pub fn new(engine: Arc<dyn SqlEngine>, deadline: Duration) -> Self {
        Self { engine, deadline }
    }
}

#[async_trait]
impl Tool for FollowupPreviewTool {
    fn name(&self) -> &'static str {
        "SqlPreviewQuery"
    }

    fn description(&self) -> &'static str {
        "Input: a SQL query. \
         Output: a preview of rows the query's tables contain, with filters and ordering removed. \
         Use this tool to inspect the underlying data when refining a previous SQL query."
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        let sql = clean_sql(input);
        if sql.is_empty() {
            return Err(ToolError::InvalidInput(
                "Input must be a SQL query".to_string(),
            ));
        }
        let preview = rewrite_for_preview(&sql);
        // Preview caps its own rows via LIMIT; the fetch bound just backstops it.
        execute(self.engine.as_ref(), &preview, 10, self.deadline).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeEngine;

    #[tokio::test]
    async fn renders_rows_on_success() {
        let engine = Arc::new(FakeEngine::with_rows(
            vec!["city"],
            vec![vec!["Boston"], vec!["Chicago"]],
        ));
        let tool = SqlExecuteTool::new(engine.clone(), 50, Duration::from_secs(5));
        let out = tool.invoke("SELECT city FROM venues").await.unwrap();
        assert!(out.contains("Boston"));
        assert!(out.ends_with("(2 rows)"));
        assert_eq!(engine.last_sql(), "SELECT city FROM venues");
    }

    #[tokio::test]
    async fn strips_markdown_fences() {
        let engine = Arc::new(FakeEngine::ok());
        let tool = SqlExecuteTool::new(engine.clone(), 50, Duration::from_secs(5));
        tool.invoke("```sql\nSELECT 1\n```").await.unwrap();
        assert_eq!(engine.last_sql(), "SELECT 1");
    }

    #[tokio::test]
    async fn execution_error_is_an_observation() {
        let engine = Arc::new(FakeEngine::failing("no such table: ghosts"));
        let tool = SqlExecuteTool::new(engine, 50, Duration::from_secs(5));
        let out = tool.invoke("SELECT * FROM ghosts").await.unwrap();
        assert!(out.contains("no such table: ghosts"));
    }

    #[tokio::test]
    async fn unsafe_statement_is_fatal() {
        let engine = Arc::new(FakeEngine::unsafe_rejecting());
        let tool = SqlExecuteTool::new(engine, 50, Duration::from_secs(5));
        let err = tool.invoke("DROP TABLE users").await.unwrap_err();
        assert!(matches!(
            err,
            ToolError::Fatal(AgentError::SecurityViolation(_))
        ));
    }

    #[tokio::test]
    async fn slow_engine_times_out() {
        let engine = Arc::new(FakeEngine::slow(Duration::from_secs(60)));
        let tool = SqlExecuteTool::new(engine, 50, Duration::from_millis(20));
        let err = tool.invoke("SELECT pg_sleep(60)").await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout));
        assert_eq!(
            err.to_string(),
            "SQL query execution time exceeded, proceed without query execution"
        );
    }

    #[tokio::test]
    async fn preview_rewrites_before_execution() {
        let engine = Arc::new(FakeEngine::ok());
        let tool = FollowupPreviewTool::new(engine.clone(), Duration::from_secs(5));
        tool.invoke("SELECT name FROM orders WHERE total > 5 ORDER BY name")
            .await
            .unwrap();
        assert_eq!(engine.last_sql(), "SELECT * FROM orders LIMIT 10");
    }
}
