//! Shared fakes for unit tests: a scripted model, an in-memory engine, and
//! catalog builders.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::catalog::{ScanStatus, SchemaCatalog, TableDescription};
use crate::engine::{Dialect, EngineError, QueryResult, SqlEngine};
use crate::error::{AgentError, AgentResult};
use crate::llm::{ChatCompletion, ChatModel};
use crate::types::TokenUsage;

/// Model fake that replays a fixed sequence of completions.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
    failure: Option<String>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            failure: None,
        }
    }

    /// A model whose every call fails with a provider error.
    pub fn failing(message: &str) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            failure: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(
        &self,
        _system: &str,
        _user: &str,
        _temperature: f32,
    ) -> AgentResult<ChatCompletion> {
        if let Some(message) = &self.failure {
            return Err(AgentError::Provider(message.clone()));
        }
        let text = self
            .responses
            .lock()
            .expect("poisoned")
            .pop_front()
            .ok_or_else(|| AgentError::Provider("scripted responses exhausted".to_string()))?;
        Ok(ChatCompletion {
            text,
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
        })
    }
}

enum FakeBehavior {
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Fail(String),
    Unsafe,
    Slow(Duration),
}

/// Engine fake recording the last statement it was asked to run.
pub struct FakeEngine {
    behavior: FakeBehavior,
    last_sql: Mutex<String>,
    last_max_rows: Mutex<usize>,
}

impl FakeEngine {
    fn with_behavior(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            last_sql: Mutex::new(String::new()),
            last_max_rows: Mutex::new(0),
        }
    }

    /// Engine answering every query with a single `result` row.
    pub fn ok() -> Self {
        Self::with_rows(vec!["result"], vec![vec!["1"]])
    }

    pub fn with_rows(columns: Vec<&str>, rows: Vec<Vec<&str>>) -> Self {
        Self::with_behavior(FakeBehavior::Rows {
            columns: columns.into_iter().map(String::from).collect(),
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(String::from).collect())
                .collect(),
        })
    }

    /// Engine failing every query with an execution error.
    pub fn failing(message: &str) -> Self {
        Self::with_behavior(FakeBehavior::Fail(message.to_string()))
    }

    /// Engine rejecting every statement as unsafe.
    pub fn unsafe_rejecting() -> Self {
        Self::with_behavior(FakeBehavior::Unsafe)
    }

    /// Engine sleeping past any reasonable tool deadline.
    pub fn slow(delay: Duration) -> Self {
        Self::with_behavior(FakeBehavior::Slow(delay))
    }

    pub fn last_sql(&self) -> String {
        self.last_sql.lock().expect("poisoned").clone()
    }

    pub fn last_max_rows(&self) -> usize {
        *self.last_max_rows.lock().expect("poisoned")
    }
}

#[async_trait]
impl SqlEngine for FakeEngine {
    fn dialect(&self) -> Dialect {
        Dialect::PostgreSql
    }

    async fn run_sql(&self, sql: &str, max_rows: usize) -> Result<QueryResult, EngineError> {
        *self.last_sql.lock().expect("poisoned") = sql.to_string();
        *self.last_max_rows.lock().expect("poisoned") = max_rows;
        match &self.behavior {
            FakeBehavior::Rows { columns, rows } => {
                let truncated = rows.len() > max_rows;
                Ok(QueryResult {
                    columns: columns.clone(),
                    rows: rows.iter().take(max_rows).cloned().collect(),
                    truncated,
                })
            }
            FakeBehavior::Fail(message) => Err(EngineError::Execution(message.clone())),
            FakeBehavior::Unsafe => Err(EngineError::UnsafeStatement(
                "statement contains forbidden keyword".to_string(),
            )),
            FakeBehavior::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(QueryResult::default())
            }
        }
    }
}

/// One scanned table with a trivial DDL and no columns.
pub fn table_named(name: &str) -> TableDescription {
    TableDescription {
        name: name.to_string(),
        schema: None,
        description: None,
        ddl: format!("CREATE TABLE {name} (id INTEGER)"),
        columns: vec![],
        examples: vec![],
        status: ScanStatus::Scanned,
    }
}

/// A catalog of scanned tables built from bare names.
pub fn catalog_with(names: &[&str]) -> SchemaCatalog {
    SchemaCatalog::new(names.iter().map(|name| table_named(name)).collect())
}
