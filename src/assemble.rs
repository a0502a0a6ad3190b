//! Final answer assembly and validation.
//!
//! Pulls the SQL out of the model's final answer (or, failing that, out of
//! the trace), re-executes it against the target database, and packages the
//! outcome. VALID is earned by a successful validation run, never assumed.

use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::engine::{EngineError, SqlEngine};
use crate::error::{AgentError, AgentResult};
use crate::tools::TIMEOUT_OBSERVATION;
use crate::types::{
    normalize_identifier, AgentStep, AgentTrace, GenerationStatus, SqlGenerationResult,
    TokenUsage,
};

fn fenced_sql_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```sql\s*(.*?)\s*```").expect("valid regex"))
}

/// Extract the statement from a final answer: the last ```sql fenced block
/// wins; a fence-free answer that reads like a statement is taken verbatim.
fn extract_sql(answer: &str) -> Option<String> {
    if let Some(capture) = fenced_sql_regex().captures_iter(answer).last() {
        let sql = capture[1].trim();
        return (!sql.is_empty()).then(|| sql.to_string());
    }
    let trimmed = answer.trim().trim_matches('`').trim();
    let lowered = trimmed.to_lowercase();
    (lowered.starts_with("select") || lowered.starts_with("with"))
        .then(|| trimmed.to_string())
}

/// Newest successful `SqlDbQuery` input on the trace, if any. Steps whose
/// observation is an execution error or the timeout message never count.
fn last_executed_sql(trace: &[AgentStep]) -> Option<String> {
    trace
        .iter()
        .rev()
        .find(|step| {
            step.tool_name == "SqlDbQuery"
                && !step.output.starts_with("Error:")
                && step.output != TIMEOUT_OBSERVATION
        })
        .map(|step| step.input.clone())
}

pub(crate) struct ResultAssembler {
    engine: Arc<dyn SqlEngine>,
    validation_rows: usize,
    deadline: Duration,
}

impl ResultAssembler {
    pub fn new(engine: Arc<dyn SqlEngine>, validation_rows: usize, deadline: Duration) -> Self {
        Self {
            engine,
            validation_rows,
            deadline,
        }
    }

    /// Assemble from a committed final answer, falling back to the trace
    /// when the answer carries no usable statement.
    pub async fn assemble(
        &self,
        answer: &str,
        trace: AgentTrace,
        tokens_used: TokenUsage,
    ) -> AgentResult<SqlGenerationResult> {
        let sql = extract_sql(answer).or_else(|| last_executed_sql(&trace));
        match sql {
            Some(sql) => self.validate(sql, trace, tokens_used).await,
            None => Ok(SqlGenerationResult::failed(
                "No SQL query found in the final answer or the execution trace",
                tokens_used,
                trace,
            )),
        }
    }

    /// Assemble after budget exhaustion: no further model calls, just the
    /// newest statement the agent already ran successfully.
    pub async fn assemble_best_effort(
        &self,
        trace: AgentTrace,
        tokens_used: TokenUsage,
    ) -> AgentResult<SqlGenerationResult> {
        match last_executed_sql(&trace) {
            Some(sql) => self.validate(sql, trace, tokens_used).await,
            None => Ok(SqlGenerationResult::failed(
                "Agent stopped due to iteration limit or time limit",
                tokens_used,
                trace,
            )),
        }
    }

    /// Re-execute the candidate under the tool deadline. A guard rejection
    /// is fatal; a timeout or any other execution failure marks the result
    /// INVALID with the corresponding message.
    async fn validate(
        &self,
        sql: String,
        trace: AgentTrace,
        tokens_used: TokenUsage,
    ) -> AgentResult<SqlGenerationResult> {
        let sql = normalize_identifier(&sql);
        debug!("validating assembled SQL: {sql}");
        let outcome = match timeout(self.deadline, self.engine.run_sql(&sql, self.validation_rows))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("validation run exceeded the tool deadline");
                return Ok(SqlGenerationResult {
                    sql,
                    status: GenerationStatus::Invalid,
                    tokens_used,
                    error: Some(TIMEOUT_OBSERVATION.to_string()),
                    intermediate_steps: trace,
                    completed_at: chrono::Utc::now(),
                });
            }
        };
        match outcome {
            Ok(_) => {
                info!("generation validated successfully");
                Ok(SqlGenerationResult {
                    sql,
                    status: GenerationStatus::Valid,
                    tokens_used,
                    error: None,
                    intermediate_steps: trace,
                    completed_at: chrono::Utc::now(),
                })
            }
            Err(EngineError::UnsafeStatement(reason)) => {
                Err(AgentError::SecurityViolation(reason))
            }
            Err(e) => Ok(SqlGenerationResult {
                sql,
                status: GenerationStatus::Invalid,
                tokens_used,
                error: Some(e.to_string()),
                intermediate_steps: trace,
                completed_at: chrono::Utc::now(),
            }),
        }
    }
}
