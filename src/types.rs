//! Core request/response types shared across the generation pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// A natural-language question with an optional schema scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub text: String,
    /// Schemas the question is scoped to; empty means no filtering.
    #[serde(default)]
    pub schemas: Vec<String>,
}

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            schemas: Vec::new(),
        }
    }
}

/// Free-text administrative rule, injected verbatim into the agent context.
/// Order is preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instruction {
    pub text: String,
}

impl Instruction {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A previously validated question/SQL pair used to steer generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FewshotExample {
    pub question: String,
    pub sql: String,
}

impl FewshotExample {
    pub fn new(question: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            sql: sql.into(),
        }
    }
}

/// Drop examples whose question text was already seen, keeping original order.
pub fn dedup_examples(examples: &[FewshotExample]) -> Vec<FewshotExample> {
    let mut seen: Vec<&str> = Vec::new();
    let mut result = Vec::new();
    for example in examples {
        if !seen.contains(&example.question.as_str()) {
            seen.push(example.question.as_str());
            result.push(example.clone());
        }
    }
    result
}

/// One tool invocation recorded on the agent trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStep {
    pub tool_name: String,
    pub input: String,
    pub output: String,
    pub timestamp: DateTime<Utc>,
}

impl AgentStep {
    pub fn new(
        tool_name: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            input: input.into(),
            output: output.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only, ordered record of the agent's tool invocations.
pub type AgentTrace = Vec<AgentStep>;

/// Final status of a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GenerationStatus {
    Valid,
    Invalid,
}

/// Token accounting accumulated across every model call in one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Shared accumulator for token usage. Both the agent loop and tools that
/// make their own model calls (table relevance scoring) record into it.
#[derive(Debug, Clone, Default)]
pub struct UsageMeter(Arc<Mutex<TokenUsage>>);

impl UsageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, usage: TokenUsage) {
        if let Ok(mut total) = self.0.lock() {
            total.add(usage);
        }
    }

    pub fn snapshot(&self) -> TokenUsage {
        self.0.lock().map(|total| *total).unwrap_or_default()
    }
}

/// The outcome of one generation request.
///
/// `status` is `Valid` only when the assembled SQL re-executed successfully
/// against the target database during validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlGenerationResult {
    pub sql: String,
    pub status: GenerationStatus,
    pub tokens_used: TokenUsage,
    pub error: Option<String>,
    pub intermediate_steps: AgentTrace,
    pub completed_at: DateTime<Utc>,
}

impl SqlGenerationResult {
    /// An INVALID result carrying an error message and whatever trace exists.
    pub fn failed(
        error: impl Into<String>,
        tokens_used: TokenUsage,
        intermediate_steps: AgentTrace,
    ) -> Self {
        Self {
            sql: String::new(),
            status: GenerationStatus::Invalid,
            tokens_used,
            error: Some(error.into()),
            intermediate_steps,
            completed_at: Utc::now(),
        }
    }
}

/// Replace escaped underscore sequences the model tends to emit.
pub(crate) fn normalize_identifier(text: &str) -> String {
    text.trim().replace("\\_", "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_first_occurrence_in_order() {
        let examples = vec![
            FewshotExample::new("q1", "SELECT 1"),
            FewshotExample::new("q2", "SELECT 2"),
            FewshotExample::new("q1", "SELECT 99"),
            FewshotExample::new("q3", "SELECT 3"),
        ];
        let deduped = dedup_examples(&examples);
        assert_eq!(deduped.len(), 3);
        assert_eq!(deduped[0].sql, "SELECT 1");
        assert_eq!(
            deduped.iter().map(|e| e.question.as_str()).collect::<Vec<_>>(),
            vec!["q1", "q2", "q3"]
        );
    }

    #[test]
    fn usage_meter_accumulates() {
        let meter = UsageMeter::new();
        meter.record(TokenUsage {
            prompt_tokens: 100,
            completion_tokens: 20,
            total_tokens: 120,
        });
        meter.record(TokenUsage {
            prompt_tokens: 50,
            completion_tokens: 10,
            total_tokens: 60,
        });
        let total = meter.snapshot();
        assert_eq!(total.prompt_tokens, 150);
        assert_eq!(total.total_tokens, 180);
    }

    #[test]
    fn normalize_strips_escaped_underscores() {
        assert_eq!(normalize_identifier(" account\\_margins "), "account_margins");
    }
}
