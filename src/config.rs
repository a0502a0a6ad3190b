//! Configuration for the SQL generation agent

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Iteration-count and wall-clock ceilings bounding one agent run.
///
/// Created once per generation request and passed explicitly into the loop;
/// there is no ambient/global configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Budget {
    /// Maximum reasoning/acting cycles (tool calls and parse recoveries
    /// both consume one).
    pub max_iterations: u32,

    /// Wall-clock ceiling for the whole run, in seconds.
    pub max_execution_time_seconds: u64,

    /// Wall-clock ceiling for a single live database query, in seconds.
    pub tool_timeout_seconds: u64,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            max_execution_time_seconds: 200,
            tool_timeout_seconds: 200,
        }
    }
}

impl Budget {
    /// Default budget for the streaming entry point, which runs on a tighter
    /// wall-clock ceiling than synchronous generation.
    pub fn streaming() -> Self {
        Self {
            max_execution_time_seconds: 150,
            ..Self::default()
        }
    }

    pub fn max_execution_time(&self) -> Duration {
        Duration::from_secs(self.max_execution_time_seconds)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_seconds)
    }
}

/// Configuration for the SQL generation agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    // === Model Configuration ===
    /// Model name used for agent reasoning and relevance scoring.
    pub model: String,

    /// Fine-tuned model identifier produced by the external fine-tuning
    /// subsystem. When set it overrides `model` for agent calls.
    pub finetuned_model: Option<String>,

    /// API key (can also use ANTHROPIC_API_KEY env var).
    pub api_key: Option<String>,

    /// Base URL for the model API (for custom endpoints).
    pub base_url: String,

    /// Temperature for agent calls. SQL generation wants determinism.
    pub temperature: f32,

    /// Maximum tokens per completion.
    pub max_tokens: u32,

    /// HTTP request timeout in seconds.
    pub request_timeout_seconds: u64,

    // === Generation Parameters ===
    /// Maximum number of fewshot question/SQL pairs offered to the agent.
    pub max_fewshot_examples: usize,

    /// Row cap applied to agent-run exploration queries.
    pub top_k_rows: usize,

    /// Row cap used when re-executing the final SQL for validation.
    pub validation_rows: usize,

    /// Budget for synchronous generation.
    pub budget: Budget,

    /// Budget for streaming generation.
    pub streaming_budget: Budget,

    // === Streaming Configuration ===
    /// Capacity of the bounded step queue.
    pub stream_capacity: usize,

    /// Delay between empty reads on the consumer side, in milliseconds.
    pub stream_poll_interval_ms: u64,

    /// How long the worker waits to enqueue a step before abandoning it,
    /// in seconds. Keeps the producer from deadlocking against a consumer
    /// that stopped polling.
    pub stream_enqueue_timeout_seconds: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5-20250929".to_string(),
            finetuned_model: None,
            api_key: None,
            base_url: "https://api.anthropic.com".to_string(),
            temperature: 0.0,
            max_tokens: 4096,
            request_timeout_seconds: 60,

            max_fewshot_examples: 5,
            top_k_rows: 50,
            validation_rows: 10,
            budget: Budget::default(),
            streaming_budget: Budget::streaming(),

            stream_capacity: 64,
            stream_poll_interval_ms: 100,
            stream_enqueue_timeout_seconds: 5,
        }
    }
}

impl AgentConfig {
    /// Get the API key from config or environment.
    pub fn get_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| env::var("ANTHROPIC_API_KEY").ok())
    }

    /// Model name for agent calls, honoring the fine-tuned override.
    pub fn model_name(&self) -> &str {
        self.finetuned_model.as_deref().unwrap_or(&self.model)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.get_api_key().is_none() {
            return Err(
                "API key not found. Set ANTHROPIC_API_KEY environment variable or configure api_key"
                    .to_string(),
            );
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err("temperature must be between 0.0 and 1.0".to_string());
        }
        if self.max_tokens == 0 {
            return Err("max_tokens must be greater than 0".to_string());
        }
        if self.budget.max_iterations == 0 {
            return Err("budget.max_iterations must be greater than 0".to_string());
        }
        if self.top_k_rows == 0 {
            return Err("top_k_rows must be greater than 0".to_string());
        }
        if self.stream_capacity == 0 {
            return Err("stream_capacity must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
impl AgentConfig {
    /// Config with a stub API key and a fast poll interval.
    pub(crate) fn for_tests() -> Self {
        Self {
            api_key: Some("test-key".to_string()),
            stream_poll_interval_ms: 1,
            ..Self::default()
        }
    }
}
