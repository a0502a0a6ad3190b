//! Error types for SQL generation

use thiserror::Error;

/// Result type for SQL generation operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors that can occur while generating SQL
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("model provider error: {0}")]
    Provider(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no scanned tables found for database")]
    EmptyCatalog,

    #[error("unsafe SQL statement rejected: {0}")]
    SecurityViolation(String),

    #[error("API error: {status_code} - {message}")]
    Api { status_code: u16, message: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database engine error: {0}")]
    Engine(#[from] crate::engine::EngineError),
}

impl AgentError {
    /// Whether the error must reach the caller unmodified instead of being
    /// folded into an INVALID generation result.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AgentError::SecurityViolation(_))
    }
}
