//! Schema-aware SQL generation agent.
//!
//! Given a natural-language question and a frozen catalog snapshot of the
//! target database, the agent drives a reasoning/acting loop over a closed
//! set of database tools (relevance scoring, schema inspection, entity
//! checking, live query execution) until the model commits to a SQL query,
//! then validates that query against the database before returning it.
//!
//! ```no_run
//! use std::sync::Arc;
//! use sqlsage::{
//!     AgentConfig, ConnectionSpec, GenerationRequest, Prompt, SchemaCatalog, SqlAgent,
//!     SqlxEngine,
//! };
//!
//! # async fn example(catalog: SchemaCatalog) -> Result<(), Box<dyn std::error::Error>> {
//! let agent = SqlAgent::new(AgentConfig::default())?;
//! let spec = ConnectionSpec {
//!     url: "postgres://localhost/shop".to_string(),
//!     schemas: vec![],
//! };
//! let engine = Arc::new(SqlxEngine::connect(&spec).await?);
//! let result = agent
//!     .generate(GenerationRequest {
//!         prompt: Prompt::new("How many orders were placed last month?"),
//!         catalog,
//!         engine,
//!         instructions: vec![],
//!         fewshots: vec![],
//!     })
//!     .await?;
//! println!("{}", result.sql);
//! # Ok(())
//! # }
//! ```

pub mod agent;
mod assemble;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
mod followup;
pub mod llm;
pub mod logging;
pub mod prompts;
pub mod relevance;
pub mod stream;
pub mod tools;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use agent::{GenerationMode, GenerationRequest, SqlAgent};
pub use catalog::{ColumnDescription, ScanStatus, SchemaCatalog, TableDescription};
pub use config::{AgentConfig, Budget};
pub use engine::{ConnectionSpec, Dialect, QueryResult, SqlEngine, SqlxEngine};
pub use error::{AgentError, AgentResult};
pub use llm::{ChatCompletion, ChatModel};
pub use stream::{StepStream, StreamEvent};
pub use types::{
    AgentStep, AgentTrace, FewshotExample, GenerationStatus, Instruction, Prompt,
    SqlGenerationResult, TokenUsage,
};
