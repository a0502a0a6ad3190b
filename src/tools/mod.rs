//! Agent tool registry
//!
//! Tools are the closed set of actions the model may select by name. Each
//! implements the same capability contract: a static name and description
//! for the prompt roster, and `invoke(input) -> Result<observation,
//! ToolError>`. The loop pattern-matches on the result instead of relying
//! on tools swallowing their own failures.

pub mod column_info;
pub mod entity_check;
pub mod fewshot;
pub mod schema_info;
pub mod sql_exec;
pub mod system_time;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::catalog::SchemaCatalog;
use crate::config::AgentConfig;
use crate::engine::SqlEngine;
use crate::error::AgentError;
use crate::llm::ChatModel;
use crate::prompts::ToolSpec;
use crate::types::{FewshotExample, Instruction, UsageMeter};

pub use column_info::ColumnInfoTool;
pub use entity_check::EntityCheckerTool;
pub use fewshot::{AdminInstructionsTool, FewshotRetrieverTool};
pub use schema_info::SchemaInspectorTool;
pub use sql_exec::{FollowupPreviewTool, SqlExecuteTool};
pub use system_time::SystemTimeTool;

/// Observation text recorded when a live query outruns the tool deadline.
/// The assembler must never treat a step carrying it as executed SQL.
pub(crate) const TIMEOUT_OBSERVATION: &str =
    "SQL query execution time exceeded, proceed without query execution";

/// Failure modes at the tool boundary.
///
/// `InvalidInput` and `Timeout` become plain observations and the loop
/// continues; `Fatal` aborts the run and reaches the caller unmodified.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{}", TIMEOUT_OBSERVATION)]
    Timeout,

    #[error(transparent)]
    Fatal(#[from] AgentError),
}

/// Capability contract implemented by every tool variant. No shared state
/// lives behind this trait; each tool owns its slice of the request context.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    async fn invoke(&self, input: &str) -> Result<String, ToolError>;
}

/// Everything the tool constructors need from one generation request.
pub struct ToolContext {
    pub catalog: Arc<SchemaCatalog>,
    pub engine: Arc<dyn SqlEngine>,
    pub model: Arc<dyn ChatModel>,
    pub instructions: Vec<Instruction>,
    pub fewshots: Vec<FewshotExample>,
    pub meter: UsageMeter,
}

/// Closed registry mapping tool identifiers to their implementations.
/// Dispatch is by exact name lookup; there is no open-ended registration.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Full exploration tool set used by first-pass generation.
    pub fn exploration(context: &ToolContext, config: &AgentConfig) -> Self {
        let mut tools: Vec<Arc<dyn Tool>> = vec![Arc::new(SqlExecuteTool::new(
            Arc::clone(&context.engine),
            config.top_k_rows,
            config.budget.tool_timeout(),
        ))];
        if !context.instructions.is_empty() {
            tools.push(Arc::new(AdminInstructionsTool::new(
                context.instructions.clone(),
            )));
        }
        tools.push(Arc::new(SystemTimeTool));
        tools.push(Arc::new(crate::tools::relevance_tool(context)));
        tools.push(Arc::new(SchemaInspectorTool::new(Arc::clone(
            &context.catalog,
        ))));
        tools.push(Arc::new(ColumnInfoTool::new(Arc::clone(&context.catalog))));
        tools.push(Arc::new(EntityCheckerTool::new(
            Arc::clone(&context.catalog),
            Arc::clone(&context.engine),
        )));
        if !context.fewshots.is_empty() {
            tools.push(Arc::new(FewshotRetrieverTool::new(context.fewshots.clone())));
        }
        Self { tools }
    }

    /// Reduced follow-up set: the exploration tools plus the simplified
    /// preview query, used when refining a prior SQL result.
    pub fn followup(context: &ToolContext, config: &AgentConfig) -> Self {
        let mut registry = Self::exploration(context, config);
        registry.tools.insert(
            0,
            Arc::new(FollowupPreviewTool::new(
                Arc::clone(&context.engine),
                config.budget.tool_timeout(),
            )),
        );
        registry
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .iter()
            .find(|tool| tool.name() == name)
            .map(Arc::clone)
    }

    /// Name/description roster for prompt composition.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|tool| ToolSpec {
                name: tool.name(),
                description: tool.description(),
            })
            .collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }
}

/// The relevance-scoring tool wraps the scorer component; defined here to
/// keep the registry constructors in one place.
fn relevance_tool(context: &ToolContext) -> relevance_tool_impl::TableRelevanceTool {
    relevance_tool_impl::TableRelevanceTool::new(
        Arc::clone(&context.model),
        Arc::clone(&context.catalog),
        context.fewshots.clone(),
        context.meter.clone(),
    )
}

mod relevance_tool_impl {
    use super::*;
    use crate::relevance::RelevanceScorer;

    /// `DbTablesWithRelevanceScores`: scores catalog tables against the
    /// question through the relevance scorer.
    pub struct TableRelevanceTool {
        scorer: RelevanceScorer,
        catalog: Arc<SchemaCatalog>,
        fewshots: Vec<FewshotExample>,
        meter: UsageMeter,
    }

    impl TableRelevanceTool {
        pub fn new(
            model: Arc<dyn ChatModel>,
            catalog: Arc<SchemaCatalog>,
            fewshots: Vec<FewshotExample>,
            meter: UsageMeter,
        ) -> Self {
            Self {
                scorer: RelevanceScorer::new(model),
                catalog,
                fewshots,
                meter,
            }
        }
    }

    #[async_trait]
    impl Tool for TableRelevanceTool {
        fn name(&self) -> &'static str {
            "DbTablesWithRelevanceScores"
        }

        fn description(&self) -> &'static str {
            "Input: the given question. \
             Output: tables with their relevance scores, indicating how relevant they are to the question. \
             Use this tool to identify the relevant tables for the given question."
        }

        async fn invoke(&self, input: &str) -> Result<String, ToolError> {
            let outcome = self
                .scorer
                .score(input, &self.catalog, &self.fewshots)
                .await
                .map_err(ToolError::Fatal)?;
            self.meter.record(outcome.usage);

            let mut lines: Vec<String> = outcome
                .scored
                .iter()
                .map(|entry| {
                    format!("Table: `{}`, relevance score: {}", entry.table, entry.score)
                })
                .collect();
            for table in &outcome.forced {
                lines.push(format!("Table: `{table}` (referenced by a similar prior query)"));
            }
            if lines.is_empty() {
                return Ok("No relevant tables found for the question".to_string());
            }
            Ok(lines.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{catalog_with, FakeEngine, ScriptedModel};

    fn context() -> ToolContext {
        ToolContext {
            catalog: Arc::new(catalog_with(&["orders", "customers"])),
            engine: Arc::new(FakeEngine::ok()),
            model: Arc::new(ScriptedModel::new(vec![])),
            instructions: vec![Instruction::new("always filter soft-deleted rows")],
            fewshots: vec![FewshotExample::new("q", "SELECT 1 FROM orders")],
            meter: UsageMeter::new(),
        }
    }

    #[test]
    fn exploration_set_contains_expected_tools() {
        let registry = ToolRegistry::exploration(&context(), &AgentConfig::default());
        let names = registry.names();
        for expected in [
            "SqlDbQuery",
            "GetAdminInstructions",
            "SystemTime",
            "DbTablesWithRelevanceScores",
            "DbRelevantTablesSchema",
            "DbRelevantColumnsInfo",
            "DbColumnEntityChecker",
            "FewshotExamplesRetriever",
        ] {
            assert!(names.contains(&expected), "missing {expected}");
        }
        assert!(!names.contains(&"SqlPreviewQuery"));
    }

    #[test]
    fn followup_set_adds_preview_tool() {
        let registry = ToolRegistry::followup(&context(), &AgentConfig::default());
        assert!(registry.names().contains(&"SqlPreviewQuery"));
        assert!(registry.get("SqlPreviewQuery").is_some());
        assert!(registry.get("NoSuchTool").is_none());
    }

    #[test]
    fn context_tools_are_conditional() {
        let mut bare = context();
        bare.instructions.clear();
        bare.fewshots.clear();
        let registry = ToolRegistry::exploration(&bare, &AgentConfig::default());
        let names = registry.names();
        assert!(!names.contains(&"GetAdminInstructions"));
        assert!(!names.contains(&"FewshotExamplesRetriever"));
    }
}
