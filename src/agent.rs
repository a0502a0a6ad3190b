//! ReAct generation loop and the agent facade.
//!
//! The loop is an explicit state machine over Thought/Action/Action Input/
//! Observation cycles: call the model, parse one action, run the tool,
//! append the observation to the scratchpad, repeat until the model commits
//! to a final answer or the budget runs out. A malformed completion is not
//! fatal; it consumes an iteration and feeds a corrective observation back.

use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::assemble::ResultAssembler;
use crate::catalog::SchemaCatalog;
use crate::config::{AgentConfig, Budget};
use crate::engine::SqlEngine;
use crate::error::{AgentError, AgentResult};
use crate::llm::{AnthropicModel, ChatModel};
use crate::prompts::{self, PromptTemplate, ERROR_PARSING_MESSAGE, FINAL_ANSWER_MARKER};
use crate::stream::StepSink;
use crate::tools::{ToolContext, ToolError, ToolRegistry};
use crate::types::{
    dedup_examples, AgentStep, AgentTrace, FewshotExample, Instruction, Prompt,
    SqlGenerationResult, UsageMeter,
};

/// Trace entry name for recovered parsing failures.
const PARSER_STEP: &str = "_parser";

/// One parsed model completion.
#[derive(Debug, PartialEq)]
enum ParsedStep {
    Action { tool: String, input: String },
    FinalAnswer(String),
    Unparsable,
}

fn action_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)Action\s*\d*\s*:\s*(.*?)\s*Action\s*\d*\s*Input\s*\d*\s*:\s*(.*)")
            .expect("valid regex")
    })
}

/// Parse a completion against the action grammar. A completion carrying
/// both an action and a final answer is ambiguous and treated as malformed.
fn parse_step(text: &str) -> ParsedStep {
    let action = action_regex().captures(text);
    let answer_at = text.find(FINAL_ANSWER_MARKER);

    match (action, answer_at) {
        (Some(_), Some(_)) => ParsedStep::Unparsable,
        (Some(capture), None) => {
            let tool = capture[1].trim().trim_matches('`').to_string();
            let raw = capture[2].trim();
            // Models sometimes hallucinate the observation; cut it off.
            let input = match raw.find("\nObservation") {
                Some(idx) => &raw[..idx],
                None => raw,
            };
            ParsedStep::Action {
                tool,
                input: input.trim().trim_matches('"').to_string(),
            }
        }
        (None, Some(idx)) => {
            ParsedStep::FinalAnswer(text[idx + FINAL_ANSWER_MARKER.len()..].trim().to_string())
        }
        (None, None) => ParsedStep::Unparsable,
    }
}

/// How one loop ended, short of a fatal error.
pub(crate) enum LoopEnd {
    FinalAnswer(String),
    /// Iteration or wall-clock budget ran out before a final answer.
    Exhausted,
    /// A model call failed; the trace up to that point survives.
    Failed(AgentError),
}

pub(crate) struct LoopOutcome {
    pub end: LoopEnd,
    pub trace: AgentTrace,
}

pub(crate) struct AgentLoop<'a> {
    model: Arc<dyn ChatModel>,
    registry: &'a ToolRegistry,
    template: &'a PromptTemplate,
    budget: Budget,
    temperature: f32,
    meter: UsageMeter,
    sink: Option<&'a StepSink>,
}

impl<'a> AgentLoop<'a> {
    pub fn new(
        model: Arc<dyn ChatModel>,
        registry: &'a ToolRegistry,
        template: &'a PromptTemplate,
        budget: Budget,
        temperature: f32,
        meter: UsageMeter,
        sink: Option<&'a StepSink>,
    ) -> Self {
        Self {
            model,
            registry,
            template,
            budget,
            temperature,
            meter,
            sink,
        }
    }

    /// Drive the loop to completion. Only fatal errors surface as `Err`;
    /// everything else is expressed through `LoopEnd`.
    pub async fn run(&self, question: &str) -> AgentResult<LoopOutcome> {
        let started = Instant::now();
        let mut scratchpad = String::new();
        let mut trace: AgentTrace = Vec::new();

        for iteration in 0..self.budget.max_iterations {
            if started.elapsed() >= self.budget.max_execution_time() {
                info!("execution time budget exhausted after {iteration} iterations");
                return Ok(LoopOutcome {
                    end: LoopEnd::Exhausted,
                    trace,
                });
            }

            let user = self.template.render(question, &scratchpad);
            let completion = match self
                .model
                .complete(self.template.header(), &user, self.temperature)
                .await
            {
                Ok(completion) => completion,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    return Ok(LoopOutcome {
                        end: LoopEnd::Failed(e),
                        trace,
                    })
                }
            };
            self.meter.record(completion.usage);
            scratchpad.push_str(&completion.text);

            match parse_step(&completion.text) {
                ParsedStep::FinalAnswer(answer) => {
                    debug!("final answer after {} tool calls", trace.len());
                    return Ok(LoopOutcome {
                        end: LoopEnd::FinalAnswer(answer),
                        trace,
                    });
                }
                ParsedStep::Action { tool, input } => {
                    let observation = match self.invoke_tool(&tool, &input).await {
                        Ok(observation) => observation,
                        Err(e) => return Err(e),
                    };
                    let step = AgentStep::new(&tool, &input, &observation);
                    self.emit(&step).await;
                    trace.push(step);
                    scratchpad.push_str(&format!("\nObservation: {observation}\nThought: "));
                }
                ParsedStep::Unparsable => {
                    warn!("malformed completion at iteration {iteration}");
                    let step = AgentStep::new(PARSER_STEP, &completion.text, ERROR_PARSING_MESSAGE);
                    self.emit(&step).await;
                    trace.push(step);
                    scratchpad
                        .push_str(&format!("\nObservation: {ERROR_PARSING_MESSAGE}\nThought: "));
                }
            }
        }

        info!(
            "iteration budget ({}) exhausted without a final answer",
            self.budget.max_iterations
        );
        Ok(LoopOutcome {
            end: LoopEnd::Exhausted,
            trace,
        })
    }

    /// Run one tool. Recoverable tool failures become observation text;
    /// only `ToolError::Fatal` escapes.
    async fn invoke_tool(&self, tool: &str, input: &str) -> AgentResult<String> {
        let Some(handle) = self.registry.get(tool) else {
            return Ok(format!("{tool} is not a valid tool, try another one"));
        };
        match handle.invoke(input).await {
            Ok(observation) => Ok(observation),
            Err(ToolError::Fatal(e)) => Err(e),
            Err(recoverable) => Ok(recoverable.to_string()),
        }
    }

    async fn emit(&self, step: &AgentStep) {
        if let Some(sink) = self.sink {
            sink.send_step(step.clone()).await;
        }
    }
}

/// Which tool roster a generation uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    /// First-pass generation over the full exploration tool set.
    Exploration,
    /// Refinement of a prior result; adds the preview query tool.
    Followup,
}

/// Everything one generation needs besides the agent itself. The catalog
/// and engine are owned per request; concurrent generations never share.
pub struct GenerationRequest {
    pub prompt: Prompt,
    pub catalog: SchemaCatalog,
    pub engine: Arc<dyn SqlEngine>,
    pub instructions: Vec<Instruction>,
    pub fewshots: Vec<FewshotExample>,
}

/// Facade over the generation pipeline. Cheap to clone; the model client
/// is shared behind an `Arc`.
#[derive(Clone)]
pub struct SqlAgent {
    config: AgentConfig,
    model: Arc<dyn ChatModel>,
}

impl SqlAgent {
    /// Build an agent backed by the hosted model API.
    pub fn new(config: AgentConfig) -> AgentResult<Self> {
        config.validate().map_err(AgentError::Configuration)?;
        let model = AnthropicModel::new(&config)?;
        Ok(Self {
            config,
            model: Arc::new(model),
        })
    }

    /// Build an agent over an arbitrary model implementation.
    pub fn with_model(config: AgentConfig, model: Arc<dyn ChatModel>) -> AgentResult<Self> {
        config.validate().map_err(AgentError::Configuration)?;
        Ok(Self { config, model })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Generate SQL for a question using the exploration tool set.
    pub async fn generate(
        &self,
        request: GenerationRequest,
    ) -> AgentResult<SqlGenerationResult> {
        self.run_generation(request, GenerationMode::Exploration, self.config.budget, None)
            .await
    }

    /// Refine a question against a prior result with the follow-up tool set.
    pub async fn generate_followup(
        &self,
        request: GenerationRequest,
    ) -> AgentResult<SqlGenerationResult> {
        self.run_generation(request, GenerationMode::Followup, self.config.budget, None)
            .await
    }

    pub(crate) async fn run_generation(
        &self,
        request: GenerationRequest,
        mode: GenerationMode,
        budget: Budget,
        sink: Option<&StepSink>,
    ) -> AgentResult<SqlGenerationResult> {
        let catalog = request.catalog.filtered(&request.prompt.schemas);
        if catalog.is_empty() {
            return Err(AgentError::EmptyCatalog);
        }
        let catalog = Arc::new(catalog);
        let fewshots = dedup_examples(&request.fewshots);
        info!(
            "starting {:?} generation over {} tables ({} instructions, {} fewshot examples)",
            mode,
            catalog.len(),
            request.instructions.len(),
            fewshots.len()
        );

        let meter = UsageMeter::new();
        let context = ToolContext {
            catalog: Arc::clone(&catalog),
            engine: Arc::clone(&request.engine),
            model: Arc::clone(&self.model),
            instructions: request.instructions.clone(),
            fewshots: fewshots.clone(),
            meter: meter.clone(),
        };
        let registry = match mode {
            GenerationMode::Exploration => ToolRegistry::exploration(&context, &self.config),
            GenerationMode::Followup => ToolRegistry::followup(&context, &self.config),
        };
        let template = prompts::build_template(
            request.engine.dialect(),
            self.config.max_fewshot_examples,
            !request.instructions.is_empty(),
            !fewshots.is_empty(),
            &registry.specs(),
        );

        let outcome = AgentLoop::new(
            Arc::clone(&self.model),
            &registry,
            &template,
            budget,
            self.config.temperature,
            meter.clone(),
            sink,
        )
        .run(&request.prompt.text)
        .await?;

        let assembler = ResultAssembler::new(
            Arc::clone(&request.engine),
            self.config.validation_rows,
            budget.tool_timeout(),
        );
        match outcome.end {
            LoopEnd::FinalAnswer(answer) => {
                assembler
                    .assemble(&answer, outcome.trace, meter.snapshot())
                    .await
            }
            LoopEnd::Exhausted => {
                assembler
                    .assemble_best_effort(outcome.trace, meter.snapshot())
                    .await
            }
            LoopEnd::Failed(e) => Ok(SqlGenerationResult::failed(
                e.to_string(),
                meter.snapshot(),
                outcome.trace,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{catalog_with, FakeEngine, ScriptedModel};
    use crate::types::GenerationStatus;

    fn agent(responses: Vec<&str>) -> SqlAgent {
        let model = Arc::new(ScriptedModel::new(
            responses.into_iter().map(String::from).collect(),
        ));
        SqlAgent::with_model(AgentConfig::for_tests(), model).unwrap()
    }

    fn request(engine: Arc<FakeEngine>) -> GenerationRequest {
        GenerationRequest {
            prompt: Prompt::new("how many orders were placed last month?"),
            catalog: catalog_with(&["orders", "customers"]),
            engine,
            instructions: vec![],
            fewshots: vec![],
        }
    }

    #[test]
    fn parses_action_and_input() {
        let step = parse_step(
            "Thought: I should check the time\nAction: SystemTime\nAction Input: \"\"",
        );
        assert_eq!(
            step,
            ParsedStep::Action {
                tool: "SystemTime".to_string(),
                input: String::new()
            }
        );
    }

    #[test]
    fn parses_final_answer() {
        let step = parse_step(
            "Thought: I now know the final answer\nFinal Answer: ```sql\nSELECT 1\n```",
        );
        assert_eq!(
            step,
            ParsedStep::FinalAnswer("```sql\nSELECT 1\n```".to_string())
        );
    }

    #[test]
    fn ambiguous_and_malformed_completions_are_unparsable() {
        assert_eq!(
            parse_step("Action: SqlDbQuery\nAction Input: SELECT 1\nFinal Answer: done"),
            ParsedStep::Unparsable
        );
        assert_eq!(parse_step("I think the answer is 42."), ParsedStep::Unparsable);
    }

    #[test]
    fn hallucinated_observation_is_cut_from_input() {
        let step = parse_step(
            "Action: SqlDbQuery\nAction Input: SELECT 1\nObservation: 1 row returned",
        );
        assert_eq!(
            step,
            ParsedStep::Action {
                tool: "SqlDbQuery".to_string(),
                input: "SELECT 1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn happy_path_executes_then_answers() {
        let engine = Arc::new(FakeEngine::with_rows(vec!["count"], vec![vec!["42"]]));
        let agent = agent(vec![
            "Thought: run it\nAction: SqlDbQuery\nAction Input: SELECT COUNT(*) FROM orders",
            "Thought: I now know the final answer\nFinal Answer: ```sql\nSELECT COUNT(*) FROM orders\n```",
        ]);

        let result = agent.generate(request(engine)).await.unwrap();
        assert_eq!(result.status, GenerationStatus::Valid);
        assert_eq!(result.sql, "SELECT COUNT(*) FROM orders");
        assert_eq!(result.intermediate_steps.len(), 1);
        assert_eq!(result.intermediate_steps[0].tool_name, "SqlDbQuery");
    }

    #[tokio::test]
    async fn date_lookup_is_traced_before_execution() {
        let engine = Arc::new(FakeEngine::ok());
        let agent = agent(vec![
            "Thought: the question mentions last month\nAction: SystemTime\nAction Input: \"\"",
            "Thought: now run it\nAction: SqlDbQuery\nAction Input: SELECT COUNT(*) FROM orders WHERE created > '2026-07-01'",
            "Thought: I now know the final answer\nFinal Answer: ```sql\nSELECT COUNT(*) FROM orders WHERE created > '2026-07-01'\n```",
        ]);

        let result = agent.generate(request(engine)).await.unwrap();
        let tools: Vec<&str> = result
            .intermediate_steps
            .iter()
            .map(|step| step.tool_name.as_str())
            .collect();
        let time_at = tools.iter().position(|t| *t == "SystemTime").unwrap();
        let sql_at = tools.iter().position(|t| *t == "SqlDbQuery").unwrap();
        assert!(time_at < sql_at);
    }

    #[tokio::test]
    async fn single_iteration_with_unparsable_output_fails_cleanly() {
        let engine = Arc::new(FakeEngine::ok());
        let model = Arc::new(ScriptedModel::new(vec![
            "The answer is probably in the orders table.".to_string(),
        ]));
        let mut config = AgentConfig::for_tests();
        config.budget.max_iterations = 1;
        let agent = SqlAgent::with_model(config, model).unwrap();

        let result = agent.generate(request(engine)).await.unwrap();
        assert_eq!(result.status, GenerationStatus::Invalid);
        assert!(result.error.is_some());
        assert_eq!(result.intermediate_steps.len(), 1);
        assert_eq!(result.intermediate_steps[0].tool_name, PARSER_STEP);
        assert!(result.intermediate_steps[0]
            .output
            .contains("Parsing error"));
    }

    #[tokio::test]
    async fn exhausted_budget_recovers_last_executed_sql() {
        let engine = Arc::new(FakeEngine::ok());
        let mut config = AgentConfig::for_tests();
        config.budget.max_iterations = 2;
        let model = Arc::new(ScriptedModel::new(vec![
            "Thought: run it\nAction: SqlDbQuery\nAction Input: SELECT 1".to_string(),
            "Thought: run another\nAction: SqlDbQuery\nAction Input: SELECT 2".to_string(),
        ]));
        let agent = SqlAgent::with_model(config, model).unwrap();

        let result = agent.generate(request(engine)).await.unwrap();
        // best-effort extraction from the trace, newest first
        assert_eq!(result.sql, "SELECT 2");
    }

    #[tokio::test]
    async fn timed_out_query_never_outlives_the_budgets() {
        let engine = Arc::new(FakeEngine::slow(std::time::Duration::from_secs(60)));
        let model = Arc::new(ScriptedModel::new(vec![
            "Thought: run it\nAction: SqlDbQuery\nAction Input: SELECT * FROM orders".to_string(),
        ]));
        let mut config = AgentConfig::for_tests();
        config.budget.max_iterations = 1;
        config.budget.max_execution_time_seconds = 2;
        config.budget.tool_timeout_seconds = 0;
        let agent = SqlAgent::with_model(config, model).unwrap();

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            agent.generate(request(engine)),
        )
        .await
        .expect("generation must finish within its budgets")
        .unwrap();
        assert_eq!(result.status, GenerationStatus::Invalid);
        assert!(result.sql.is_empty());
        assert!(result.intermediate_steps[0]
            .output
            .contains("execution time exceeded"));
    }

    #[tokio::test]
    async fn unknown_tool_becomes_a_corrective_observation() {
        let engine = Arc::new(FakeEngine::ok());
        let agent = agent(vec![
            "Thought: hmm\nAction: NoSuchTool\nAction Input: anything",
            "Thought: I now know the final answer\nFinal Answer: ```sql\nSELECT 1\n```",
        ]);

        let result = agent.generate(request(engine)).await.unwrap();
        assert!(result.intermediate_steps[0]
            .output
            .contains("not a valid tool"));
    }

    #[tokio::test]
    async fn security_violation_is_fatal() {
        let engine = Arc::new(FakeEngine::unsafe_rejecting());
        let agent = agent(vec![
            "Thought: clean up\nAction: SqlDbQuery\nAction Input: DROP TABLE orders",
        ]);

        let err = agent.generate(request(engine)).await.unwrap_err();
        assert!(matches!(err, AgentError::SecurityViolation(_)));
    }

    #[tokio::test]
    async fn empty_catalog_is_rejected_up_front() {
        let agent = agent(vec![]);
        let mut req = request(Arc::new(FakeEngine::ok()));
        req.catalog = SchemaCatalog::default();
        assert!(matches!(
            agent.generate(req).await.unwrap_err(),
            AgentError::EmptyCatalog
        ));
    }

    #[tokio::test]
    async fn model_failure_yields_invalid_result_not_error() {
        let engine = Arc::new(FakeEngine::ok());
        let model = Arc::new(ScriptedModel::failing("api unavailable"));
        let agent = SqlAgent::with_model(AgentConfig::for_tests(), model).unwrap();

        let result = agent.generate(request(engine)).await.unwrap();
        assert_eq!(result.status, GenerationStatus::Invalid);
        assert!(result.error.as_deref().unwrap_or("").contains("api unavailable"));
    }
}
