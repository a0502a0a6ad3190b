//! Static ReAct prompt templates and their composition
//!
//! Templates are read-only; one generation request composes its own
//! `PromptTemplate` from the dialect, the tool roster, and the available
//! context (instructions, fewshot examples). Nothing here is mutated at
//! runtime, so concurrent requests share the statics freely.

use crate::engine::Dialect;

/// Marker the model emits when it commits to an answer.
pub const FINAL_ANSWER_MARKER: &str = "Final Answer:";

/// Corrective instruction injected as an observation when the model's
/// output does not match the action grammar.
pub const ERROR_PARSING_MESSAGE: &str = "\
ERROR: Parsing error, you should only use tools or return the final answer. You are a ReAct agent, you should not return any other format.
Use the following format:

Question: the input question you must answer
Thought: you should always think about what to do
Action: the action to take, one of the tools
Action Input: the input to the action
Observation: the result of the action
... (this Thought/Action/Action Input/Observation can repeat N times)
Thought: I now know the final answer
Final Answer: the final answer to the original input question

If there is a consistent parsing error, please return \"I don't know\" as your final answer.
If you know the final answer and do not need to use any tools, directly return the final answer in this format:
Final Answer: <your final answer>.";

const AGENT_PREFIX: &str = "\
You are an agent designed to interact with a SQL database to find a correct SQL query for the given question.
Given an input question, generate a syntactically correct {dialect} query, execute the query to make sure it is correct, and return the SQL query between ```sql and ``` tags.
You have access to tools for interacting with the database. You can use tools using Action: <tool_name> and Action Input: <tool_input> format.
Only use the below tools. Only use the information returned by the below tools to construct your final answer.
#
Here is the plan you have to follow:
{agent_plan}
#
Using `current_date()` or `current_datetime()` in SQL queries is banned, use the SystemTime tool to get the exact time of the query execution.
If the question does not seem related to the database, return an empty string.
If there is a very similar question among the fewshot examples, directly use the SQL query from the example, modify it to fit the given question, and execute the query to make sure it is correct.";

const PLAN_BASE: &str = "\
1) Use the DbTablesWithRelevanceScores tool to find the relevant tables.
2) Use the DbRelevantTablesSchema tool to obtain the schema of possibly relevant tables and identify the possibly relevant columns.
3) Use the DbRelevantColumnsInfo tool to gather more information about the possibly relevant columns, filtering them down to the relevant ones.
4) [Optional based on the question] Use the SystemTime tool if the question has any mention of time or dates.
5) For string columns, always use the DbColumnEntityChecker tool to make sure the entity values are present in the relevant columns.
6) Write a {dialect} query and always use the SqlDbQuery tool to execute it on the database and check that the results are correct.";

const PLAN_WITH_INSTRUCTIONS: &str = "\
1) Use the GetAdminInstructions tool to retrieve the database admin instructions before calling other tools, so the SQL query follows them.
2) Use the DbTablesWithRelevanceScores tool to find the relevant tables.
3) Use the DbRelevantTablesSchema tool to obtain the schema of possibly relevant tables and identify the possibly relevant columns.
4) Use the DbRelevantColumnsInfo tool to gather more information about the possibly relevant columns, filtering them down to the relevant ones.
5) [Optional based on the question] Use the SystemTime tool if the question has any mention of time or dates.
6) For string columns, always use the DbColumnEntityChecker tool to make sure the entity values are present in the relevant columns.
7) Write a {dialect} query and always use the SqlDbQuery tool to execute it on the database and check that the results are correct.";

const PLAN_WITH_FEWSHOT_EXAMPLES: &str = "\
1) Use the FewshotExamplesRetriever tool to retrieve samples of Question/SQL pairs similar to the given question; if one is very similar, use its SQL query and modify it to fit the given question. You can request at most {max_examples} pairs.
2) Use the DbTablesWithRelevanceScores tool to find the relevant tables.
3) Use the DbRelevantTablesSchema tool to obtain the schema of possibly relevant tables and identify the possibly relevant columns.
4) Use the DbRelevantColumnsInfo tool to gather more information about the possibly relevant columns, filtering them down to the relevant ones.
5) [Optional based on the question] Use the SystemTime tool if the question has any mention of time or dates.
6) For string columns, always use the DbColumnEntityChecker tool to make sure the entity values are present in the relevant columns.
7) Write a {dialect} query and always use the SqlDbQuery tool to execute it on the database and check that the results are correct.";

const PLAN_WITH_FEWSHOT_EXAMPLES_AND_INSTRUCTIONS: &str = "\
1) Use the FewshotExamplesRetriever tool to retrieve samples of Question/SQL pairs similar to the given question; if one is very similar, use its SQL query and modify it to fit the given question. You can request at most {max_examples} pairs.
2) Use the GetAdminInstructions tool to retrieve the database admin instructions before calling other tools, so the SQL query follows them.
3) Use the DbTablesWithRelevanceScores tool to find the relevant tables.
4) Use the DbRelevantTablesSchema tool to obtain the schema of possibly relevant tables and identify the possibly relevant columns.
5) Use the DbRelevantColumnsInfo tool to gather more information about the possibly relevant columns, filtering them down to the relevant ones.
6) [Optional based on the question] Use the SystemTime tool if the question has any mention of time or dates.
7) For string columns, always use the DbColumnEntityChecker tool to make sure the entity values are present in the relevant columns.
8) Write a {dialect} query and always use the SqlDbQuery tool to execute it on the database and check that the results are correct.";

const FORMAT_INSTRUCTIONS: &str = "\
Use the following format:

Question: the input question you must answer
Thought: you should always think about what to do
Action: the action to take, should be one of [{tool_names}]
Action Input: the input to the action
Observation: the result of the action
... (this Thought/Action/Action Input/Observation can repeat N times)
Thought: I now know the final answer
Final Answer: the final answer to the original input question";

const SUFFIX_WITH_FEWSHOT_EXAMPLES: &str = "\
Begin!

Question: {input}
Thought: I should collect examples of Question/SQL pairs to check if there is a similar question among the examples.
{agent_scratchpad}";

const SUFFIX_WITHOUT_FEWSHOT_EXAMPLES: &str = "\
Begin!

Question: {input}
Thought: I should find the relevant tables.
{agent_scratchpad}";

/// System prompt for the table relevance classification call.
pub const RELEVANCE_SYSTEM_PROMPT: &str = "\
You are a SQL expert. Identify which tables are required to answer the question.
Rules:
1. Only return tables with a relevance score between 0.3 and 1.0.
2. If multiple tables are needed (e.g., for JOINs), list each on a new line.
3. Use the exact format: Table: `table_name`, relevance score: 0.9
4. Do not provide any introductory text or markdown code blocks.

Example output:
Table: `sundry_debtors`, relevance score: 0.9
Table: `account_transactions`, relevance score: 0.8";

/// Name/description pair as exposed in the prompt's tool roster.
#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
}

/// Composed ReAct prompt for one generation request. The header goes out
/// as the system prompt; the suffix is rendered per cycle with the
/// question and the accumulated scratchpad.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    header: String,
    suffix: &'static str,
}

impl PromptTemplate {
    pub fn header(&self) -> &str {
        &self.header
    }

    /// Render the per-cycle user message.
    pub fn render(&self, question: &str, scratchpad: &str) -> String {
        self.suffix
            .replace("{input}", question)
            .replace("{agent_scratchpad}", scratchpad)
    }
}

/// Compose the full prompt from dialect, context availability, and the
/// registered tools.
pub fn build_template(
    dialect: Dialect,
    max_examples: usize,
    has_instructions: bool,
    has_fewshots: bool,
    tools: &[ToolSpec],
) -> PromptTemplate {
    let plan = match (has_fewshots, has_instructions) {
        (true, true) => PLAN_WITH_FEWSHOT_EXAMPLES_AND_INSTRUCTIONS,
        (true, false) => PLAN_WITH_FEWSHOT_EXAMPLES,
        (false, true) => PLAN_WITH_INSTRUCTIONS,
        (false, false) => PLAN_BASE,
    };
    let plan = plan
        .replace("{dialect}", dialect.name())
        .replace("{max_examples}", &max_examples.to_string());

    let prefix = AGENT_PREFIX
        .replace("{dialect}", dialect.name())
        .replace("{agent_plan}", &plan);

    let roster = tools
        .iter()
        .map(|tool| format!("{}: {}", tool.name, tool.description))
        .collect::<Vec<_>>()
        .join("\n");
    let names = tools
        .iter()
        .map(|tool| tool.name)
        .collect::<Vec<_>>()
        .join(", ");
    let format_instructions = FORMAT_INSTRUCTIONS.replace("{tool_names}", &names);

    let header = format!("{prefix}\n\n{roster}\n\n{format_instructions}");
    let suffix = if has_fewshots {
        SUFFIX_WITH_FEWSHOT_EXAMPLES
    } else {
        SUFFIX_WITHOUT_FEWSHOT_EXAMPLES
    };

    PromptTemplate { header, suffix }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOOLS: &[ToolSpec] = &[
        ToolSpec {
            name: "SqlDbQuery",
            description: "Execute a SQL query.",
        },
        ToolSpec {
            name: "SystemTime",
            description: "Current date and time.",
        },
    ];

    #[test]
    fn header_lists_tools_and_dialect() {
        let template = build_template(Dialect::PostgreSql, 5, false, false, TOOLS);
        assert!(template.header().contains("PostgreSQL"));
        assert!(template.header().contains("SqlDbQuery: Execute a SQL query."));
        assert!(template.header().contains("one of [SqlDbQuery, SystemTime]"));
        assert!(!template.header().contains("{agent_plan}"));
    }

    #[test]
    fn plan_variant_follows_available_context() {
        let base = build_template(Dialect::MySql, 5, false, false, TOOLS);
        assert!(!base.header().contains("FewshotExamplesRetriever"));
        assert!(!base.header().contains("GetAdminInstructions"));

        let full = build_template(Dialect::MySql, 5, true, true, TOOLS);
        assert!(full.header().contains("FewshotExamplesRetriever"));
        assert!(full.header().contains("GetAdminInstructions"));
        assert!(full.header().contains("at most 5 pairs"));
    }

    #[test]
    fn suffix_renders_question_and_scratchpad() {
        let template = build_template(Dialect::Sqlite, 3, false, true, TOOLS);
        let rendered = template.render("total revenue?", "Thought: done");
        assert!(rendered.contains("Question: total revenue?"));
        assert!(rendered.ends_with("Thought: done"));
        assert!(rendered.contains("collect examples of Question/SQL pairs"));
    }
}
