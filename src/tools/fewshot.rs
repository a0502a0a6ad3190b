//! `FewshotExamplesRetriever` and `GetAdminInstructions`: static context
//! handed to the model on request.

use async_trait::async_trait;
use std::fmt::Write as _;

use crate::tools::{Tool, ToolError};
use crate::types::{dedup_examples, FewshotExample, Instruction};

/// Serves previously validated question/SQL pairs, deduplicated by question
/// text, up to the requested count.
pub struct FewshotRetrieverTool {
    examples: Vec<FewshotExample>,
}

impl FewshotRetrieverTool {
    pub fn new(examples: Vec<FewshotExample>) -> Self {
        Self {
            examples: dedup_examples(&examples),
        }
    }
}

#[async_trait]
impl Tool for FewshotRetrieverTool {
    fn name(&self) -> &'static str {
        "FewshotExamplesRetriever"
    }

    fn description(&self) -> &'static str {
        "Input: the number of Question/SQL pairs to retrieve. \
         Output: samples of Question/SQL pairs similar to the given question. \
         Use this tool to fetch previously asked Question/SQL pairs as examples for improving the SQL query generation. \
         Example Input: 5"
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        let requested: usize = input.trim().parse().map_err(|_| {
            ToolError::InvalidInput(format!(
                "Input must be an integer number of examples, got `{}`",
                input.trim()
            ))
        })?;
        if requested == 0 {
            return Err(ToolError::InvalidInput(
                "Input must be a positive number of examples".to_string(),
            ));
        }

        if self.examples.is_empty() {
            return Ok("There are no Question/SQL pairs available".to_string());
        }

        let mut out = String::new();
        for example in self.examples.iter().take(requested) {
            writeln!(out, "Question: {}", example.question).ok();
            writeln!(out, "```sql\n{}\n```\n", example.sql).ok();
        }
        Ok(out.trim_end().to_string())
    }
}

/// Serves the administrator rules as a numbered list. Order is preserved.
pub struct AdminInstructionsTool {
    instructions: Vec<Instruction>,
}

impl AdminInstructionsTool {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }
}

#[async_trait]
impl Tool for AdminInstructionsTool {
    fn name(&self) -> &'static str {
        "GetAdminInstructions"
    }

    fn description(&self) -> &'static str {
        "Input: is an empty string. \
         Output: the admin instructions before generating the SQL query. \
         The admin instructions must be respected by the SQL query."
    }

    async fn invoke(&self, _input: &str) -> Result<String, ToolError> {
        let mut out = String::new();
        for (idx, instruction) in self.instructions.iter().enumerate() {
            writeln!(out, "{}) {}", idx + 1, instruction.text).ok();
        }
        Ok(out.trim_end().to_string())
    }
}
