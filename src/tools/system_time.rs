//! `SystemTime`: wall-clock date and time for temporal questions.

use async_trait::async_trait;
use chrono::Local;

use crate::tools::{Tool, ToolError};

pub struct SystemTimeTool;

#[async_trait]
impl Tool for SystemTimeTool {
    fn name(&self) -> &'static str {
        "SystemTime"
    }

    fn description(&self) -> &'static str {
        "Input: is an empty string. \
         Output: the current data and time. \
         Always use this tool if the question has any mention of time or dates, \
         do not use functions like CURRENT_DATE in the SQL query."
    }

    async fn invoke(&self, _input: &str) -> Result<String, ToolError> {
        Ok(Local::now().format("%Y-%m-%d %H:%M:%S").to_string())
    }
}
