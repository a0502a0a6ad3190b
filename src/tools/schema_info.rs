//! `DbRelevantTablesSchema`: DDL and sample rows for requested tables.

use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::catalog::{SchemaCatalog, TableDescription};
use crate::tools::{Tool, ToolError};

pub struct SchemaInspectorTool {
    catalog: Arc<SchemaCatalog>,
}

impl SchemaInspectorTool {
    pub fn new(catalog: Arc<SchemaCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Tool for SchemaInspectorTool {
    fn name(&self) -> &'static str {
        "DbRelevantTablesSchema"
    }

    fn description(&self) -> &'static str {
        "Input: a comma-separated list of tables. \
         Output: the schema and sample rows for those tables. \
         Use this tool to find the schema of the relevant tables. \
         Example Input: table1, table2, table3"
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        let requested: Vec<&str> = input
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect();
        if requested.is_empty() {
            return Err(ToolError::InvalidInput(
                "Input must be a comma-separated list of table names".to_string(),
            ));
        }

        let require_qualified = self.catalog.spans_multiple_schemas();
        let mut found: Vec<&TableDescription> = Vec::new();
        for name in &requested {
            if require_qualified && !name.contains('.') {
                continue;
            }
            if let Some(table) = self.catalog.find_table(name) {
                if !found.iter().any(|seen| seen.name == table.name) {
                    found.push(table);
                }
            }
        }

        // Unknown names are omitted; only a fully unmatched request gets an
        // explicit message.
        if found.is_empty() {
            if require_qualified {
                return Ok(format!(
                    "The database spans multiple schemas; qualify table names as schema.table. \
                     Not found: {}",
                    requested.join(", ")
                ));
            }
            return Ok(format!(
                "Tables not found in the database: {}",
                requested.join(", ")
            ));
        }

        let mut out = String::new();
        for table in &found {
            writeln!(out, "```sql\n{}\n```", table.ddl.trim()).ok();
            if let Some(rows) = render_examples(table) {
                writeln!(out, "Sample rows for {}:\n{rows}", table.qualified_name()).ok();
            }
            if let Some(description) = &table.description {
                writeln!(out, "Table description: {description}").ok();
            }
            out.push('\n');
        }
        Ok(out.trim_end().to_string())
    }
}

/// Sample rows rendered as `col | col` header plus pipe-joined values.
fn render_examples(table: &TableDescription) -> Option<String> {
    let first = table.examples.first()?;
    let columns: Vec<&str> = first.keys().map(String::as_str).collect();
    let mut out = columns.join(" | ");
    for row in &table.examples {
        out.push('\n');
        let values: Vec<&str> = columns
            .iter()
            .map(|column| row.get(*column).map(String::as_str).unwrap_or("NULL"))
            .collect();
        out.push_str(&values.join(" | "));
    }
    Some(out)
}
