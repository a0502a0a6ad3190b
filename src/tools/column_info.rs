//! `DbRelevantColumnsInfo`: descriptions, categories, and sample values for
//! requested columns.

use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::catalog::SchemaCatalog;
use crate::tools::{Tool, ToolError};

pub struct ColumnInfoTool {
    catalog: Arc<SchemaCatalog>,
}

impl ColumnInfoTool {
    pub fn new(catalog: Arc<SchemaCatalog>) -> Self {
        Self { catalog }
    }
}

/// Parse `table -> column` pairs out of a comma-separated list.
fn parse_pairs(input: &str) -> Result<Vec<(String, String)>, ToolError> {
    let mut pairs = Vec::new();
    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let Some((table, column)) = part.split_once("->") else {
            return Err(ToolError::InvalidInput(format!(
                "Malformed pair `{part}`; expected format: table_name -> column_name"
            )));
        };
        pairs.push((table.trim().to_string(), column.trim().to_string()));
    }
    if pairs.is_empty() {
        return Err(ToolError::InvalidInput(
            "Input must be a comma-separated list of table_name -> column_name pairs".to_string(),
        ));
    }
    Ok(pairs)
}

#[async_trait]
impl Tool for ColumnInfoTool {
    fn name(&self) -> &'static str {
        "DbRelevantColumnsInfo"
    }

    fn description(&self) -> &'static str {
        "Input: a comma-separated list of potentially relevant columns with their corresponding table in the format table_name -> column_name. \
         Output: more information about the columns, including how they are represented inside the database. \
         Example Input: table1 -> column1, table1 -> column2, table2 -> column1"
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        let pairs = parse_pairs(input)?;

        let mut out = String::new();
        for (table_name, column_name) in &pairs {
            writeln!(out, "Table: {table_name}, column: {column_name}").ok();
            let Some(table) = self.catalog.find_table(table_name) else {
                writeln!(out, "  table not found in the database\n").ok();
                continue;
            };
            let Some(column) = table.find_column(column_name) else {
                writeln!(out, "  column not found in table {}\n", table.name).ok();
                continue;
            };
            if let Some(description) = &column.description {
                writeln!(out, "  description: {description}").ok();
            }
            if column.low_cardinality && !column.categories.is_empty() {
                writeln!(out, "  categories: {}", column.categories.join(", ")).ok();
            }
            let samples: Vec<&str> = table
                .examples
                .iter()
                .filter_map(|row| row.get(column_name).map(String::as_str))
                .collect();
            if !samples.is_empty() {
                writeln!(out, "  sample values: {}", samples.join(", ")).ok();
            }
            out.push('\n');
        }
        Ok(out.trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDescription, SchemaCatalog};
    use crate::test_support::table_named;
    use std::collections::BTreeMap;

    fn catalog() -> SchemaCatalog {
        let mut orders = table_named("orders");
        orders.columns = vec![
            ColumnDescription {
                name: "status".to_string(),
                description: Some("Fulfilment state of the order".to_string()),
                low_cardinality: true,
                categories: vec!["open".to_string(), "shipped".to_string()],
            },
            ColumnDescription {
                name: "total".to_string(),
                description: None,
                low_cardinality: false,
                categories: vec![],
            },
        ];
        let mut row = BTreeMap::new();
        row.insert("status".to_string(), "open".to_string());
        row.insert("total".to_string(), "19.90".to_string());
        orders.examples.push(row);
        SchemaCatalog::new(vec![orders])
    }

    #[tokio::test]
    async fn reports_description_categories_and_samples() {
        let tool = ColumnInfoTool::new(Arc::new(catalog()));
        let out = tool
            .invoke("orders -> status, orders -> total")
            .await
            .unwrap();
        assert!(out.contains("description: Fulfilment state of the order"));
        assert!(out.contains("categories: open, shipped"));
        assert!(out.contains("sample values: open"));
        assert!(out.contains("sample values: 19.90"));
    }

    #[tokio::test]
    async fn unknown_table_and_column_are_observations_not_errors() {
        let tool = ColumnInfoTool::new(Arc::new(catalog()));
        let out = tool
            .invoke("ghosts -> name, orders -> missing")
            .await
            .unwrap();
        assert!(out.contains("table not found in the database"));
        assert!(out.contains("column not found in table orders"));
    }

    #[tokio::test]
    async fn malformed_pair_is_invalid_input() {
        let tool = ColumnInfoTool::new(Arc::new(catalog()));
        let err = tool.invoke("orders.status").await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
        assert!(err.to_string().contains("table_name -> column_name"));
    }
}
