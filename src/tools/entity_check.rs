//! `DbColumnEntityChecker`: fuzzy match of a question entity against the
//! distinct values of a column.
//!
//! Two lookups run per call: a case-insensitive substring match against the
//! column, and a full distinct-value scan ranked by a subsequence similarity
//! ratio. Ranked fuzzy matches come first in the output, then any substring
//! hits not already included. A database error degrades the affected lookup
//! to an empty result instead of failing the tool.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::catalog::SchemaCatalog;
use crate::engine::SqlEngine;
use crate::tools::{Tool, ToolError};

/// Minimum similarity for a fuzzy candidate to be reported.
const SIMILARITY_THRESHOLD: f64 = 0.4;
/// Upper bound on reported matches across both lookups. The cap applies to
/// the output only; the fuzzy pass ranks the entire distinct-value set.
const MAX_MATCHES: usize = 25;

pub struct EntityCheckerTool {
    catalog: Arc<SchemaCatalog>,
    engine: Arc<dyn SqlEngine>,
}

impl EntityCheckerTool {
    pub fn new(catalog: Arc<SchemaCatalog>, engine: Arc<dyn SqlEngine>) -> Self {
        Self { catalog, engine }
    }

    /// Low-cardinality columns are answered from the catalog snapshot;
    /// anything else is read live. Errors yield an empty candidate set.
    async fn candidate_values(&self, table: &str, column: &str) -> Vec<String> {
        if let Some(described) = self.catalog.find_table(table) {
            if let Some(described_column) = described.find_column(column) {
                if described_column.low_cardinality && !described_column.categories.is_empty() {
                    return described_column.categories.clone();
                }
            }
        }
        let sql = format!("SELECT DISTINCT {column} FROM {table}");
        match self.engine.run_sql(&sql, usize::MAX).await {
            Ok(result) => first_column(result.rows),
            Err(e) => {
                warn!("distinct-value scan for {table}.{column} failed: {e}");
                Vec::new()
            }
        }
    }

    /// Substring lookup against the live column. Skipped for columns already
    /// answered from catalog categories; the distinct scan covers those.
    async fn substring_values(&self, table: &str, column: &str, entity: &str) -> Vec<String> {
        if let Some(described) = self.catalog.find_table(table) {
            if let Some(described_column) = described.find_column(column) {
                if described_column.low_cardinality && !described_column.categories.is_empty() {
                    let needle = entity.to_lowercase();
                    return described_column
                        .categories
                        .iter()
                        .filter(|value| value.to_lowercase().contains(&needle))
                        .take(MAX_MATCHES)
                        .cloned()
                        .collect();
                }
            }
        }
        let needle = entity.to_lowercase().replace('\'', "''");
        let sql = format!(
            "SELECT DISTINCT {column} FROM {table} WHERE LOWER({column}) LIKE '%{needle}%'"
        );
        match self.engine.run_sql(&sql, MAX_MATCHES).await {
            Ok(result) => first_column(result.rows),
            Err(e) => {
                warn!("substring lookup for {table}.{column} failed: {e}");
                Vec::new()
            }
        }
    }
}

fn first_column(rows: Vec<Vec<String>>) -> Vec<String> {
    rows.into_iter()
        .filter_map(|mut row| (!row.is_empty()).then(|| row.remove(0)))
        .collect()
}

#[async_trait]
impl Tool for EntityCheckerTool {
    fn name(&self) -> &'static str {
        "DbColumnEntityChecker"
    }

    fn description(&self) -> &'static str {
        "Input: Column name and its corresponding table, and an entity in the question, in the format table_name -> column_name, entity. \
         Output: the best-matching values of the column for the given entity. \
         Use this tool to check whether an entity value from the question exists in the relevant string column. \
         Example Input: table1 -> column2, entity"
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        let (pair, entity) = input.split_once(',').ok_or_else(|| {
            ToolError::InvalidInput(
                "Expected format: table_name -> column_name, entity".to_string(),
            )
        })?;
        let (table, column) = pair.split_once("->").ok_or_else(|| {
            ToolError::InvalidInput(
                "Expected format: table_name -> column_name, entity".to_string(),
            )
        })?;
        let table = table.trim();
        let column = column.trim();
        let entity = entity.trim();
        if table.is_empty() || column.is_empty() || entity.is_empty() {
            return Err(ToolError::InvalidInput(
                "Table, column, and entity must all be non-empty".to_string(),
            ));
        }
        if self.catalog.spans_multiple_schemas() && !table.contains('.') {
            return Err(ToolError::InvalidInput(
                "The database spans multiple schemas; qualify the table as schema.table"
                    .to_string(),
            ));
        }

        let candidates = self.candidate_values(table, column).await;
        let substring_hits = self.substring_values(table, column, entity).await;
        let ranked = rank_matches(entity, &candidates);
        debug!(
            "entity check for `{entity}` against {table}.{column}: {} ranked, {} substring hits",
            ranked.len(),
            substring_hits.len()
        );

        // Ranked fuzzy matches first, then substring hits not already seen.
        let mut merged: Vec<String> = ranked
            .iter()
            .map(|(value, score)| format!("{value} (similarity {score:.2})"))
            .collect();
        for value in substring_hits {
            if merged.len() >= MAX_MATCHES {
                break;
            }
            if !ranked.iter().any(|(seen, _)| *seen == value) {
                merged.push(value);
            }
        }

        if merged.is_empty() {
            return Ok(format!(
                "No value in {table}.{column} is similar to `{entity}`"
            ));
        }
        Ok(format!(
            "Values in {table}.{column} similar to `{entity}`:\n{}",
            merged.join("\n")
        ))
    }
}

/// Rank candidate values by similarity to the entity, best first, dropping
/// anything below the threshold and capping the list.
fn rank_matches(entity: &str, values: &[String]) -> Vec<(String, f64)> {
    let mut matches: Vec<(String, f64)> = values
        .iter()
        .map(|value| (value.clone(), similarity(entity, value)))
        .filter(|(_, score)| *score >= SIMILARITY_THRESHOLD)
        .collect();
    matches.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    matches.dedup_by(|a, b| a.0 == b.0);
    matches.truncate(MAX_MATCHES);
    matches
}

/// Case-insensitive similarity ratio: `2 * lcs / (len_a + len_b)` over the
/// longest common subsequence of characters. 1.0 means an exact match.
fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let lcs = longest_common_subsequence(&a, &b);
    (2.0 * lcs as f64) / ((a.len() + b.len()) as f64)
}

fn longest_common_subsequence(a: &[char], b: &[char]) -> usize {
    let mut previous = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            current[j + 1] = if ca == cb {
                previous[j] + 1
            } else {
                previous[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}
