//! Table relevance scoring
//!
//! Ranks catalog tables against the question with a deterministic model
//! classification call, and folds in tables referenced by the SQL of
//! matching fewshot examples.

use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use crate::catalog::SchemaCatalog;
use crate::error::AgentResult;
use crate::llm::ChatModel;
use crate::prompts::RELEVANCE_SYSTEM_PROMPT;
use crate::types::{FewshotExample, TokenUsage};

/// Lowest score the classifier may return; anything below is dropped.
pub const MIN_RELEVANCE_SCORE: f64 = 0.3;
/// Highest admissible score; anything above is dropped, not clamped.
pub const MAX_RELEVANCE_SCORE: f64 = 1.0;

/// One scored candidate table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableScore {
    pub table: String,
    pub score: f64,
}

/// Result of one scoring pass. `forced` tables come from fewshot SQL and
/// carry no score; they never duplicate entries in `scored`.
#[derive(Debug, Clone, Default)]
pub struct RelevanceOutcome {
    pub scored: Vec<TableScore>,
    pub forced: Vec<String>,
    pub usage: TokenUsage,
}

pub struct RelevanceScorer {
    model: Arc<dyn ChatModel>,
}

impl RelevanceScorer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Score every catalog table against the question.
    pub async fn score(
        &self,
        question: &str,
        catalog: &SchemaCatalog,
        fewshots: &[FewshotExample],
    ) -> AgentResult<RelevanceOutcome> {
        let forced = fewshot_tables(catalog, fewshots);

        let user_prompt = format!(
            "Question: {question}\n\nAvailable Tables:\n{}",
            render_catalog(catalog)
        );
        // Zero temperature: classification must be deterministic.
        let completion = self
            .model
            .complete(RELEVANCE_SYSTEM_PROMPT, &user_prompt, 0.0)
            .await?;

        let mut scored = parse_scores(&completion.text, catalog);
        scored.retain(|entry| !forced.contains(&entry.table));
        debug!(
            "relevance scoring kept {} tables, {} forced via fewshot SQL",
            scored.len(),
            forced.len()
        );

        Ok(RelevanceOutcome {
            scored,
            forced,
            usage: completion.usage,
        })
    }
}

/// Compact catalog rendering fed to the classifier.
fn render_catalog(catalog: &SchemaCatalog) -> String {
    catalog
        .tables()
        .iter()
        .map(|table| {
            let columns = table
                .columns
                .iter()
                .map(|column| column.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let description = table
                .description
                .as_deref()
                .unwrap_or("No description available");
            format!(
                "Table: {}\nColumns: [{columns}]\nDescription: {description}",
                table.name
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn score_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Table:\s*`?([A-Za-z0-9_.]+)`?\s*,\s*relevance score:\s*([0-9]*\.?[0-9]+)")
            .expect("valid regex")
    })
}

/// Parse `Table: \`name\`, relevance score: 0.9` lines. Scores outside the
/// admissible band are dropped entirely; tables absent from the catalog are
/// ignored. Equal scores tie-break on catalog order.
fn parse_scores(text: &str, catalog: &SchemaCatalog) -> Vec<TableScore> {
    let mut scored: Vec<(usize, TableScore)> = Vec::new();
    for capture in score_line_regex().captures_iter(text) {
        let name = capture[1].to_string();
        let Ok(score) = capture[2].parse::<f64>() else {
            continue;
        };
        if !(MIN_RELEVANCE_SCORE..=MAX_RELEVANCE_SCORE).contains(&score) {
            continue;
        }
        let Some(found) = catalog.find_table(&name) else {
            continue;
        };
        let position = catalog
            .tables()
            .iter()
            .position(|table| table.name == found.name)
            .unwrap_or(usize::MAX);
        if !scored.iter().any(|(_, entry)| entry.table == name) {
            scored.push((position, TableScore { table: name, score }));
        }
    }
    scored.sort_by(|a, b| {
        b.1.score
            .partial_cmp(&a.1.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scored.into_iter().map(|(_, entry)| entry).collect()
}

fn table_reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\b(?:from|join)\s+[`"\[]?([A-Za-z_][A-Za-z0-9_.]*)"#)
            .expect("valid regex")
    })
}

/// Extract referenced table names from a SQL statement. A statement that
/// yields nothing is treated as unparsable.
pub(crate) fn tables_from_sql(sql: &str) -> Vec<String> {
    let mut tables = Vec::new();
    for capture in table_reference_regex().captures_iter(sql) {
        let name = capture[1].to_string();
        if !tables.contains(&name) {
            tables.push(name);
        }
    }
    tables
}

/// Tables referenced by fewshot SQL that exist in the catalog. Added
/// unconditionally, bypassing the score filter. Unparsable SQL is logged
/// and skipped, never fatal.
fn fewshot_tables(catalog: &SchemaCatalog, fewshots: &[FewshotExample]) -> Vec<String> {
    let mut forced = Vec::new();
    for example in fewshots {
        let tables = tables_from_sql(&example.sql);
        if tables.is_empty() {
            warn!("could not extract tables from fewshot SQL, skipping example");
            continue;
        }
        for name in tables {
            if let Some(table) = catalog.find_table(&name) {
                if !forced.contains(&table.name) {
                    forced.push(table.name.clone());
                }
            }
        }
    }
    forced
}
