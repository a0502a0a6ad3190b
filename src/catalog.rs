//! Schema catalog snapshot
//!
//! The catalog is the frozen, per-generation view of scanned tables and
//! columns produced by the external scanning subsystem. It is the agent's
//! ground truth: tools answer schema questions from the snapshot, never from
//! live introspection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::normalize_identifier;

/// Scan state of one table in the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScanStatus {
    Scanned,
    NotScanned,
    Failed,
}

/// Column metadata captured by the scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescription {
    pub name: String,
    pub description: Option<String>,
    /// Distinct values are few enough to enumerate as categories.
    pub low_cardinality: bool,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// One scanned table: DDL, column metadata, and a handful of sample rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescription {
    pub name: String,
    pub schema: Option<String>,
    pub description: Option<String>,
    /// CREATE TABLE text emitted inside fenced schema blocks.
    pub ddl: String,
    pub columns: Vec<ColumnDescription>,
    /// Sample rows keyed by column name.
    #[serde(default)]
    pub examples: Vec<BTreeMap<String, String>>,
    pub status: ScanStatus,
}

impl TableDescription {
    /// `schema.table` when a schema name is present, bare table name otherwise.
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }

    pub fn find_column(&self, name: &str) -> Option<&ColumnDescription> {
        self.columns.iter().find(|column| column.name == name)
    }
}

/// Immutable per-generation snapshot of scanned tables.
///
/// Owned exclusively by one generation request; concurrent requests each
/// hold their own snapshot, so no locking is involved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaCatalog {
    tables: Vec<TableDescription>,
}

impl SchemaCatalog {
    pub fn new(tables: Vec<TableDescription>) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &[TableDescription] {
        &self.tables
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Restrict the snapshot to `SCANNED` tables within the requested
    /// schemas. An empty schema list keeps every scanned table.
    pub fn filtered(&self, schemas: &[String]) -> SchemaCatalog {
        let tables = self
            .tables
            .iter()
            .filter(|table| table.status == ScanStatus::Scanned)
            .filter(|table| {
                schemas.is_empty()
                    || table
                        .schema
                        .as_deref()
                        .is_some_and(|schema| schemas.iter().any(|wanted| wanted == schema))
            })
            .cloned()
            .collect();
        SchemaCatalog { tables }
    }

    /// Look up a table by name. The input may be schema-qualified and may
    /// carry escaped underscores; the schema prefix is stripped for lookup.
    pub fn find_table(&self, raw: &str) -> Option<&TableDescription> {
        let normalized = normalize_identifier(raw);
        let bare = match normalized.rsplit_once('.') {
            Some((_, table)) => table,
            None => normalized.as_str(),
        };
        self.tables.iter().find(|table| table.name == bare)
    }

    /// Whether the snapshot spans more than one schema. When it does, tools
    /// that take table names require schema qualification.
    pub fn spans_multiple_schemas(&self) -> bool {
        let mut first: Option<&str> = None;
        for table in &self.tables {
            let schema = table.schema.as_deref().unwrap_or("");
            match first {
                None => first = Some(schema),
                Some(seen) if seen != schema => return true,
                Some(_) => {}
            }
        }
        false
    }
}
