//! Table metadata descriptors and the indexing input format.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};

/// Structured metadata for one relational table.
///
/// Descriptors are immutable once indexed; re-indexing replaces them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Schema the table lives in.
    #[serde(default)]
    pub schema_name: String,

    /// Table name.
    pub table_name: String,

    /// Free-text description.
    #[serde(default, alias = "table_description")]
    pub description: String,

    /// Primary key columns, in key order.
    #[serde(default)]
    pub primary_key: Vec<String>,

    /// Outgoing foreign keys.
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,

    /// Column summaries.
    #[serde(default, alias = "columns_summary")]
    pub columns: Vec<ColumnSummary>,

    /// Indexes defined on the table.
    #[serde(default)]
    pub indexes: Vec<IndexSummary>,
}

impl TableDescriptor {
    /// Create a descriptor with only identity and description set.
    pub fn new(
        schema_name: impl Into<String>,
        table_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            schema_name: schema_name.into(),
            table_name: table_name.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    /// Add a column.
    pub fn with_column(mut self, column: ColumnSummary) -> Self {
        self.columns.push(column);
        self
    }

    /// Set the primary key.
    pub fn with_primary_key(mut self, columns: Vec<String>) -> Self {
        self.primary_key = columns;
        self
    }

    /// Add a foreign key.
    pub fn with_foreign_key(mut self, foreign_key: ForeignKey) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    /// `schema.table`, or just the table when no schema is set.
    pub fn qualified_name(&self) -> String {
        if self.schema_name.is_empty() {
            self.table_name.clone()
        } else {
            format!("{}.{}", self.schema_name, self.table_name)
        }
    }

    /// Text embedded into both vector spaces at indexing time.
    pub fn index_text(&self) -> String {
        let mut text = format!(
            "{} {} {}",
            self.schema_name, self.table_name, self.description
        );

        for column in &self.columns {
            text.push_str(&format!(
                " {} {} {}",
                column.column_name, column.data_type, column.description
            ));
        }

        for index in &self.indexes {
            if !index.index_name.is_empty() {
                text.push_str(&format!(" index {} {}", index.index_name, index.index_type));
            }
            if !index.columns.is_empty() {
                text.push(' ');
                text.push_str(&index.columns.join(" "));
            }
        }

        text
    }
}

/// Summary of one column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub column_name: String,

    #[serde(default)]
    pub data_type: String,

    #[serde(default)]
    pub description: String,

    /// Example values, if the metadata source collected them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample_values: Vec<serde_json::Value>,

    /// Distinct values for low-cardinality columns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unique_values: Vec<serde_json::Value>,
}

impl ColumnSummary {
    pub fn new(
        column_name: impl Into<String>,
        data_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            column_name: column_name.into(),
            data_type: data_type.into(),
            description: description.into(),
            ..Self::default()
        }
    }
}

/// A foreign key from one column to a column of another table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,

    #[serde(default)]
    pub references: ForeignKeyTarget,
}

impl ForeignKey {
    pub fn new(
        column: impl Into<String>,
        table: impl Into<String>,
        referenced_column: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            references: ForeignKeyTarget {
                table: table.into(),
                column: referenced_column.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyTarget {
    #[serde(default)]
    pub table: String,

    #[serde(default)]
    pub column: String,
}

/// An index defined on a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSummary {
    #[serde(default)]
    pub index_name: String,

    #[serde(default)]
    pub columns: Vec<String>,

    #[serde(default)]
    pub index_type: String,
}

/// Tables of one schema in the indexing input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaEntry {
    #[serde(default)]
    pub tables: Vec<TableDescriptor>,
}

/// Indexing input: `{"schemas": {"<schema>": {"tables": [...]}}}`.
///
/// Schemas keep the order they have in the source document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticsDocument {
    pub schemas: IndexMap<String, SchemaEntry>,
}

impl SemanticsDocument {
    /// Parse a document, requiring the top-level `schemas` key.
    pub fn from_json(json: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct Raw {
            schemas: Option<IndexMap<String, SchemaEntry>>,
        }

        let raw: Raw = serde_json::from_str(json)?;
        let schemas = raw.schemas.ok_or_else(|| {
            RetrievalError::InvalidInput(
                "document must contain a 'schemas' key with schema definitions".to_string(),
            )
        })?;
        Ok(Self { schemas })
    }

    /// All table descriptors with `schema_name` filled from their schema key.
    pub fn descriptors(&self) -> Vec<TableDescriptor> {
        self.schemas
            .iter()
            .flat_map(|(schema_name, entry)| {
                entry.tables.iter().map(move |table| TableDescriptor {
                    schema_name: schema_name.clone(),
                    ..table.clone()
                })
            })
            .collect()
    }

    pub fn schema_count(&self) -> usize {
        self.schemas.len()
    }

    pub fn table_count(&self) -> usize {
        self.schemas.values().map(|s| s.tables.len()).sum()
    }

    pub fn index_count(&self) -> usize {
        self.schemas
            .values()
            .flat_map(|s| &s.tables)
            .map(|t| t.indexes.len())
            .sum()
    }
}
