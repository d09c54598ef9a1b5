//! Static schema catalog
//!
//! The database description is a JSON document supplied once at startup:
//! tables keyed by fully-qualified name, each column with its declared type,
//! repetition mode, description and nested RECORD fields.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::ColumnMode;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read schema description: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse schema description: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Schema description contains no tables")]
    Empty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescription {
    pub name: String,

    #[serde(rename = "type")]
    pub data_type: String,

    #[serde(default)]
    pub mode: ColumnMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Nested fields of a RECORD column
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<ColumnDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescription {
    pub table_name: String,
    pub table_columns: Vec<ColumnDescription>,
}

impl TableDescription {
    /// Table name without backtick quoting
    pub fn name(&self) -> &str {
        self.table_name.trim().trim_matches('`')
    }

    /// Column path -> declared type, nested fields flattened to dotted paths.
    /// REPEATED columns are reported as ARRAY<type>.
    pub fn column_types(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for column in &self.table_columns {
            flatten_column(column, "", &mut out);
        }
        out
    }
}

fn flatten_column(column: &ColumnDescription, prefix: &str, out: &mut BTreeMap<String, String>) {
    let path = if prefix.is_empty() {
        column.name.clone()
    } else {
        format!("{}.{}", prefix, column.name)
    };

    let declared = match column.mode {
        ColumnMode::Repeated => format!("ARRAY<{}>", column.data_type),
        _ => column.data_type.clone(),
    };
    out.insert(path.clone(), declared);

    for field in &column.fields {
        flatten_column(field, &path, out);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub tables: Vec<TableDescription>,

    /// Target SQL dialect (e.g. "bigquery")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<String>,
}

impl SchemaDescription {
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let schema: SchemaDescription = serde_json::from_str(json)?;
        if schema.tables.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(schema)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn dialect(&self) -> &str {
        self.dialect.as_deref().unwrap_or("bigquery")
    }

    /// Look up a table by full name or by any dotted suffix of it.
    ///
    /// `github_repos.commits` and `commits` both resolve
    /// `bigquery-public-data.github_repos.commits`.
    pub fn table(&self, name: &str) -> Result<&TableDescription, CatalogError> {
        let wanted = name.trim().trim_matches('`');

        self.tables
            .iter()
            .find(|t| t.name() == wanted)
            .or_else(|| {
                let suffix = format!(".{}", wanted);
                self.tables.iter().find(|t| t.name().ends_with(&suffix))
            })
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))
    }

    /// Format catalog as markdown for MCP resources and logs
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str("# Database Catalog\n\n");
        md.push_str(&format!("**Dialect:** `{}`\n\n", self.dialect()));
        md.push_str(&format!("**Tables:** {}\n\n", self.tables.len()));

        for table in &self.tables {
            md.push_str(&format!("## Table: `{}`\n\n", table.name()));
            md.push_str("| Column | Type | Mode | Description |\n");
            md.push_str("|--------|------|------|-------------|\n");

            for column in &table.table_columns {
                push_column_rows(&mut md, column, "");
            }

            md.push('\n');
        }

        md
    }
}

fn push_column_rows(md: &mut String, column: &ColumnDescription, prefix: &str) {
    let path = if prefix.is_empty() {
        column.name.clone()
    } else {
        format!("{}.{}", prefix, column.name)
    };

    md.push_str(&format!(
        "| `{}` | {} | {} | {} |\n",
        path,
        column.data_type,
        column.mode,
        column.description.as_deref().unwrap_or("")
    ));

    for field in &column.fields {
        push_column_rows(md, field, &path);
    }
}
