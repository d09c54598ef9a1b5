//! Vocabulary types shared by the data model

use serde::{Deserialize, Serialize};
use std::fmt;

/// SQL clause category a sub-problem targets
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ClauseKind {
    Where,
    GroupBy,
    Having,
    OrderBy,
    Join,
    Distinct,
    Limit,
    Union,
    Except,

    /// Anything outside the vocabulary, kept verbatim
    Other(String),
}

impl ClauseKind {
    pub fn is_recognized(&self) -> bool {
        !matches!(self, ClauseKind::Other(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            ClauseKind::Where => "WHERE",
            ClauseKind::GroupBy => "GROUP BY",
            ClauseKind::Having => "HAVING",
            ClauseKind::OrderBy => "ORDER BY",
            ClauseKind::Join => "JOIN",
            ClauseKind::Distinct => "DISTINCT",
            ClauseKind::Limit => "LIMIT",
            ClauseKind::Union => "UNION",
            ClauseKind::Except => "EXCEPT",
            ClauseKind::Other(raw) => raw,
        }
    }
}

impl From<String> for ClauseKind {
    fn from(raw: String) -> Self {
        // "group_by", "Group By" and "GROUP  BY" all name the same clause
        let normalized = raw
            .trim()
            .replace('_', " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase();

        match normalized.as_str() {
            "WHERE" => ClauseKind::Where,
            "GROUP BY" => ClauseKind::GroupBy,
            "HAVING" => ClauseKind::Having,
            "ORDER BY" => ClauseKind::OrderBy,
            "JOIN" => ClauseKind::Join,
            "DISTINCT" => ClauseKind::Distinct,
            "LIMIT" => ClauseKind::Limit,
            "UNION" => ClauseKind::Union,
            "EXCEPT" => ClauseKind::Except,
            _ => ClauseKind::Other(raw.trim().to_string()),
        }
    }
}

impl From<ClauseKind> for String {
    fn from(kind: ClauseKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ClauseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column repetition mode in the schema description
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnMode {
    #[default]
    Nullable,
    Required,
    Repeated,
}

impl fmt::Display for ColumnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnMode::Nullable => f.write_str("NULLABLE"),
            ColumnMode::Required => f.write_str("REQUIRED"),
            ColumnMode::Repeated => f.write_str("REPEATED"),
        }
    }
}
