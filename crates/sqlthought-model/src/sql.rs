//! SQL candidate produced by synthesis or correction

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

const FENCE: &str = "```";

/// One version of the query, markdown fencing already stripped
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SqlCandidate(String);

impl SqlCandidate {
    /// Build a candidate from raw model output, removing any code fence
    pub fn from_model_output(raw: &str) -> Self {
        Self(strip_fences(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Short SHA-256 of the SQL text, used to track candidates in logs
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        digest[..12].to_string()
    }
}

impl fmt::Display for SqlCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SqlCandidate {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Info strings models put after the opening fence
const LANGUAGE_TAGS: &[&str] = &[
    "sql", "googlesql", "bigquery", "bq", "standardsql", "postgresql", "postgres", "mysql", "sqlite",
    "duckdb", "json", "text",
];

/// Strip a leading/trailing markdown code fence such as "```sql" ... "```".
///
/// Text before the first fence is discarded, as is anything after the closing one.
/// A language tag right after the opening fence is dropped, whether it sits on its
/// own line or before the query; any other first word is part of the query.
/// Unfenced input is only trimmed.
pub fn strip_fences(raw: &str) -> String {
    let text = raw.trim();
    let Some(open) = text.find(FENCE) else {
        return text.to_string();
    };

    let mut body = &text[open + FENCE.len()..];

    let tag_len = body
        .find(|c: char| c.is_whitespace() || c == '`')
        .unwrap_or(body.len());
    if LANGUAGE_TAGS.contains(&body[..tag_len].to_ascii_lowercase().as_str()) {
        body = &body[tag_len..];
    }

    if let Some(close) = body.find(FENCE) {
        body = &body[..close];
    }

    body.trim().to_string()
}
