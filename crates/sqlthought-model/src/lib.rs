//! sqlthought data model
//!
//! Structured outputs exchanged between the reasoning stages of the NL→SQL pipeline.
//! Every type is created fresh per question and discarded when the run returns.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod catalog;
mod sql;
mod types;

pub use catalog::*;
pub use sql::*;
pub use types::*;

/// Relevant sub-schema for one question, as produced by schema linking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaLink {
    /// Table qualifier (e.g. `dataset.table`) -> ordered column names
    pub tables: BTreeMap<String, Vec<String>>,

    /// Table -> primary key column
    pub primary_keys: BTreeMap<String, String>,

    /// Column qualifier -> declared type (INT64, STRING, ...)
    pub columns: BTreeMap<String, String>,

    #[serde(default)]
    pub joins: Vec<JoinSpec>,
}

impl SchemaLink {
    /// Check the structural contract downstream stages rely on.
    ///
    /// Returns Err with a description of the first violation found.
    pub fn check(&self) -> Result<(), String> {
        if self.tables.is_empty() {
            return Err("schema link contains no tables".to_string());
        }

        for table in self.tables.keys() {
            if !is_qualified(table) {
                return Err(format!(
                    "table '{}' is not qualified with a dataset (expected dataset.table)",
                    table
                ));
            }
        }

        for (idx, join) in self.joins.iter().enumerate() {
            if join.left.trim().is_empty() || join.right.trim().is_empty() {
                return Err(format!("join {} is missing a table identifier", idx));
            }
            if join.on.trim().is_empty() {
                return Err(format!("join {} ({} -> {}) has an empty predicate", idx, join.left, join.right));
            }
        }

        Ok(())
    }
}

/// `dataset.table` or `project.dataset.table`, optionally backtick-quoted
fn is_qualified(table: &str) -> bool {
    let name = table.trim().trim_matches('`');
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() >= 2 && parts.iter().all(|p| !p.trim().is_empty())
}

/// Join between two linked tables. Advisory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSpec {
    pub left: String,
    pub right: String,
    pub on: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub join_type: Option<String>,
}

/// One clause-scoped intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubProblem {
    pub clause: ClauseKind,
    pub goal: String,
}

/// Clause-level sub-problems in the order the decomposer emitted them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decomposition {
    pub subproblems: Vec<SubProblem>,
}

impl Decomposition {
    /// Sub-problems whose clause is outside the known vocabulary
    pub fn unrecognized(&self) -> impl Iterator<Item = &SubProblem> {
        self.subproblems.iter().filter(|sp| !sp.clause.is_recognized())
    }
}

/// Procedural plan. Describes what to compute, never how to write it in SQL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub steps: Vec<String>,
    pub aggregations: Vec<String>,
    pub filters: Vec<String>,
    pub group_bys: Vec<String>,
    pub order_bys: Vec<String>,
}

impl QueryPlan {
    /// All free-text fields, labelled by the field they came from
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        fn labelled<'a>(
            label: &'static str,
            items: &'a [String],
        ) -> impl Iterator<Item = (&'static str, &'a str)> + 'a {
            items.iter().map(move |s| (label, s.as_str()))
        }

        labelled("steps", &self.steps)
            .chain(labelled("aggregations", &self.aggregations))
            .chain(labelled("filters", &self.filters))
            .chain(labelled("group_bys", &self.group_bys))
            .chain(labelled("order_bys", &self.order_bys))
    }
}

/// Remediation plan for a rejected candidate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionPlan {
    /// Validator errors, verbatim
    pub errors: Vec<String>,
    pub corrections: Vec<String>,
}

/// Outcome of one dry run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub message: String,
    pub errors: Vec<String>,

    /// Why validation failed; None when valid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            valid: true,
            message: "Query is valid.".to_string(),
            errors: Vec::new(),
            failure: None,
        }
    }

    /// The engine compiled the query and rejected it
    pub fn rejected(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            valid: false,
            message: format!("Query validation failed: {}", error),
            errors: vec![error],
            failure: Some(FailureKind::Rejected),
        }
    }

    /// The call to the engine itself failed (network, auth, quota)
    pub fn transport(error: impl std::fmt::Display) -> Self {
        let error = format!("Unexpected error: {}", error);
        Self {
            valid: false,
            message: error.clone(),
            errors: vec![error],
            failure: Some(FailureKind::Transport),
        }
    }

    pub fn is_transport_failure(&self) -> bool {
        self.failure == Some(FailureKind::Transport)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Rejected,
    Transport,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(tables: &[&str]) -> SchemaLink {
        SchemaLink {
            tables: tables
                .iter()
                .map(|t| (t.to_string(), vec!["repo_name".to_string()]))
                .collect(),
            primary_keys: BTreeMap::new(),
            columns: BTreeMap::new(),
            joins: vec![],
        }
    }

    #[test]
    fn test_schema_link_requires_qualified_tables() {
        assert!(link(&["github_repos.commits"]).check().is_ok());
        assert!(link(&["`bigquery-public-data.github_repos.licenses`"]).check().is_ok());

        let err = link(&["commits"]).check().unwrap_err();
        assert!(err.contains("commits"));
        assert!(link(&[]).check().is_err());
    }

    #[test]
    fn test_schema_link_deserializes_join_type() {
        let json = r#"{
            "tables": {"dataset.commits": ["repo_name", "message"], "dataset.licenses": ["repo_name", "license"]},
            "primary_keys": {"dataset.licenses": "repo_name"},
            "columns": {"dataset.commits.message": "STRING"},
            "joins": [{"left": "dataset.commits", "right": "dataset.licenses", "on": "repo_name", "type": "inner"}]
        }"#;
        let link: SchemaLink = serde_json::from_str(json).unwrap();
        assert_eq!(link.joins[0].join_type.as_deref(), Some("inner"));
        assert!(link.check().is_ok());
    }

    #[test]
    fn test_schema_link_rejects_missing_fields() {
        let json = r#"{"tables": {"dataset.commits": ["message"]}}"#;
        assert!(serde_json::from_str::<SchemaLink>(json).is_err());
    }

    #[test]
    fn test_plan_fields_are_labelled() {
        let plan = QueryPlan {
            steps: vec!["pick repositories".into()],
            filters: vec!["description mentions finance".into()],
            ..Default::default()
        };
        let fields: Vec<_> = plan.fields().collect();
        assert_eq!(fields, vec![("steps", "pick repositories"), ("filters", "description mentions finance")]);
    }

    #[test]
    fn test_validation_result_shapes() {
        let ok = ValidationResult::valid();
        assert!(ok.valid && ok.errors.is_empty());

        let rejected = ValidationResult::rejected("Unrecognized name: x");
        assert_eq!(rejected.errors, vec!["Unrecognized name: x".to_string()]);
        assert!(!rejected.is_transport_failure());

        let transport = ValidationResult::transport("connection reset");
        assert_eq!(transport.errors, vec!["Unexpected error: connection reset".to_string()]);
        assert!(transport.is_transport_failure());
    }
}
