//! Mechanical checks on stage outputs
//!
//! - plans must not contain SQL text
//! - synthesized SQL is checked against the rules that can be detected lexically
//!
//! Findings are warnings; the pipeline decides whether a plan leak is fatal.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

use sqlthought_model::QueryPlan;

static SELECT_FROM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)\bselect\b.+\bfrom\b").unwrap());
static JOIN_ON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bjoin\s+[\w.`-]+(?:\s+(?:as\s+)?\w+)?\s+on\b").unwrap());
static BACKTICK_IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"`[\w.-]+`").unwrap());
static STATEMENT_END: Lazy<Regex> = Lazy::new(|| Regex::new(r";\s*$").unwrap());
static WHERE_GUARD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bwhere\s+1\s*=\s*1\b").unwrap());

static WHERE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bwhere\b").unwrap());
static SELECT_STAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bselect\s+(?:distinct\s+)?(?:[\w`]+\.)?\*").unwrap());
static COMMA_JOIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bfrom\s+[\w.`-]+(?:\s+(?:as\s+)?\w+)?\s*,\s*([\w`(]+)").unwrap()
});

/// One lint finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintWarning {
    pub rule: &'static str,
    pub message: String,
}

impl fmt::Display for LintWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.rule, self.message)
    }
}

/// Report plan entries that contain SQL syntax
pub fn plan_sql_leaks(plan: &QueryPlan) -> Vec<LintWarning> {
    let patterns: [(&Regex, &str); 5] = [
        (&SELECT_FROM, "SELECT ... FROM"),
        (&JOIN_ON, "JOIN ... ON"),
        (&BACKTICK_IDENT, "backtick-quoted identifier"),
        (&STATEMENT_END, "statement terminator"),
        (&WHERE_GUARD, "WHERE 1 = 1"),
    ];

    let mut warnings = Vec::new();
    let mut counters = std::collections::HashMap::new();

    for (field, text) in plan.fields() {
        let idx = counters.entry(field).or_insert(0usize);
        for (pattern, what) in &patterns {
            if pattern.is_match(text) {
                warnings.push(LintWarning {
                    rule: "plan_contains_sql",
                    message: format!("{}[{}] contains SQL ({}): {}", field, idx, what, text),
                });
                break;
            }
        }
        *idx += 1;
    }

    warnings
}

/// Check SQL against the mechanically detectable rules
pub fn lint_sql(sql: &str) -> Vec<LintWarning> {
    let mut warnings = Vec::new();

    if SELECT_STAR.is_match(sql) {
        warnings.push(LintWarning {
            rule: "avoid_select_star",
            message: "query selects all columns with *".to_string(),
        });
    }

    for caps in COMMA_JOIN.captures_iter(sql) {
        let next = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        if !next.to_lowercase().starts_with("unnest") {
            warnings.push(LintWarning {
                rule: "explicit_joins",
                message: format!("comma join before '{}'; use an explicit JOIN", next),
            });
        }
    }

    let wheres = WHERE.find_iter(sql).count();
    let guarded = WHERE_GUARD.find_iter(sql).count();
    if wheres > guarded {
        warnings.push(LintWarning {
            rule: "where_guard",
            message: format!("{} WHERE clause(s) without a leading `1 = 1` guard", wheres - guarded),
        });
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prose_plan_is_clean() {
        let plan = QueryPlan {
            steps: vec![
                "Find repositories whose name mentions finance".into(),
                "Join commits and licenses on the repository name".into(),
                "Select the latest commit per repository".into(),
            ],
            aggregations: vec!["MAX of committer date per repository".into()],
            filters: vec!["repository name contains 'finance'".into()],
            group_bys: vec!["GROUP BY repository name".into()],
            order_bys: vec!["most recent commit first".into()],
        };
        assert!(plan_sql_leaks(&plan).is_empty(), "{:?}", plan_sql_leaks(&plan));
    }

    #[test]
    fn test_plan_leaks_are_located() {
        let plan = QueryPlan {
            steps: vec![
                "Start from the commits table".into(),
                "SELECT repo_name FROM `github_repos.commits`".into(),
            ],
            filters: vec!["l.repo_name = c.repo_name;".into()],
            ..Default::default()
        };
        let leaks = plan_sql_leaks(&plan);
        assert_eq!(leaks.len(), 2);
        assert!(leaks[0].message.starts_with("steps[1]"));
        assert!(leaks[1].message.starts_with("filters[0]"));
    }

    #[test]
    fn test_lint_select_star() {
        let warnings = lint_sql("SELECT * FROM ds.t WHERE 1 = 1");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].rule, "avoid_select_star");

        assert!(lint_sql("SELECT COUNT(*) AS n FROM ds.t").is_empty());
        assert_eq!(lint_sql("SELECT c.* FROM ds.t AS c")[0].rule, "avoid_select_star");
    }

    #[test]
    fn test_lint_comma_join_allows_unnest() {
        let warnings = lint_sql("SELECT c.message FROM ds.commits c, ds.licenses l");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].rule, "explicit_joins");

        assert!(lint_sql("SELECT r FROM ds.commits AS c, UNNEST(c.repo_name) AS r").is_empty());
    }

    #[test]
    fn test_lint_where_guard() {
        assert!(lint_sql("SELECT a FROM ds.t WHERE 1 = 1\n  AND a > 3").is_empty());

        let warnings = lint_sql("SELECT a FROM ds.t WHERE a > 3");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].rule, "where_guard");
    }
}
