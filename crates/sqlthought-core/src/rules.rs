//! Style and safety rules handed to synthesis and correction.
//!
//! Advisory context only. [`crate::lint`] reports a few violations it can detect
//! mechanically.

pub const DEFAULT_RULES: &[&str] = &[
    "Use CTEs for complex queries",
    "Use table aliases to shorten table names",
    "Use column aliases for computed columns",
    "Only use SQL features supported by the target dialect (given in schema)",
    "Always use explicit JOINs instead of WHERE-based joins",
    "Always use fully qualified column names (table.column)",
    "Ensure the SQL is syntactically correct",
    "Ensure the SQL is semantically correct (e.g. GROUP BY columns)",
    "Ensure the SQL addresses all subtasks in the decomposition",
    "Ensure the SQL is safe against SQL injection (e.g. no direct string interpolation)",
    "Ensure the SQL returns correct results for the question",
    "Ensure the SQL is efficient and scalable (e.g. avoid SELECT *)",
    "Ensure the SQL uses appropriate indexing (e.g. WHERE clauses on indexed columns)",
    "Ensure the SQL uses appropriate aggregation functions (e.g. COUNT, SUM, AVG)",
    "Ensure the SQL uses appropriate filtering (e.g. WHERE, HAVING)",
    "Ensure the SQL uses appropriate sorting (e.g. ORDER BY)",
    "Ensure the SQL uses appropriate grouping (e.g. GROUP BY)",
    "Ensure the SQL uses appropriate joins (e.g. INNER JOIN, LEFT JOIN)",
    "When you use a WHERE clause, use `WHERE 1 = 1` as the first condition to make appending conditions easier. Subsequent conditions should use AND/OR on a new row.",
];

pub fn default_rules() -> Vec<String> {
    DEFAULT_RULES.iter().map(|r| r.to_string()).collect()
}
