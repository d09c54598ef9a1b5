//! Deterministic stand-ins for the reasoning engine and the query engine

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sqlthought_core::{PipelineConfig, Prompt, ReasoningEngine, ReasoningError, SqlPipeline, SqlValidator, Stage};
use sqlthought_model::{SchemaDescription, ValidationResult};

pub const FINANCE_QUESTION: &str = "find repositories about finance, their license, and last commit message";

pub const CATALOG_JSON: &str = r#"{
  "dialect": "bigquery",
  "tables": [
    {
      "table_name": "dataset.commits",
      "table_columns": [
        {"name": "commit", "type": "STRING", "mode": "REQUIRED"},
        {"name": "repo_name", "type": "STRING", "mode": "REPEATED"},
        {"name": "message", "type": "STRING"},
        {"name": "committer", "type": "RECORD", "fields": [
          {"name": "name", "type": "STRING"},
          {"name": "date", "type": "TIMESTAMP"}
        ]}
      ]
    },
    {
      "table_name": "dataset.licenses",
      "table_columns": [
        {"name": "repo_name", "type": "STRING"},
        {"name": "license", "type": "STRING"}
      ]
    }
  ]
}"#;

pub const SCHEMA_LINK: &str = r#"{"schema_link": {
  "tables": {
    "dataset.commits": ["repo_name", "message", "committer.date"],
    "dataset.licenses": ["repo_name", "license"]
  },
  "primary_keys": {"dataset.commits": "commit", "dataset.licenses": "repo_name"},
  "columns": {
    "dataset.commits.repo_name": "ARRAY<STRING>",
    "dataset.commits.message": "STRING",
    "dataset.licenses.license": "STRING"
  },
  "joins": [
    {"left": "dataset.commits", "right": "dataset.licenses", "on": "repo_name matches", "type": "inner"}
  ]
}}"#;

pub const DECOMPOSITION: &str = r#"{"decomposition": {"subproblems": [
  {"clause": "JOIN", "goal": "combine commits with the license of their repository"},
  {"clause": "WHERE", "goal": "keep repositories whose name mentions finance"},
  {"clause": "ORDER BY", "goal": "most recent commit first"}
]}}"#;

pub const PLAN: &str = r#"{"plan": {
  "steps": ["take each commit with its repository", "attach the repository license", "keep the latest commit per repository"],
  "aggregations": [],
  "filters": ["repository name mentions finance"],
  "group_bys": [],
  "order_bys": ["commit date, newest first"]
}}"#;

pub const LEAKY_PLAN: &str = r#"{"plan": {
  "steps": ["SELECT repo_name FROM dataset.commits"],
  "aggregations": [],
  "filters": [],
  "group_bys": [],
  "order_bys": []
}}"#;

pub const SYNTHESIZED_SQL: &str = "SELECT c.x, l.license\nFROM dataset.commits AS c\nJOIN dataset.licenses AS l ON l.repo_name IN UNNEST(c.repo_name)\nWHERE 1 = 1\n  AND LOWER(l.repo_name) LIKE '%finance%'";

pub const CORRECTED_SQL: &str = "SELECT l.repo_name, l.license, c.message\nFROM dataset.commits AS c\nJOIN dataset.licenses AS l ON l.repo_name IN UNNEST(c.repo_name)\nWHERE 1 = 1\n  AND LOWER(l.repo_name) LIKE '%finance%'\nORDER BY c.committer.date DESC";

pub const CORRECTION_PLAN: &str = r#"{"correction_plan": {
  "errors": ["the column x does not exist"],
  "corrections": ["select the commit message instead of the unknown column x"]
}}"#;

/// Answers each stage from its own script.
///
/// Responses are consumed in order; the last one repeats. Every prompt is kept
/// for inspection.
pub struct ScriptedEngine {
    scripts: Mutex<HashMap<Stage, VecDeque<String>>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Engine answering the finance question end to end
    pub fn finance() -> Self {
        Self::new()
            .respond(Stage::SchemaLinking, SCHEMA_LINK)
            .respond(Stage::Decomposition, DECOMPOSITION)
            .respond(Stage::Planning, PLAN)
            .respond(Stage::Synthesis, &format!("```sql\n{}\n```", SYNTHESIZED_SQL))
            .respond(Stage::CorrectionPlanning, CORRECTION_PLAN)
            .respond(Stage::Correction, &serde_json::json!({"corrected_sql": CORRECTED_SQL}).to_string())
    }

    pub fn respond(self, stage: Stage, response: &str) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(stage)
            .or_default()
            .push_back(response.to_string());
        self
    }

    /// Replace the script of `stage`
    pub fn script(self, stage: Stage, responses: &[&str]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(stage, responses.iter().map(|r| r.to_string()).collect());
        self
    }

    pub fn calls(&self, stage: Stage) -> usize {
        self.prompts.lock().unwrap().iter().filter(|p| p.stage == stage).count()
    }

    pub fn prompts(&self, stage: Stage) -> Vec<Prompt> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.stage == stage)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedEngine {
    async fn complete(&self, prompt: &Prompt) -> Result<String, ReasoningError> {
        self.prompts.lock().unwrap().push(prompt.clone());

        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts
            .get_mut(&prompt.stage)
            .ok_or_else(|| ReasoningError::Request(format!("no script for {}", prompt.stage)))?;

        let response = if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() };
        response.ok_or(ReasoningError::EmptyResponse)
    }
}

/// Returns its results in order, repeating the last one
pub struct ScriptedValidator {
    results: Mutex<VecDeque<ValidationResult>>,
    seen: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedValidator {
    pub fn new(results: Vec<ValidationResult>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            seen: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always_valid() -> Self {
        Self::new(vec![ValidationResult::valid()])
    }

    pub fn always_invalid(error: &str) -> Self {
        Self::new(vec![ValidationResult::rejected(error)])
    }

    /// Rejects `failures` times, then accepts
    pub fn valid_after(failures: usize, error: &str) -> Self {
        let mut results = vec![ValidationResult::rejected(error); failures];
        results.push(ValidationResult::valid());
        Self::new(results)
    }

    pub fn unreachable() -> Self {
        Self::new(vec![ValidationResult::transport("connection reset by peer")])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlValidator for ScriptedValidator {
    async fn dry_run(&self, sql: &str) -> ValidationResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(sql.to_string());

        let mut results = self.results.lock().unwrap();
        if results.len() > 1 {
            results.pop_front().unwrap()
        } else {
            results.front().cloned().unwrap()
        }
    }
}

pub fn catalog() -> Arc<SchemaDescription> {
    Arc::new(SchemaDescription::from_json(CATALOG_JSON).unwrap())
}

pub fn pipeline(
    config: PipelineConfig,
    engine: Arc<ScriptedEngine>,
    validator: Arc<ScriptedValidator>,
) -> SqlPipeline {
    SqlPipeline::new(config, catalog(), engine, validator)
}
