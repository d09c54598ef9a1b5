//! End-to-end generation: link → decompose → plan → synthesize → validate/correct

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;
use uuid::Uuid;

use sqlthought_model::{
    Decomposition, QueryPlan, SchemaDescription, SchemaLink, SqlCandidate, ValidationResult,
};

use crate::correction::{CorrectionLoop, LoopTerminal};
use crate::error::PipelineError;
use crate::lint::{lint_sql, LintWarning};
use crate::reasoning::ReasoningEngine;
use crate::rules::default_rules;
use crate::stages::{
    decompose, link_schema, plan_query, synthesize_sql, CorrectionContext, Corrector, ReactCorrector,
    TwoStepCorrector,
};
use crate::tools::{CatalogSchemaTool, DryRunTool, Tool, Toolbox};
use crate::validator::SqlValidator;

/// How a failed candidate is corrected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionTopology {
    /// One tool-augmented step (dry run, table schema)
    SingleStep,
    /// Correction planner, then corrector
    #[default]
    TwoStep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStage {
    #[default]
    DryRun,
    /// Return the synthesized SQL without validating or correcting it
    Disabled,
}

/// What the correction loop does when the validator itself fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportPolicy {
    /// Treat the failure like a rejection and keep correcting
    #[default]
    Retry,
    /// Stop correcting and return the current candidate
    Abort,
}

/// Pipeline settings, built once and handed to [`SqlPipeline::new`]
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_correction_attempts: usize,
    /// Largest budget a caller may request per run
    pub max_correction_attempts_limit: usize,
    pub correction_topology: CorrectionTopology,
    pub validation_stage: ValidationStage,
    pub transport_policy: TransportPolicy,
    /// Tool turns per single-step correction
    pub max_tool_iterations: usize,
    /// Reject plans containing SQL instead of warning
    pub strict_plan: bool,
    pub lint: bool,
    /// Ordered rules passed to synthesis and every correction
    pub rules: Vec<String>,
    /// Limit on a whole `generate` call
    pub timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_correction_attempts: 3,
            max_correction_attempts_limit: 10,
            correction_topology: CorrectionTopology::default(),
            validation_stage: ValidationStage::default(),
            transport_policy: TransportPolicy::default(),
            max_tool_iterations: 5,
            strict_plan: false,
            lint: true,
            rules: default_rules(),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Valid,
    /// Budget spent, SQL still invalid
    Exhausted,
    /// Validator unreachable under [`TransportPolicy::Abort`]
    Aborted,
    Unvalidated,
}

impl From<LoopTerminal> for GenerationStatus {
    fn from(terminal: LoopTerminal) -> Self {
        match terminal {
            LoopTerminal::Valid => GenerationStatus::Valid,
            LoopTerminal::Exhausted => GenerationStatus::Exhausted,
            LoopTerminal::Aborted => GenerationStatus::Aborted,
        }
    }
}

/// Result of one run: the final SQL, its last validation and the stage artifacts
#[derive(Debug, Clone, Serialize)]
pub struct Generation {
    pub run_id: Uuid,
    pub sql: SqlCandidate,
    pub status: GenerationStatus,
    /// `None` when validation is disabled
    pub validation: Option<ValidationResult>,
    pub correction_attempts: usize,
    pub schema_link: SchemaLink,
    pub decomposition: Decomposition,
    pub plan: QueryPlan,
    pub lint_warnings: Vec<LintWarning>,
}

impl Generation {
    /// True only for SQL the engine accepted
    pub fn is_success(&self) -> bool {
        self.status == GenerationStatus::Valid
    }

    /// Errors from the last validation
    pub fn errors(&self) -> &[String] {
        self.validation.as_ref().map(|v| v.errors.as_slice()).unwrap_or(&[])
    }
}

/// The staged NL→SQL pipeline.
///
/// Holds no per-run state; share it behind an `Arc` and call [`generate`](Self::generate)
/// concurrently.
pub struct SqlPipeline {
    config: PipelineConfig,
    catalog: Arc<SchemaDescription>,
    engine: Arc<dyn ReasoningEngine>,
    validator: Arc<dyn SqlValidator>,
    schema_tool: Arc<dyn Tool>,
}

impl SqlPipeline {
    pub fn new(
        config: PipelineConfig,
        catalog: Arc<SchemaDescription>,
        engine: Arc<dyn ReasoningEngine>,
        validator: Arc<dyn SqlValidator>,
    ) -> Self {
        let schema_tool: Arc<dyn Tool> = Arc::new(CatalogSchemaTool::new(catalog.clone()));
        Self {
            config,
            catalog,
            engine,
            validator,
            schema_tool,
        }
    }

    /// Serve `get_table_schema` from something other than the static catalog
    pub fn with_schema_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.schema_tool = tool;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &SchemaDescription {
        &self.catalog
    }

    /// Generate SQL for `question` with the configured correction budget
    pub async fn generate(&self, question: &str) -> Result<Generation, PipelineError> {
        self.generate_with_budget(question, self.config.max_correction_attempts)
            .await
    }

    /// Generate SQL for `question`, allowing at most `max_correction_attempts`
    /// corrections.
    ///
    /// Validation failures never surface as `Err`: an exhausted run returns the
    /// last candidate with its errors. `Err` means a stage failed outright or the
    /// run timed out.
    pub async fn generate_with_budget(
        &self,
        question: &str,
        max_correction_attempts: usize,
    ) -> Result<Generation, PipelineError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::EmptyQuestion);
        }

        let limit = self.config.max_correction_attempts_limit;
        if max_correction_attempts > limit {
            return Err(PipelineError::BudgetTooLarge {
                requested: max_correction_attempts,
                limit,
            });
        }

        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("generate", %run_id);
        let run = self.run(run_id, question, max_correction_attempts).instrument(span);

        match self.config.timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
                tracing::error!(%run_id, timeout = ?limit, "generation timed out");
                PipelineError::Timeout(limit)
            })?,
            None => run.await,
        }
    }

    async fn run(&self, run_id: Uuid, question: &str, budget: usize) -> Result<Generation, PipelineError> {
        let start = Instant::now();
        let engine = self.engine.as_ref();
        let dialect = self.catalog.dialect();

        tracing::info!(question, budget, topology = ?self.config.correction_topology, "generating SQL");

        let schema_link = link_schema(engine, question, &self.catalog).await?;
        let decomposition = decompose(engine, question, &schema_link).await?;
        let plan = plan_query(engine, question, &schema_link, &decomposition, self.config.strict_plan).await?;
        let sql = synthesize_sql(
            engine,
            question,
            &schema_link,
            &decomposition,
            &plan,
            &self.config.rules,
            dialect,
        )
        .await?;

        let (sql, status, validation, correction_attempts) = match self.config.validation_stage {
            ValidationStage::Disabled => {
                tracing::info!("validation disabled, returning synthesized SQL");
                (sql, GenerationStatus::Unvalidated, None, 0)
            }
            ValidationStage::DryRun => {
                let ctx = CorrectionContext {
                    question,
                    schema_link: &schema_link,
                    rules: &self.config.rules,
                    dialect,
                };
                let corrector = self.corrector();
                let outcome = CorrectionLoop::new(self.validator.as_ref(), corrector.as_ref(), budget)
                    .with_transport_policy(self.config.transport_policy)
                    .run(&ctx, sql)
                    .await?;
                (
                    outcome.sql,
                    outcome.terminal.into(),
                    Some(outcome.validation),
                    outcome.attempts,
                )
            }
        };

        let lint_warnings = if self.config.lint { lint_sql(sql.as_str()) } else { Vec::new() };
        for warning in &lint_warnings {
            tracing::warn!(warning = %warning, "SQL lint");
        }

        tracing::info!(
            status = ?status,
            correction_attempts,
            fingerprint = %sql.fingerprint(),
            ms = start.elapsed().as_millis() as u64,
            "generation finished"
        );

        Ok(Generation {
            run_id,
            sql,
            status,
            validation,
            correction_attempts,
            schema_link,
            decomposition,
            plan,
            lint_warnings,
        })
    }

    fn corrector(&self) -> Box<dyn Corrector> {
        match self.config.correction_topology {
            CorrectionTopology::TwoStep => Box::new(TwoStepCorrector::new(self.engine.clone())),
            CorrectionTopology::SingleStep => {
                let toolbox = Toolbox::new()
                    .with(Arc::new(DryRunTool::new(self.validator.clone())))
                    .with(self.schema_tool.clone());
                Box::new(ReactCorrector::new(
                    self.engine.clone(),
                    toolbox,
                    self.config.max_tool_iterations,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_correction_attempts, 3);
        assert_eq!(config.max_correction_attempts_limit, 10);
        assert_eq!(config.correction_topology, CorrectionTopology::TwoStep);
        assert_eq!(config.validation_stage, ValidationStage::DryRun);
        assert_eq!(config.transport_policy, TransportPolicy::Retry);
        assert_eq!(config.rules.len(), 19);
        assert!(config.timeout.is_none());
    }

    #[test]
    fn test_enums_deserialize_snake_case() {
        let topology: CorrectionTopology = serde_json::from_str("\"single_step\"").unwrap();
        assert_eq!(topology, CorrectionTopology::SingleStep);
        let policy: TransportPolicy = serde_json::from_str("\"abort\"").unwrap();
        assert_eq!(policy, TransportPolicy::Abort);
        let stage: ValidationStage = serde_json::from_str("\"disabled\"").unwrap();
        assert_eq!(stage, ValidationStage::Disabled);
    }

    #[test]
    fn test_status_from_terminal() {
        assert_eq!(GenerationStatus::from(LoopTerminal::Valid), GenerationStatus::Valid);
        assert_eq!(GenerationStatus::from(LoopTerminal::Exhausted), GenerationStatus::Exhausted);
        assert_eq!(GenerationStatus::from(LoopTerminal::Aborted), GenerationStatus::Aborted);
    }
}
