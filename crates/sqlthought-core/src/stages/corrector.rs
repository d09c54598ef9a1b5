//! Correction stages.
//!
//! Two topologies produce a corrected candidate from the current SQL and the
//! validator's errors:
//! - [`TwoStepCorrector`]: a correction planner writes a [`CorrectionPlan`], then a
//!   corrector applies it
//! - [`ReactCorrector`]: one reasoning step that may call tools (dry run, table
//!   schema) in a bounded loop before answering

use async_trait::async_trait;
use std::sync::Arc;

use sqlthought_model::{CorrectionPlan, SchemaLink, SqlCandidate};

use crate::error::PipelineError;
use crate::reasoning::{
    decode, decode_react_step, decode_text, OutputField, Prompt, ReactStep, ReasoningEngine,
    Stage, ToolCallRecord,
};
use crate::tools::Toolbox;

/// What every correction call sees besides the SQL and its errors
#[derive(Debug, Clone, Copy)]
pub struct CorrectionContext<'a> {
    pub question: &'a str,
    pub schema_link: &'a SchemaLink,
    pub rules: &'a [String],
    pub dialect: &'a str,
}

#[async_trait]
pub trait Corrector: Send + Sync {
    /// Produce the next candidate. The result may itself be invalid (even empty);
    /// the correction loop validates it like any other candidate.
    async fn correct(
        &self,
        ctx: &CorrectionContext<'_>,
        sql: &SqlCandidate,
        errors: &[String],
    ) -> Result<SqlCandidate, PipelineError>;
}

const PLANNER_INSTRUCTIONS: &str = "You are a SQL Correction Planning Agent. Given a SQL query and the \
errors the query engine reported while validating it, analyze each error and describe in words how \
the query must change to fix it. Copy the errors verbatim. Do not write the corrected SQL.";

const PLANNER_OUTPUT: OutputField = OutputField {
    name: "correction_plan",
    description: "the validator errors and the remediation for each",
    shape: r#"{"correction_plan": {"errors": ["error text, verbatim"], "corrections": ["how to fix it"]}}"#,
};

const CORRECTOR_INSTRUCTIONS: &str = "You are a SQL Correction Agent. Given a SQL query, the errors \
encountered during validation and a correction plan, produce the corrected SQL query. Fix the SQL so \
it validates successfully and still answers the user's original question. Follow the rules.";

const REACT_INSTRUCTIONS: &str = "You are a SQL Correction Agent. Given a SQL query and the errors \
encountered during validation, analyze the errors and produce a corrected SQL query. Fix the SQL so \
it validates successfully and still answers the user's original question. Follow the rules. You may \
use the dry_run_sql tool to validate your corrections and get_table_schema to check column names \
before returning the final SQL.";

const CORRECTED_OUTPUT: OutputField = OutputField {
    name: "corrected_sql",
    description: "the revised SQL query that fixes all validation errors",
    shape: r#"{"corrected_sql": "SELECT ..."}"#,
};

fn base_prompt(
    stage: Stage,
    instructions: &'static str,
    output: OutputField,
    ctx: &CorrectionContext<'_>,
    sql: &SqlCandidate,
    errors: &[String],
) -> Prompt {
    Prompt::new(stage, instructions, output)
        .input("question", ctx.question)
        .input("dialect", ctx.dialect)
        .input("schema_link", ctx.schema_link)
        .input("sql", sql.as_str())
        .input("errors", errors)
        .input("rules", ctx.rules)
}

/// Describe how to fix the current candidate
pub async fn plan_correction(
    engine: &dyn ReasoningEngine,
    ctx: &CorrectionContext<'_>,
    sql: &SqlCandidate,
    errors: &[String],
) -> Result<CorrectionPlan, PipelineError> {
    let prompt = base_prompt(Stage::CorrectionPlanning, PLANNER_INSTRUCTIONS, PLANNER_OUTPUT, ctx, sql, errors);

    let raw = super::invoke(engine, &prompt).await?;
    let mut plan: CorrectionPlan = decode(Stage::CorrectionPlanning, &raw, PLANNER_OUTPUT.name)?;

    // The plan carries the validator's errors, not the model's paraphrase of them
    if plan.errors != errors {
        tracing::debug!(model_errors = ?plan.errors, "replacing paraphrased errors in correction plan");
        plan.errors = errors.to_vec();
    }

    if plan.corrections.is_empty() {
        tracing::warn!(errors = errors.len(), "correction plan has no corrections");
    }

    Ok(plan)
}

/// Apply a correction plan to the current candidate
pub async fn apply_correction(
    engine: &dyn ReasoningEngine,
    ctx: &CorrectionContext<'_>,
    sql: &SqlCandidate,
    plan: &CorrectionPlan,
) -> Result<SqlCandidate, PipelineError> {
    let prompt = base_prompt(Stage::Correction, CORRECTOR_INSTRUCTIONS, CORRECTED_OUTPUT, ctx, sql, &plan.errors)
        .input("correction_plan", plan);

    let raw = super::invoke(engine, &prompt).await?;
    let text = decode_text(Stage::Correction, &raw, CORRECTED_OUTPUT.name)?;
    Ok(SqlCandidate::from_model_output(&text))
}

/// Correction planner followed by a separate corrector
pub struct TwoStepCorrector {
    engine: Arc<dyn ReasoningEngine>,
}

impl TwoStepCorrector {
    pub fn new(engine: Arc<dyn ReasoningEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Corrector for TwoStepCorrector {
    async fn correct(
        &self,
        ctx: &CorrectionContext<'_>,
        sql: &SqlCandidate,
        errors: &[String],
    ) -> Result<SqlCandidate, PipelineError> {
        let plan = plan_correction(self.engine.as_ref(), ctx, sql, errors).await?;
        tracing::info!(corrections = ?plan.corrections, "correction planned");
        apply_correction(self.engine.as_ref(), ctx, sql, &plan).await
    }
}

/// Single tool-augmented correction step.
///
/// Each turn the engine either calls a tool or answers. After `max_iterations`
/// tool turns it is asked for a final answer with tools withdrawn.
pub struct ReactCorrector {
    engine: Arc<dyn ReasoningEngine>,
    toolbox: Toolbox,
    max_iterations: usize,
}

impl ReactCorrector {
    pub fn new(engine: Arc<dyn ReasoningEngine>, toolbox: Toolbox, max_iterations: usize) -> Self {
        Self {
            engine,
            toolbox,
            max_iterations,
        }
    }
}

#[async_trait]
impl Corrector for ReactCorrector {
    async fn correct(
        &self,
        ctx: &CorrectionContext<'_>,
        sql: &SqlCandidate,
        errors: &[String],
    ) -> Result<SqlCandidate, PipelineError> {
        let mut prompt = base_prompt(Stage::Correction, REACT_INSTRUCTIONS, CORRECTED_OUTPUT, ctx, sql, errors)
            .with_tools(self.toolbox.specs());

        for iteration in 0..self.max_iterations {
            let raw = super::invoke(self.engine.as_ref(), &prompt).await?;

            match decode_react_step(Stage::Correction, &raw, CORRECTED_OUTPUT.name)? {
                ReactStep::Finish(text) => {
                    tracing::debug!(iteration, tool_calls = prompt.transcript.len(), "corrector answered");
                    return Ok(SqlCandidate::from_model_output(&text));
                }
                ReactStep::Call { tool, arguments } => {
                    tracing::debug!(iteration, tool = %tool, "corrector called tool");
                    let observation = self.toolbox.call(&tool, &arguments).await;
                    prompt.transcript.push(ToolCallRecord {
                        tool,
                        arguments,
                        observation,
                    });
                }
            }
        }

        tracing::warn!(max_iterations = self.max_iterations, "corrector tool budget exhausted");
        prompt.final_answer_required = true;

        let raw = super::invoke(self.engine.as_ref(), &prompt).await?;
        let text = decode_text(Stage::Correction, &raw, CORRECTED_OUTPUT.name)?;
        Ok(SqlCandidate::from_model_output(&text))
    }
}
