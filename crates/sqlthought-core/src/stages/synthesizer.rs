use sqlthought_model::{Decomposition, QueryPlan, SchemaLink, SqlCandidate};

use crate::error::PipelineError;
use crate::reasoning::{decode_text, OutputField, Prompt, ReasoningEngine, Stage};

const INSTRUCTIONS: &str = "You are a SQL Query Agent. Given the user request, schema info, subproblems \
and query plan, generate the final executable SQL query. The query must be valid for the target \
dialect and accurately reflect the user's intent as outlined in the plan. You must adhere to the \
provided rules so the SQL is efficient, safe and correct.";

const OUTPUT: OutputField = OutputField {
    name: "sql",
    description: "the final executable SQL query as a single string",
    shape: r#"{"sql": "SELECT ..."}"#,
};

/// Write the one SQL candidate for this run
pub async fn synthesize_sql(
    engine: &dyn ReasoningEngine,
    question: &str,
    schema_link: &SchemaLink,
    decomposition: &Decomposition,
    plan: &QueryPlan,
    rules: &[String],
    dialect: &str,
) -> Result<SqlCandidate, PipelineError> {
    let prompt = Prompt::new(Stage::Synthesis, INSTRUCTIONS, OUTPUT)
        .input("question", question)
        .input("dialect", dialect)
        .input("schema_link", schema_link)
        .input("subproblems", decomposition)
        .input("plan", plan)
        .input("rules", rules);

    let raw = super::invoke(engine, &prompt).await?;
    let text = decode_text(Stage::Synthesis, &raw, OUTPUT.name)?;
    let candidate = SqlCandidate::from_model_output(&text);

    if candidate.is_blank() {
        return Err(PipelineError::structural(Stage::Synthesis, "synthesized SQL is empty"));
    }

    tracing::info!(fingerprint = %candidate.fingerprint(), len = candidate.as_str().len(), "SQL synthesized");

    Ok(candidate)
}
