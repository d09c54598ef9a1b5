use sqlthought_model::{Decomposition, QueryPlan, SchemaLink};

use crate::error::PipelineError;
use crate::lint::plan_sql_leaks;
use crate::reasoning::{decode, OutputField, Prompt, ReasoningEngine, Stage};

const INSTRUCTIONS: &str = "You are a SQL Planning Agent. Given the user request, schema info and \
subproblems, create a step-by-step plan describing how the query answering the request will be \
constructed. You produce only the procedural plan: you are explicitly restricted from writing \
executable SQL, SQL fragments or quoted identifiers at this stage.";

const OUTPUT: OutputField = OutputField {
    name: "plan",
    description: "the procedural plan",
    shape: r#"{"plan": {
  "steps": ["step-by-step plan to build the query"],
  "aggregations": ["aggregations to use"],
  "filters": ["filters to apply"],
  "group_bys": ["groupings to use"],
  "order_bys": ["orderings to use"]
}}"#,
};

/// Produce a clause-free procedural plan.
///
/// With `strict` set, a plan containing SQL text is rejected as malformed output;
/// otherwise leaks are logged and the plan is kept.
pub async fn plan_query(
    engine: &dyn ReasoningEngine,
    question: &str,
    schema_link: &SchemaLink,
    decomposition: &Decomposition,
    strict: bool,
) -> Result<QueryPlan, PipelineError> {
    let prompt = Prompt::new(Stage::Planning, INSTRUCTIONS, OUTPUT)
        .input("question", question)
        .input("schema_link", schema_link)
        .input("subproblems", decomposition);

    let raw = super::invoke(engine, &prompt).await?;
    let plan: QueryPlan = decode(Stage::Planning, &raw, OUTPUT.name)?;

    let leaks = plan_sql_leaks(&plan);
    if !leaks.is_empty() {
        if strict {
            let reason = leaks.iter().map(|l| l.message.as_str()).collect::<Vec<_>>().join("; ");
            return Err(PipelineError::structural(Stage::Planning, reason));
        }
        for leak in &leaks {
            tracing::warn!(warning = %leak, "plan contains SQL");
        }
    }

    tracing::info!(steps = plan.steps.len(), filters = plan.filters.len(), "query planned");

    Ok(plan)
}
