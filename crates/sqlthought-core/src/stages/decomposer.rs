use sqlthought_model::{Decomposition, SchemaLink};

use crate::error::PipelineError;
use crate::reasoning::{decode, OutputField, Prompt, ReasoningEngine, Stage};

const INSTRUCTIONS: &str = "You are a Subproblem Agent. Given the user request and the schema info, \
decompose the query into clause-level subproblems (e.g. WHERE, GROUP BY, JOIN, DISTINCT, ORDER BY, \
HAVING, EXCEPT, LIMIT, UNION). Describe what each clause should accomplish in words; do not write SQL.";

const OUTPUT: OutputField = OutputField {
    name: "decomposition",
    description: "clause-level subproblems, each with the clause name and its goal",
    shape: r#"{"decomposition": {"subproblems": [{"clause": "WHERE", "goal": "what this clause should accomplish"}]}}"#,
};

/// Split the question into clause-scoped intents
pub async fn decompose(
    engine: &dyn ReasoningEngine,
    question: &str,
    schema_link: &SchemaLink,
) -> Result<Decomposition, PipelineError> {
    let prompt = Prompt::new(Stage::Decomposition, INSTRUCTIONS, OUTPUT)
        .input("question", question)
        .input("schema_link", schema_link);

    let raw = super::invoke(engine, &prompt).await?;
    let decomposition: Decomposition = decode(Stage::Decomposition, &raw, OUTPUT.name)?;

    for subproblem in decomposition.unrecognized() {
        tracing::warn!(clause = %subproblem.clause, "sub-problem names an unrecognized clause");
    }

    tracing::info!(
        subproblems = decomposition.subproblems.len(),
        clauses = ?decomposition.subproblems.iter().map(|s| s.clause.as_str()).collect::<Vec<_>>(),
        "question decomposed"
    );

    Ok(decomposition)
}
