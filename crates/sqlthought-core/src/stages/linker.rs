use sqlthought_model::{SchemaDescription, SchemaLink};

use crate::error::PipelineError;
use crate::reasoning::{decode, OutputField, Prompt, ReasoningEngine, Stage};

const INSTRUCTIONS: &str = "You are a Schema Linking Agent. Identify the tables, columns, primary keys \
and joins relevant to the user's question, using only the database schema provided. \
Return STRICT structured JSON. Tables must be qualified with a dataset (e.g. dataset.table).";

const OUTPUT: OutputField = OutputField {
    name: "schema_link",
    description: "the minimal relevant sub-schema",
    shape: r#"{"schema_link": {
  "tables": {"dataset.table": ["column", "..."]},
  "primary_keys": {"dataset.table": "column"},
  "columns": {"dataset.table.column": "declared type (e.g. STRING, INT64, TIMESTAMP)"},
  "joins": [{"left": "dataset.table", "right": "dataset.other", "on": "join predicate", "type": "inner|left|null"}]
}}"#,
};

/// Map the question onto the minimal relevant sub-schema
pub async fn link_schema(
    engine: &dyn ReasoningEngine,
    question: &str,
    catalog: &SchemaDescription,
) -> Result<SchemaLink, PipelineError> {
    let prompt = Prompt::new(Stage::SchemaLinking, INSTRUCTIONS, OUTPUT)
        .input("question", question)
        .input("db_schema", catalog);

    let raw = super::invoke(engine, &prompt).await?;
    let link: SchemaLink = decode(Stage::SchemaLinking, &raw, OUTPUT.name)?;

    link.check()
        .map_err(|reason| PipelineError::structural(Stage::SchemaLinking, reason))?;

    tracing::info!(
        tables = ?link.tables.keys().collect::<Vec<_>>(),
        joins = link.joins.len(),
        "schema linked"
    );

    Ok(link)
}
