use thiserror::Error;

/// Failures talking to the external engines behind the core traits
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("OpenAI request failed: {0}")]
    OpenAi(#[from] async_openai::error::OpenAIError),

    #[error("OpenAI returned no message content")]
    NoContent,

    #[error("BigQuery request failed: {0}")]
    BigQuery(#[from] gcp_bigquery_client::error::BQError),
}
