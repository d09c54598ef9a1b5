use std::time::Duration;
use thiserror::Error;

use crate::reasoning::Stage;

/// Failure talking to the reasoning engine
#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("Reasoning request failed: {0}")]
    Request(String),

    #[error("Reasoning engine returned no content")]
    EmptyResponse,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Question is empty")]
    EmptyQuestion,

    /// A stage answered with data that does not fit its declared shape
    #[error("{stage} returned malformed output: {reason}")]
    StructuralOutput { stage: Stage, reason: String },

    #[error("{stage} reasoning call failed: {source}")]
    Reasoning {
        stage: Stage,
        #[source]
        source: ReasoningError,
    },

    #[error("Pipeline timed out after {0:?}")]
    Timeout(Duration),

    #[error("Correction budget {requested} exceeds the limit of {limit}")]
    BudgetTooLarge { requested: usize, limit: usize },
}

impl PipelineError {
    pub(crate) fn structural(stage: Stage, reason: impl Into<String>) -> Self {
        PipelineError::StructuralOutput {
            stage,
            reason: reason.into(),
        }
    }

    /// Stage the failure originated in, when there is one
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::StructuralOutput { stage, .. } | PipelineError::Reasoning { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Tool {tool} failed: {reason}")]
    Failed { tool: String, reason: String },
}
