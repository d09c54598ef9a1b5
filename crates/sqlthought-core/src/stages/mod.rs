//! Reasoning stages of the pipeline, in execution order

use std::time::Instant;

use crate::error::PipelineError;
use crate::reasoning::{Prompt, ReasoningEngine};

mod corrector;
mod decomposer;
mod linker;
mod planner;
mod synthesizer;

pub use corrector::{
    apply_correction, plan_correction, CorrectionContext, Corrector, ReactCorrector, TwoStepCorrector,
};
pub use decomposer::decompose;
pub use linker::link_schema;
pub use planner::plan_query;
pub use synthesizer::synthesize_sql;

/// Send one prompt, timing it and attributing failures to the stage
pub(crate) async fn invoke(engine: &dyn ReasoningEngine, prompt: &Prompt) -> Result<String, PipelineError> {
    let start = Instant::now();
    tracing::debug!(stage = %prompt.stage, tools = prompt.tools.len(), "reasoning call");

    let raw = engine
        .complete(prompt)
        .await
        .map_err(|source| PipelineError::Reasoning {
            stage: prompt.stage,
            source,
        })?;

    tracing::debug!(
        stage = %prompt.stage,
        ms = start.elapsed().as_millis() as u64,
        response_len = raw.len(),
        "reasoning call finished"
    );
    tracing::trace!(stage = %prompt.stage, response = %raw, "raw response");

    Ok(raw)
}
