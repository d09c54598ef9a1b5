//! sqlthought core - staged NL→SQL generation with bounded self-correction
//!
//! A question flows through schema linking, clause-level decomposition, procedural
//! planning and SQL synthesis. The synthesized query is dry-run validated and, while
//! the engine rejects it, handed to a corrector until it validates or the correction
//! budget runs out.
//!
//! The language model and the query engine are collaborators behind the
//! [`ReasoningEngine`] and [`SqlValidator`] traits.

pub mod correction;
pub mod error;
pub mod lint;
pub mod pipeline;
pub mod reasoning;
pub mod rules;
pub mod stages;
pub mod tools;
pub mod validator;

pub use correction::{CorrectionLoop, CorrectionOutcome, LoopTerminal};
pub use error::{PipelineError, ReasoningError, ToolError};
pub use pipeline::{
    CorrectionTopology, Generation, GenerationStatus, PipelineConfig, SqlPipeline,
    TransportPolicy, ValidationStage,
};
pub use reasoning::{Prompt, ReasoningEngine, Stage};
pub use tools::{CatalogSchemaTool, DryRunTool, Tool, ToolSpec, Toolbox};
pub use validator::SqlValidator;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::pipeline::{Generation, GenerationStatus, PipelineConfig, SqlPipeline};
    pub use crate::reasoning::{Prompt, ReasoningEngine, Stage};
    pub use crate::validator::SqlValidator;
    pub use sqlthought_model::{
        Decomposition, QueryPlan, SchemaDescription, SchemaLink, SqlCandidate, ValidationResult,
    };
}
