//! Reasoning engine boundary
//!
//! Every stage sends one [`Prompt`] (typed input fields plus a declared output field)
//! and expects one JSON answer back. Tool-augmented stages may instead answer with a
//! tool call, receive the observation in the transcript, and ask again.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

use sqlthought_model::strip_fences;

use crate::error::{PipelineError, ReasoningError};
use crate::tools::ToolSpec;

/// Pipeline stage issuing a reasoning call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SchemaLinking,
    Decomposition,
    Planning,
    Synthesis,
    CorrectionPlanning,
    Correction,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::SchemaLinking => "schema linking",
            Stage::Decomposition => "sub-problem decomposition",
            Stage::Planning => "query planning",
            Stage::Synthesis => "SQL synthesis",
            Stage::CorrectionPlanning => "correction planning",
            Stage::Correction => "SQL correction",
        };
        f.write_str(name)
    }
}

/// The field a stage must answer with
#[derive(Debug, Clone, Copy)]
pub struct OutputField {
    pub name: &'static str,
    pub description: &'static str,
    /// Example of the expected JSON value
    pub shape: &'static str,
}

/// One tool invocation and what it returned
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub arguments: Value,
    pub observation: Value,
}

/// Structured request for one reasoning step
#[derive(Debug, Clone)]
pub struct Prompt {
    pub stage: Stage,
    pub instructions: &'static str,
    pub inputs: Vec<(&'static str, Value)>,
    pub output: OutputField,
    pub tools: Vec<ToolSpec>,
    pub transcript: Vec<ToolCallRecord>,
    /// Set once the tool budget is spent; the engine must answer directly
    pub final_answer_required: bool,
}

impl Prompt {
    pub fn new(stage: Stage, instructions: &'static str, output: OutputField) -> Self {
        Self {
            stage,
            instructions,
            inputs: Vec::new(),
            output,
            tools: Vec::new(),
            transcript: Vec::new(),
            final_answer_required: false,
        }
    }

    pub fn input(mut self, name: &'static str, value: impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => self.inputs.push((name, value)),
            Err(e) => {
                tracing::warn!(stage = %self.stage, input = name, error = %e, "dropping unserializable prompt input")
            }
        }
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn get_input(&self, name: &str) -> Option<&Value> {
        self.inputs.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// System message: role instructions, output contract and tool protocol
    pub fn render_system(&self) -> String {
        let mut out = String::new();
        out.push_str(self.instructions);

        out.push_str("\n\n## Output\n\n");
        out.push_str(&format!(
            "Respond with a single JSON object containing the key \"{}\": {}\n\nShape:\n{}\n",
            self.output.name, self.output.description, self.output.shape
        ));

        if !self.tools.is_empty() && !self.final_answer_required {
            out.push_str("\n## Tools\n\n");
            out.push_str(
                "Before answering you may call one tool per turn by responding with \
                 {\"tool\": \"<name>\", \"arguments\": {...}} instead of the output object. \
                 The observation is returned to you in the next turn.\n\n",
            );
            for tool in &self.tools {
                out.push_str(&format!(
                    "- `{}`: {}\n  Arguments: {}\n",
                    tool.name, tool.description, tool.parameters
                ));
            }
        }

        out.push_str("\nReturn ONLY the JSON, no markdown, no explanations.");
        out
    }

    /// User message: the typed inputs followed by any tool transcript
    pub fn render_user(&self) -> String {
        let mut out = String::new();

        for (name, value) in &self.inputs {
            out.push_str(&format!("## {}\n\n", name));
            match value {
                Value::String(s) => out.push_str(s),
                other => out.push_str(&serde_json::to_string_pretty(other).unwrap_or_default()),
            }
            out.push_str("\n\n");
        }

        if !self.transcript.is_empty() {
            out.push_str("## Tool calls so far\n\n");
            for (idx, call) in self.transcript.iter().enumerate() {
                out.push_str(&format!(
                    "{}. {}({}) -> {}\n",
                    idx + 1,
                    call.tool,
                    call.arguments,
                    call.observation
                ));
            }
            out.push('\n');
        }

        if self.final_answer_required {
            out.push_str("Tool budget exhausted. Answer now with the output object.\n");
        }

        out
    }
}

/// Opaque reasoning function. Implementations must be safe to share across runs.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// Answer one prompt with raw text (expected to be JSON)
    async fn complete(&self, prompt: &Prompt) -> Result<String, ReasoningError>;
}

/// Decode a structured answer.
///
/// Accepts either a wrapper object `{"<field>": value}` or the value itself,
/// optionally inside a ```json fence.
pub(crate) fn decode<T: DeserializeOwned>(
    stage: Stage,
    raw: &str,
    field: &str,
) -> Result<T, PipelineError> {
    let value = parse_json(raw)
        .map_err(|e| PipelineError::structural(stage, format!("response is not JSON: {}", e)))?;

    decode_value(stage, value, field)
}

/// Parse an answer as JSON. The fence is only stripped when the text as a whole is
/// not JSON, so fences inside string values survive until the value is extracted.
fn parse_json(raw: &str) -> serde_json::Result<Value> {
    let text = raw.trim();
    serde_json::from_str(text).or_else(|e| {
        let unfenced = strip_fences(text);
        if unfenced == text {
            Err(e)
        } else {
            serde_json::from_str(&unfenced)
        }
    })
}

fn decode_value<T: DeserializeOwned>(
    stage: Stage,
    value: Value,
    field: &str,
) -> Result<T, PipelineError> {
    let inner = match value {
        Value::Object(mut map) if map.contains_key(field) => map.remove(field).unwrap_or(Value::Null),
        other => other,
    };

    serde_json::from_value(inner)
        .map_err(|e| PipelineError::structural(stage, format!("'{}' does not match its shape: {}", field, e)))
}

/// Decode a text answer (SQL).
///
/// A JSON wrapper or JSON string is unwrapped; a JSON value of any other shape is
/// a structural error; non-JSON text is taken as the answer itself.
pub(crate) fn decode_text(stage: Stage, raw: &str, field: &str) -> Result<String, PipelineError> {
    match parse_json(raw) {
        Ok(value @ (Value::Object(_) | Value::String(_))) => decode_value(stage, value, field),
        Ok(other) => Err(PipelineError::structural(
            stage,
            format!("expected '{}' to be a string, got {}", field, other),
        )),
        Err(_) => Ok(raw.to_string()),
    }
}

/// One turn of a tool-augmented stage
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ReactStep {
    Call { tool: String, arguments: Value },
    Finish(String),
}

pub(crate) fn decode_react_step(stage: Stage, raw: &str, field: &str) -> Result<ReactStep, PipelineError> {
    if let Ok(Value::Object(map)) = parse_json(raw) {
        if let Some(Value::String(tool)) = map.get("tool") {
            let arguments = map.get("arguments").cloned().unwrap_or(Value::Object(Default::default()));
            return Ok(ReactStep::Call {
                tool: tool.clone(),
                arguments,
            });
        }
    }

    decode_text(stage, raw, field).map(ReactStep::Finish)
}
