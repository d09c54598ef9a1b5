//! MCP (Model Context Protocol) server implementation

use async_trait::async_trait;
use rust_mcp_schema::{
    schema_utils::CallToolError, CallToolRequest, CallToolResult, ContentBlock, Implementation,
    InitializeResult, ListToolsRequest, ListToolsResult, RpcError, ServerCapabilities,
    ServerCapabilitiesTools, TextContent, Tool, ToolInputSchema, LATEST_PROTOCOL_VERSION,
};
use rust_mcp_sdk::{mcp_server::ServerHandler, McpServer};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

use sqlthought_core::{Generation, PipelineConfig, SqlPipeline};

use crate::log_event;

pub struct SqlThoughtServerHandler {
    pipeline: Arc<SqlPipeline>,
}

impl SqlThoughtServerHandler {
    pub fn new(pipeline: Arc<SqlPipeline>) -> Self {
        Self { pipeline }
    }

    /// Create server initialization details
    pub fn server_info() -> InitializeResult {
        InitializeResult {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ServerCapabilitiesTools { list_changed: None }),
                ..Default::default()
            },
            server_info: Implementation {
                name: "sqlthought-server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("sqlthought Natural Language to SQL Server".to_string()),
            },
            instructions: Some(
                "sqlthought - natural language to validated SQL. \
                 Use 'generate_sql' to turn a question into a dry-run validated query and \
                 'catalog' to inspect the tables it can use."
                    .to_string(),
            ),
            meta: None,
        }
    }

    fn string_property(description: &str) -> Map<String, Value> {
        let mut prop = Map::new();
        prop.insert("type".to_string(), Value::String("string".to_string()));
        prop.insert("description".to_string(), Value::String(description.to_string()));
        prop
    }

    /// Define available MCP tools
    fn tools() -> Vec<Tool> {
        let mut generate_properties = HashMap::new();
        generate_properties.insert(
            "question".to_string(),
            Self::string_property(
                "Natural language question (e.g., 'find repositories about finance and their license')",
            ),
        );
        let mut attempts_prop = Map::new();
        attempts_prop.insert("type".to_string(), Value::String("integer".to_string()));
        attempts_prop.insert(
            "description".to_string(),
            Value::String("Maximum number of correction attempts (defaults to the server setting)".to_string()),
        );
        generate_properties.insert("max_correction_attempts".to_string(), attempts_prop);

        let mut catalog_properties = HashMap::new();
        catalog_properties.insert(
            "table".to_string(),
            Self::string_property("Only describe this table (e.g. 'github_repos.commits')"),
        );

        vec![
            Tool {
                name: "generate_sql".to_string(),
                description: Some(
                    "Generate SQL for a natural language question. The question is linked to the \
                     schema, decomposed into clauses, planned and synthesized; the query is then \
                     validated with a dry run and corrected until it validates or the correction \
                     budget runs out. The SQL is never executed."
                        .to_string(),
                ),
                input_schema: ToolInputSchema::new(vec!["question".to_string()], Some(generate_properties)),
                title: None,
                annotations: None,
                meta: None,
                output_schema: None,
            },
            Tool {
                name: "catalog".to_string(),
                description: Some(
                    "Get the database catalog: every table with its columns, types, modes and \
                     descriptions, nested fields as dotted paths."
                        .to_string(),
                ),
                input_schema: ToolInputSchema::new(vec![], Some(catalog_properties)),
                title: None,
                annotations: None,
                meta: None,
                output_schema: None,
            },
        ]
    }
}

#[async_trait]
impl ServerHandler for SqlThoughtServerHandler {
    async fn handle_list_tools_request(
        &self,
        _request: ListToolsRequest,
        _runtime: Arc<dyn McpServer>,
    ) -> std::result::Result<ListToolsResult, RpcError> {
        info!("Listing available tools");

        Ok(ListToolsResult {
            tools: Self::tools(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn handle_call_tool_request(
        &self,
        request: CallToolRequest,
        _runtime: Arc<dyn McpServer>,
    ) -> std::result::Result<CallToolResult, CallToolError> {
        info!(tool = %request.params.name, "Tool called");

        let arguments = request.params.arguments.map(Value::Object);
        match request.params.name.as_str() {
            "generate_sql" => self.handle_generate_tool(arguments).await,
            "catalog" => self.handle_catalog_tool(arguments),
            _ => Err(CallToolError::unknown_tool(request.params.name.clone())),
        }
    }
}

fn text_result(text: String) -> CallToolResult {
    CallToolResult {
        content: vec![ContentBlock::TextContent(TextContent::new(text, None, None))],
        is_error: None,
        meta: None,
        structured_content: None,
    }
}

/// Read `max_correction_attempts`, falling back to the configured budget and
/// refusing anything above the configured ceiling
fn correction_budget(args: &Value, config: &PipelineConfig) -> std::result::Result<usize, CallToolError> {
    let Some(value) = args.get("max_correction_attempts").filter(|v| !v.is_null()) else {
        return Ok(config.max_correction_attempts);
    };

    let requested = value.as_u64().ok_or_else(|| {
        CallToolError::from_message("max_correction_attempts must be a non-negative integer")
    })?;

    let limit = config.max_correction_attempts_limit;
    match usize::try_from(requested) {
        Ok(budget) if budget <= limit => Ok(budget),
        _ => Err(CallToolError::from_message(format!(
            "max_correction_attempts {} exceeds the limit of {}",
            requested, limit
        ))),
    }
}

/// Human summary followed by the full generation as JSON
pub fn render_generation(generation: &Generation) -> String {
    let mut out = format!(
        "Status: {:?} (success: {})\nCorrection attempts: {}\n\nSQL:\n{}\n",
        generation.status,
        generation.is_success(),
        generation.correction_attempts,
        generation.sql
    );

    if !generation.errors().is_empty() {
        out.push_str("\nErrors:\n");
        for e in generation.errors() {
            out.push_str(&format!("- {}\n", e));
        }
    }

    if !generation.lint_warnings.is_empty() {
        out.push_str("\nWarnings:\n");
        for w in &generation.lint_warnings {
            out.push_str(&format!("- {}\n", w));
        }
    }

    out.push_str("\nDetails:\n");
    out.push_str(&serde_json::to_string_pretty(generation).unwrap_or_default());
    out
}

impl SqlThoughtServerHandler {
    async fn handle_generate_tool(
        &self,
        arguments: Option<Value>,
    ) -> std::result::Result<CallToolResult, CallToolError> {
        let args = arguments.ok_or_else(|| CallToolError::from_message("Missing arguments"))?;

        let question = args
            .get("question")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CallToolError::from_message("Missing required argument: question"))?;

        let budget = correction_budget(&args, self.pipeline.config())?;

        info!(question, budget, "Generating SQL");

        let generation = self
            .pipeline
            .generate_with_budget(question, budget)
            .await
            .map_err(|e| {
                error!(error = %e, "SQL generation failed");
                CallToolError::from_message(format!("Failed to generate SQL: {}", e))
            })?;

        log_event!(
            level: tracing::Level::INFO,
            event: "sql_generated",
            run_id: generation.run_id,
            status: generation.status,
            attempts: generation.correction_attempts
        );

        Ok(text_result(render_generation(&generation)))
    }

    fn handle_catalog_tool(&self, arguments: Option<Value>) -> std::result::Result<CallToolResult, CallToolError> {
        let catalog = self.pipeline.catalog();

        let table = arguments
            .as_ref()
            .and_then(|args| args.get("table"))
            .and_then(|v| v.as_str());

        let text = match table {
            Some(name) => {
                let table = catalog
                    .table(name)
                    .map_err(|e| CallToolError::from_message(e.to_string()))?;
                serde_json::to_string_pretty(&serde_json::json!({
                    "table": table.name(),
                    "columns": table.column_types(),
                }))
                .unwrap_or_default()
            }
            None => catalog.to_markdown(),
        };

        Ok(text_result(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tools_listed() {
        let tools = SqlThoughtServerHandler::tools();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["generate_sql", "catalog"]);
        assert!(tools.iter().all(|t| t.description.is_some()));
    }

    #[test]
    fn test_correction_budget_bounds() {
        let config = PipelineConfig {
            max_correction_attempts: 3,
            max_correction_attempts_limit: 8,
            ..PipelineConfig::default()
        };

        let budget = |args: Value| correction_budget(&args, &config);

        assert_eq!(budget(serde_json::json!({"question": "q"})).unwrap(), 3);
        assert_eq!(budget(serde_json::json!({"max_correction_attempts": null})).unwrap(), 3);
        assert_eq!(budget(serde_json::json!({"max_correction_attempts": 0})).unwrap(), 0);
        assert_eq!(budget(serde_json::json!({"max_correction_attempts": 8})).unwrap(), 8);
        assert!(budget(serde_json::json!({"max_correction_attempts": 9})).is_err());
        assert!(budget(serde_json::json!({"max_correction_attempts": u64::MAX})).is_err());
        assert!(budget(serde_json::json!({"max_correction_attempts": -1})).is_err());
        assert!(budget(serde_json::json!({"max_correction_attempts": "5"})).is_err());
    }
}
