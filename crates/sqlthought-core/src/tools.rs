//! Named tools a reasoning step may call mid-reasoning

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use sqlthought_model::{strip_fences, SchemaDescription};

use crate::error::ToolError;
use crate::validator::SqlValidator;

/// Tool description shown to the reasoning engine
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;

    async fn call(&self, arguments: &Value) -> Result<Value, ToolError>;
}

/// Validate SQL with a dry run
pub struct DryRunTool {
    validator: Arc<dyn SqlValidator>,
}

impl DryRunTool {
    pub const NAME: &'static str = "dry_run_sql";

    pub fn new(validator: Arc<dyn SqlValidator>) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl Tool for DryRunTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: Self::NAME.to_string(),
            description: "Validate a SQL query with a dry run to check syntax and semantics without executing it"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {"sql": {"type": "string", "description": "SQL query to validate"}},
                "required": ["sql"]
            }),
        }
    }

    async fn call(&self, arguments: &Value) -> Result<Value, ToolError> {
        let sql = string_arg(Self::NAME, arguments, "sql")?;
        let result = self.validator.dry_run(&strip_fences(sql)).await;
        serde_json::to_value(result).map_err(|e| ToolError::Failed {
            tool: Self::NAME.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Column/type map of one table, served from the static schema description
pub struct CatalogSchemaTool {
    catalog: Arc<SchemaDescription>,
}

impl CatalogSchemaTool {
    pub const NAME: &'static str = "get_table_schema";

    pub fn new(catalog: Arc<SchemaDescription>) -> Self {
        Self { catalog }
    }
}

/// Arguments schema shared by every `get_table_schema` implementation
pub fn table_schema_parameters() -> Value {
    json!({
        "type": "object",
        "properties": {
            "dataset_id": {"type": "string", "description": "Dataset containing the table"},
            "table_id": {"type": "string", "description": "Table name"}
        },
        "required": ["dataset_id", "table_id"]
    })
}

/// `dataset_id` + `table_id`, or a single dotted `table` argument
pub fn table_reference(tool: &str, arguments: &Value) -> Result<(Option<String>, String), ToolError> {
    if let Some(table) = arguments.get("table").and_then(Value::as_str) {
        let table = table.trim().trim_matches('`');
        return match table.rsplit_once('.') {
            Some((dataset, table_id)) => Ok((Some(dataset.to_string()), table_id.to_string())),
            None => Ok((None, table.to_string())),
        };
    }

    let table_id = string_arg(tool, arguments, "table_id")?;
    let dataset = arguments
        .get("dataset_id")
        .and_then(Value::as_str)
        .map(|d| d.trim().trim_matches('`').to_string());
    Ok((dataset, table_id.trim().trim_matches('`').to_string()))
}

#[async_trait]
impl Tool for CatalogSchemaTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: Self::NAME.to_string(),
            description: "Get the column names and types of one table".to_string(),
            parameters: table_schema_parameters(),
        }
    }

    async fn call(&self, arguments: &Value) -> Result<Value, ToolError> {
        let (dataset, table_id) = table_reference(Self::NAME, arguments)?;
        let name = match dataset {
            Some(dataset) => format!("{}.{}", dataset, table_id),
            None => table_id,
        };

        let table = self.catalog.table(&name).map_err(|e| ToolError::Failed {
            tool: Self::NAME.to_string(),
            reason: e.to_string(),
        })?;

        Ok(json!({
            "table": table.name(),
            "columns": table.column_types(),
        }))
    }
}

fn string_arg<'a>(tool: &str, arguments: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments {
            tool: tool.to_string(),
            reason: format!("missing string argument '{}'", key),
        })
}

/// Fixed set of tools granted to one stage
#[derive(Clone, Default)]
pub struct Toolbox {
    tools: Vec<Arc<dyn Tool>>,
}

impl Toolbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any existing tool with the same name
    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        let name = tool.spec().name;
        self.tools.retain(|t| t.spec().name != name);
        self.tools.push(tool);
        self
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invoke a tool by name.
    ///
    /// Tool failures become an `{"error": ...}` observation so the reasoning step
    /// can see them; they never abort the stage.
    pub async fn call(&self, name: &str, arguments: &Value) -> Value {
        let Some(tool) = self.tools.iter().find(|t| t.spec().name == name) else {
            return json!({"error": ToolError::UnknownTool(name.to_string()).to_string()});
        };

        match tool.call(arguments).await {
            Ok(observation) => observation,
            Err(e) => {
                tracing::debug!(tool = name, error = %e, "tool call failed");
                json!({"error": e.to_string()})
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlthought_model::ValidationResult;

    struct RejectStar;

    #[async_trait]
    impl SqlValidator for RejectStar {
        async fn dry_run(&self, sql: &str) -> ValidationResult {
            if sql.contains('*') {
                ValidationResult::rejected("SELECT * is not allowed")
            } else {
                ValidationResult::valid()
            }
        }
    }

    fn catalog() -> Arc<SchemaDescription> {
        let json = r#"{"tables": [{"table_name": "`proj.github_repos.licenses`", "table_columns": [
            {"name": "repo_name", "type": "STRING", "mode": "REQUIRED"},
            {"name": "license", "type": "STRING"}
        ]}]}"#;
        Arc::new(SchemaDescription::from_json(json).unwrap())
    }

    #[tokio::test]
    async fn test_dry_run_tool_strips_fences() {
        let tool = DryRunTool::new(Arc::new(RejectStar));
        let observation = tool.call(&json!({"sql": "```sql\nSELECT a FROM t\n```"})).await.unwrap();
        assert_eq!(observation["valid"], true);

        let observation = tool.call(&json!({"sql": "SELECT * FROM t"})).await.unwrap();
        assert_eq!(observation["valid"], false);
        assert_eq!(observation["errors"][0], "SELECT * is not allowed");
    }

    #[tokio::test]
    async fn test_catalog_tool_resolves_dataset_and_table() {
        let tool = CatalogSchemaTool::new(catalog());
        let observation = tool
            .call(&json!({"dataset_id": "github_repos", "table_id": "licenses"}))
            .await
            .unwrap();
        assert_eq!(observation["table"], "proj.github_repos.licenses");
        assert_eq!(observation["columns"]["license"], "STRING");

        let observation = tool.call(&json!({"table": "github_repos.licenses"})).await.unwrap();
        assert_eq!(observation["columns"]["repo_name"], "STRING");
    }

    #[tokio::test]
    async fn test_toolbox_reports_errors_as_observations() {
        let toolbox = Toolbox::new().with(Arc::new(CatalogSchemaTool::new(catalog())));

        let missing = toolbox.call("get_table_schema", &json!({"table_id": "files"})).await;
        assert!(missing["error"].as_str().unwrap().contains("Table not found"));

        let unknown = toolbox.call("run_query", &json!({})).await;
        assert!(unknown["error"].as_str().unwrap().contains("Unknown tool"));

        let bad_args = toolbox.call("get_table_schema", &json!({})).await;
        assert!(bad_args["error"].as_str().unwrap().contains("table_id"));
    }

    #[test]
    fn test_toolbox_replaces_same_name() {
        let toolbox = Toolbox::new()
            .with(Arc::new(CatalogSchemaTool::new(catalog())))
            .with(Arc::new(CatalogSchemaTool::new(catalog())))
            .with(Arc::new(DryRunTool::new(Arc::new(RejectStar))));
        let names: Vec<_> = toolbox.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["get_table_schema", "dry_run_sql"]);
    }
}
