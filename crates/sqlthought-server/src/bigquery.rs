//! BigQuery dry-run validator and live table schema tool

use async_trait::async_trait;
use gcp_bigquery_client::error::BQError;
use gcp_bigquery_client::model::query_request::QueryRequest;
use gcp_bigquery_client::model::table_field_schema::TableFieldSchema;
use gcp_bigquery_client::Client;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Instant;

use sqlthought_core::tools::{table_reference, table_schema_parameters};
use sqlthought_core::{CatalogSchemaTool, SqlValidator, Tool, ToolError, ToolSpec};
use sqlthought_model::ValidationResult;

use crate::config::BigQueryConfig;
use crate::error::EngineError;

/// Build a client from a service account key, or application default credentials
pub async fn connect(config: &BigQueryConfig) -> Result<Client, EngineError> {
    let client = match &config.credentials_path {
        Some(path) => {
            tracing::info!(path = %path, "creating BigQuery client from service account");
            Client::from_service_account_key_file(path).await
        }
        None => {
            tracing::info!("creating BigQuery client from application default credentials");
            Client::from_application_default_credentials().await
        }
    };

    client.map_err(|e| {
        tracing::error!(error = %e, "failed to create BigQuery client");
        EngineError::BigQuery(e)
    })
}

/// Dry-run validator: the query is planned but never executed or billed
pub struct BigQueryValidator {
    client: Client,
    project_id: String,
}

impl BigQueryValidator {
    pub fn new(client: Client, project_id: impl Into<String>) -> Self {
        Self {
            client,
            project_id: project_id.into(),
        }
    }
}

/// Rejections carry the engine's own message; anything else is a transport failure
fn classify(error: BQError) -> ValidationResult {
    match error {
        BQError::ResponseError { error } => ValidationResult::rejected(error.error.message),
        other => ValidationResult::transport(other),
    }
}

#[async_trait]
impl SqlValidator for BigQueryValidator {
    async fn dry_run(&self, sql: &str) -> ValidationResult {
        let start = Instant::now();

        let mut query_request = QueryRequest::new(sql);
        query_request.dry_run = Some(true);
        query_request.use_query_cache = Some(false);

        let result = match self.client.job().query(&self.project_id, query_request).await {
            Ok(_) => ValidationResult::valid(),
            Err(e) => {
                tracing::debug!(error = %e, "BigQuery dry run failed");
                classify(e)
            }
        };

        tracing::debug!(
            project = %self.project_id,
            valid = result.valid,
            ms = start.elapsed().as_millis() as u64,
            "bigquery dry_run"
        );

        result
    }
}

/// `get_table_schema` served from live BigQuery table metadata
pub struct BigQueryTableTool {
    client: Client,
    project_id: String,
}

impl BigQueryTableTool {
    pub fn new(client: Client, project_id: impl Into<String>) -> Self {
        Self {
            client,
            project_id: project_id.into(),
        }
    }

    /// `project.dataset` in the dataset argument overrides the configured project
    fn resolve<'a>(&'a self, dataset: &'a str) -> (&'a str, &'a str) {
        match dataset.split_once('.') {
            Some((project, dataset)) => (project, dataset),
            None => (self.project_id.as_str(), dataset),
        }
    }
}

fn flatten_fields(fields: &[TableFieldSchema], prefix: &str, out: &mut BTreeMap<String, String>) {
    for field in fields {
        let path = if prefix.is_empty() {
            field.name.clone()
        } else {
            format!("{}.{}", prefix, field.name)
        };

        let data_type = format!("{:?}", field.r#type).to_uppercase();
        let declared = match field.mode.as_deref() {
            Some("REPEATED") => format!("ARRAY<{}>", data_type),
            _ => data_type,
        };
        out.insert(path.clone(), declared);

        if let Some(nested) = &field.fields {
            flatten_fields(nested, &path, out);
        }
    }
}

#[async_trait]
impl Tool for BigQueryTableTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: CatalogSchemaTool::NAME.to_string(),
            description: "Get the column names and types of one BigQuery table".to_string(),
            parameters: table_schema_parameters(),
        }
    }

    async fn call(&self, arguments: &Value) -> Result<Value, ToolError> {
        let (dataset, table_id) = table_reference(CatalogSchemaTool::NAME, arguments)?;
        let dataset = dataset.ok_or_else(|| ToolError::InvalidArguments {
            tool: CatalogSchemaTool::NAME.to_string(),
            reason: "a dataset is required (dataset_id, or table as dataset.table)".to_string(),
        })?;
        let (project, dataset) = self.resolve(&dataset);

        let table = self
            .client
            .table()
            .get(project, dataset, &table_id, None)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, table = %table_id, "failed to get BigQuery table info");
                ToolError::Failed {
                    tool: CatalogSchemaTool::NAME.to_string(),
                    reason: e.to_string(),
                }
            })?;

        let mut columns = BTreeMap::new();
        if let Some(fields) = &table.schema.fields {
            flatten_fields(fields, "", &mut columns);
        }

        Ok(json!({
            "table": format!("{}.{}.{}", project, dataset, table_id),
            "columns": columns,
            "description": table.description,
        }))
    }
}
