//! sqlthought MCP server
//!
//! Turns natural-language questions into BigQuery SQL through the staged
//! generation pipeline, validating every candidate with a dry run.
//!
//! ```bash
//! sqlthought-server                       # MCP server (SSE) on server.host:server.port
//! sqlthought-server ask "find repositories about finance, their license, and last commit message"
//! ```

use anyhow::Context;
use async_trait::async_trait;
use rust_mcp_sdk::mcp_server::{hyper_server, HyperServerOptions};
use std::sync::Arc;
use tracing::info;

use sqlthought_core::{SqlPipeline, SqlValidator, ValidationStage};
use sqlthought_model::{SchemaDescription, ValidationResult};

mod bigquery;
mod config;
mod error;
mod llm;
mod logging;
mod mcp;

use config::Config;

/// Stands in for BigQuery when the validation stage is disabled; never consulted
struct ValidationOff;

#[async_trait]
impl SqlValidator for ValidationOff {
    async fn dry_run(&self, _sql: &str) -> ValidationResult {
        ValidationResult::transport("validation is disabled")
    }
}

async fn build_pipeline(config: &Config) -> anyhow::Result<SqlPipeline> {
    let catalog = SchemaDescription::load(&config.schema.path)
        .with_context(|| format!("loading schema description from {}", config.schema.path))?;
    info!(path = %config.schema.path, tables = catalog.tables.len(), dialect = catalog.dialect(), "Schema loaded");
    let catalog = Arc::new(catalog);

    let api_key = Config::get_openai_api_key()?;
    info!(model = %config.llm.model, "Using OpenAI model");
    let engine = Arc::new(llm::OpenAiEngine::new(api_key, config.llm.clone()));

    let pipeline_config = config.to_pipeline_config();

    if pipeline_config.validation_stage == ValidationStage::Disabled {
        info!("Validation disabled; SQL is returned unvalidated");
        return Ok(SqlPipeline::new(pipeline_config, catalog, engine, Arc::new(ValidationOff)));
    }

    let project = config.bigquery_project()?;
    let client = bigquery::connect(&config.bigquery).await?;
    info!(project = %project, "BigQuery dry-run validation enabled");

    let validator = Arc::new(bigquery::BigQueryValidator::new(client.clone(), project.clone()));
    let mut pipeline = SqlPipeline::new(pipeline_config, catalog, engine, validator);

    if config.bigquery.live_table_schema {
        pipeline = pipeline.with_schema_tool(Arc::new(bigquery::BigQueryTableTool::new(client, project)));
    }

    Ok(pipeline)
}

async fn ask(pipeline: &SqlPipeline, question: &str) -> anyhow::Result<()> {
    let generation = pipeline.generate(question).await?;
    println!("{}", mcp::render_generation(&generation));

    if !generation.is_success() {
        std::process::exit(2);
    }
    Ok(())
}

async fn serve(config: &Config, pipeline: Arc<SqlPipeline>) -> anyhow::Result<()> {
    let handler = mcp::SqlThoughtServerHandler::new(pipeline);
    let server_info = mcp::SqlThoughtServerHandler::server_info();

    info!("Starting sqlthought MCP server on {}:{}", config.server.host, config.server.port);
    info!("Protocol: MCP with SSE (Server-Sent Events) support");

    let server = hyper_server::create_server(
        server_info,
        handler,
        HyperServerOptions {
            host: config.server.host.clone(),
            port: config.server.port,
            sse_support: true,
            ..Default::default()
        },
    );

    server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("MCP server stopped: {}", e))?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Secrets (OPENAI_API_KEY, GCLOUD_BQ_PROJECT, GOOGLE_APPLICATION_CREDENTIALS)
    dotenvy::dotenv().ok();

    let config_path = std::env::var("SQLTHOUGHT_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path))?;
    config.apply_logging_env();
    logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("ask") => {
            let question = args[1..].join(" ");
            if question.trim().is_empty() {
                anyhow::bail!("usage: sqlthought-server ask <question>");
            }
            let pipeline = build_pipeline(&config).await?;
            ask(&pipeline, &question).await
        }
        Some("serve") | None => {
            let pipeline = Arc::new(build_pipeline(&config).await?);
            serve(&config, pipeline).await
        }
        Some(other) => anyhow::bail!("unknown command '{}'; expected 'serve' or 'ask <question>'", other),
    }
}
