//! Configuration system for the sqlthought server
//!
//! Loads configuration from:
//! 1. config.yaml - operational settings (port, model, pipeline, logging)
//! 2. .env file - secrets (API key, GCP project and credentials)
//!
//! Environment variables always override config.yaml values.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use sqlthought_core::rules::default_rules;
use sqlthought_core::{CorrectionTopology, PipelineConfig, TransportPolicy, ValidationStage};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Reasoning engine (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,

    /// Alternate OpenAI-compatible endpoint
    #[serde(default)]
    pub api_base: Option<String>,

    pub temperature: f32,

    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            api_base: None,
            temperature: 0.0,
            max_tokens: None,
        }
    }
}

/// BigQuery dry-run validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BigQueryConfig {
    /// Project dry runs are billed against (never charged for a dry run)
    #[serde(default)]
    pub project_id: Option<String>,

    /// Service account key; application default credentials when unset
    #[serde(default)]
    pub credentials_path: Option<String>,

    /// Serve get_table_schema from live table metadata instead of the schema file
    #[serde(default)]
    pub live_table_schema: bool,
}

/// Static schema description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub path: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            path: "./schemas/github_repos.json".to_string(),
        }
    }
}

/// Pipeline settings as written in config.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub max_correction_attempts: usize,
    /// Ceiling on budgets requested through the MCP tool
    pub max_correction_attempts_limit: usize,
    pub correction_topology: CorrectionTopology,
    pub validation_stage: ValidationStage,
    pub transport_policy: TransportPolicy,
    pub max_tool_iterations: usize,
    pub strict_plan: bool,
    pub lint: bool,
    /// Replaces the built-in rule set
    pub rules: Option<Vec<String>>,
    pub timeout_secs: Option<u64>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let defaults = PipelineConfig::default();
        Self {
            max_correction_attempts: defaults.max_correction_attempts,
            max_correction_attempts_limit: defaults.max_correction_attempts_limit,
            correction_topology: defaults.correction_topology,
            validation_stage: defaults.validation_stage,
            transport_policy: defaults.transport_policy,
            max_tool_iterations: defaults.max_tool_iterations,
            strict_plan: defaults.strict_plan,
            lint: defaults.lint,
            rules: None,
            timeout_secs: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stdout, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            output: "stdout".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub bigquery: BigQueryConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load `path` if it exists, otherwise start from defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            return Self::load(path);
        }

        let mut config = Config::default();
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("SQLTHOUGHT_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("SQLTHOUGHT_SERVER_PORT") {
            if let Ok(port_num) = port.parse() {
                self.server.port = port_num;
            }
        }

        if let Ok(model) = std::env::var("SQLTHOUGHT_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(base) = std::env::var("OPENAI_API_BASE") {
            self.llm.api_base = Some(base);
        }

        if let Ok(project) = std::env::var("GCLOUD_BQ_PROJECT") {
            self.bigquery.project_id = Some(project);
        }
        if let Ok(path) = std::env::var("GOOGLE_APPLICATION_CREDENTIALS") {
            self.bigquery.credentials_path = Some(path);
        }

        if let Ok(path) = std::env::var("SQLTHOUGHT_SCHEMA_PATH") {
            self.schema.path = path;
        }
        if let Ok(attempts) = std::env::var("SQLTHOUGHT_MAX_CORRECTIONS") {
            if let Ok(n) = attempts.parse() {
                self.pipeline.max_correction_attempts = n;
            }
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.logging.directory = dir;
        }
    }

    /// Get OpenAI API key from environment (must be in .env)
    pub fn get_openai_api_key() -> Result<String, ConfigError> {
        std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))
    }

    pub fn bigquery_project(&self) -> Result<String, ConfigError> {
        self.bigquery
            .project_id
            .clone()
            .ok_or_else(|| ConfigError::MissingEnvVar("GCLOUD_BQ_PROJECT".to_string()))
    }

    /// Set logging environment variables for the logging module
    pub fn apply_logging_env(&self) {
        std::env::set_var("RUST_LOG", &self.logging.level);
        std::env::set_var("LOG_FORMAT", &self.logging.format);
        std::env::set_var("LOG_OUTPUT", &self.logging.output);
        std::env::set_var("LOG_DIR", &self.logging.directory);
    }

    /// The core pipeline's configuration
    pub fn to_pipeline_config(&self) -> PipelineConfig {
        let settings = &self.pipeline;
        PipelineConfig {
            max_correction_attempts: settings.max_correction_attempts,
            max_correction_attempts_limit: settings
                .max_correction_attempts_limit
                .max(settings.max_correction_attempts),
            correction_topology: settings.correction_topology,
            validation_stage: settings.validation_stage,
            transport_policy: settings.transport_policy,
            max_tool_iterations: settings.max_tool_iterations,
            strict_plan: settings.strict_plan,
            lint: settings.lint,
            rules: settings.rules.clone().unwrap_or_else(default_rules),
            timeout: settings.timeout_secs.map(Duration::from_secs),
        }
    }
}
