//! Structured logging for the sqlthought server
//!
//! - human-readable console output for development, JSON for production
//! - daily rotated log files
//! - per-module levels through `RUST_LOG`
//!
//! Every pipeline run is wrapped in a `generate` span carrying its `run_id`, so
//! JSON output with `with_current_span` ties stage events to one question.

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE: &str = "sqlthought-server.log";

/// Log format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format for development
    Pretty,
    /// JSON format for production (structured logging)
    Json,
    /// Compact format for testing
    Compact,
}

impl LogFormat {
    /// Parse from environment variable
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    File,
    Both,
}

impl LogOutput {
    /// Parse from environment variable
    pub fn from_env() -> Self {
        match std::env::var("LOG_OUTPUT").as_deref() {
            Ok("file") => LogOutput::File,
            Ok("both") => LogOutput::Both,
            _ => LogOutput::Stdout,
        }
    }
}

fn env_filter() -> EnvFilter {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Quiet the HTTP stack underneath the OpenAI, BigQuery and MCP clients
    for directive in ["hyper=warn", "hyper_util=warn", "reqwest=warn", "h2=warn", "tower=warn", "rustls=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    filter
}

fn file_appender() -> RollingFileAppender {
    let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string());
    std::fs::create_dir_all(&log_dir).ok();
    RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE)
}

/// Initialize the logging system
///
/// Environment variables:
/// - `RUST_LOG`: Log level (e.g., "debug", "info", "sqlthought_core=debug")
/// - `LOG_FORMAT`: Output format ("pretty", "json", "compact")
/// - `LOG_OUTPUT`: Where to write logs ("stdout", "file", "both")
/// - `LOG_DIR`: Directory for log files (default: "./logs")
///
/// ```bash
/// # Follow every reasoning call of a run
/// RUST_LOG=sqlthought_core=debug LOG_FORMAT=pretty sqlthought-server ask "..."
///
/// # Production: JSON to file
/// RUST_LOG=info LOG_FORMAT=json LOG_OUTPUT=file LOG_DIR=/var/log/sqlthought sqlthought-server
/// ```
pub fn init() {
    let format = LogFormat::from_env();
    let output = LogOutput::from_env();
    let filter = env_filter();

    // Log lines go to stderr so `ask` output on stdout stays clean
    match (output, format) {
        (LogOutput::Stdout, LogFormat::Pretty) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr).with_target(true))
                .init();
        }
        (LogOutput::Stdout, LogFormat::Json) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr).with_current_span(true))
                .init();
        }
        (LogOutput::Stdout, LogFormat::Compact) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
        (LogOutput::File, LogFormat::Json) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_writer(file_appender())
                        .with_ansi(false),
                )
                .init();
        }
        (LogOutput::File, _) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(file_appender()).with_ansi(false))
                .init();
        }
        // Both stdout and file - use boxed layers for dynamic dispatch
        (LogOutput::Both, format) => {
            let console_layer = match format {
                LogFormat::Pretty => fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .boxed(),
                LogFormat::Json => fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .boxed(),
                LogFormat::Compact => fmt::layer().compact().with_writer(std::io::stderr).boxed(),
            };

            let file_layer = fmt::layer()
                .with_writer(file_appender())
                .with_ansi(false)
                .boxed();

            tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .with(file_layer)
                .init();
        }
    }

    tracing::debug!(format = ?format, output = ?output, "logging initialized");
}

/// Helper macro for logging with structured fields
///
/// Usage:
/// ```rust,ignore
/// log_event!(
///     level: tracing::Level::INFO,
///     event: "sql_generated",
///     run_id: generation.run_id,
///     attempts: generation.correction_attempts
/// );
/// ```
#[macro_export]
macro_rules! log_event {
    (level: $level:expr, event: $event:expr $(, $key:ident: $value:expr)* $(,)?) => {
        tracing::event!(
            $level,
            event = $event
            $(, $key = ?$value)*
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_env() {
        std::env::set_var("LOG_FORMAT", "json");
        assert_eq!(LogFormat::from_env(), LogFormat::Json);

        std::env::set_var("LOG_FORMAT", "compact");
        assert_eq!(LogFormat::from_env(), LogFormat::Compact);

        std::env::set_var("LOG_FORMAT", "fancy");
        assert_eq!(LogFormat::from_env(), LogFormat::Pretty);

        std::env::remove_var("LOG_FORMAT");
        assert_eq!(LogFormat::from_env(), LogFormat::Pretty);
    }

    #[test]
    fn test_log_output_from_env() {
        std::env::set_var("LOG_OUTPUT", "file");
        assert_eq!(LogOutput::from_env(), LogOutput::File);

        std::env::set_var("LOG_OUTPUT", "both");
        assert_eq!(LogOutput::from_env(), LogOutput::Both);

        std::env::remove_var("LOG_OUTPUT");
        assert_eq!(LogOutput::from_env(), LogOutput::Stdout);
    }
}
