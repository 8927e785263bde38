//! Telemetry and tracing utilities
//!
//! Installs the global `tracing` subscriber used by binaries and examples
//! embedding this crate. Library code only emits events.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cardsmith::telemetry::{init_subscriber, OutputFormat, SubscriberConfig};
//!
//! let _guard = init_subscriber(
//!     SubscriberConfig::default()
//!         .with_level("debug")
//!         .with_output_format(OutputFormat::Json),
//! )?;
//! ```

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::error::LlmError;

/// Output format for tracing logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    Json,
    JsonCompact,
}

impl FromStr for OutputFormat {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "json-compact" => Ok(Self::JsonCompact),
            other => Err(LlmError::ConfigurationError(format!(
                "Invalid log format: {other}. Valid options: text, json, json-compact"
            ))),
        }
    }
}

/// Configuration for the tracing subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriberConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    pub output_format: OutputFormat,
    /// Write to stdout when no log file is set
    pub enable_console: bool,
    /// Daily-rolling log file; replaces console output when set
    pub log_file: Option<PathBuf>,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output_format: OutputFormat::Text,
            enable_console: true,
            log_file: None,
        }
    }
}

impl SubscriberConfig {
    pub fn debug() -> Self {
        Self::default().with_level("debug")
    }

    pub fn production(log_file: PathBuf) -> Self {
        Self {
            level: "warn".to_string(),
            output_format: OutputFormat::Json,
            enable_console: false,
            log_file: Some(log_file),
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub const fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub const fn with_console(mut self, enable: bool) -> Self {
        self.enable_console = enable;
        self
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Overrides from `CARDSMITH_LOG_LEVEL`, `CARDSMITH_LOG_FORMAT` and
    /// `CARDSMITH_LOG_FILE`.
    pub fn apply_env(mut self) -> Result<Self, LlmError> {
        if let Ok(level) = std::env::var("CARDSMITH_LOG_LEVEL") {
            parse_level(&level)?;
            self.level = level;
        }
        if let Ok(format) = std::env::var("CARDSMITH_LOG_FORMAT") {
            self.output_format = format.parse()?;
        }
        if let Ok(path) = std::env::var("CARDSMITH_LOG_FILE") {
            self.log_file = Some(PathBuf::from(path));
        }
        Ok(self)
    }

    /// Filter directive for this crate at the configured level.
    pub fn filter_directive(&self) -> Result<String, LlmError> {
        let level = parse_level(&self.level)?;
        Ok(format!("cardsmith={}", level.as_str().to_lowercase()))
    }
}

fn parse_level(level: &str) -> Result<tracing::Level, LlmError> {
    tracing::Level::from_str(level.trim()).map_err(|_| {
        LlmError::ConfigurationError(format!(
            "Invalid log level: {level}. Valid options: trace, debug, info, warn, error"
        ))
    })
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG`, when set, takes precedence over the configured level. The
/// returned guard flushes the log file on drop and must be kept alive while
/// logging to a file. Calling this when a subscriber is already installed is
/// not an error.
pub fn init_subscriber(config: SubscriberConfig) -> Result<Option<WorkerGuard>, LlmError> {
    let directive = config.filter_directive()?;
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(&directive)
            .map_err(|e| LlmError::ConfigurationError(format!("Invalid log filter: {e}")))
    })?;

    let (writer, guard) = match &config.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let file_name = path.file_name().ok_or_else(|| {
                LlmError::ConfigurationError(format!("Invalid log file path: {}", path.display()))
            })?;
            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None if config.enable_console => (BoxMakeWriter::new(std::io::stdout), None),
        None => (BoxMakeWriter::new(std::io::sink), None),
    };
    let ansi = config.log_file.is_none();

    let init_result = match config.output_format {
        OutputFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .json()
            .try_init(),
        OutputFormat::JsonCompact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_target(true)
            .json()
            .flatten_event(true)
            .try_init(),
        OutputFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .try_init(),
    };

    match init_result {
        Ok(()) => Ok(guard),
        // Already initialized elsewhere.
        Err(e) if e.to_string().contains("already") => Ok(guard),
        Err(e) => Err(LlmError::ConfigurationError(format!(
            "Failed to initialize tracing: {e}"
        ))),
    }
}

/// Initialize from `SubscriberConfig::default()` plus environment overrides.
pub fn init_from_env() -> Result<Option<WorkerGuard>, LlmError> {
    init_subscriber(SubscriberConfig::default().apply_env()?)
}
