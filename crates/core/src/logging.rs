//! Logging setup shared by the podwire crates
//!
//! Library code only emits `tracing` events; binaries and tests call
//! [`LoggerBuilder::init`] or [`init_logging`] once to install a subscriber.

use crate::error::{PodwireError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Crate targets that follow the global level
const PODWIRE_TARGETS: &[&str] = &["podwire", "podwire_core", "podwire_client", "podwire_cli"];

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for the podwire crates
    pub level: LogLevel,
    /// Per-module log levels, e.g. `russh = "warn"`
    pub module_levels: HashMap<String, LogLevel>,
    /// Log output format
    pub format: LogFormat,
    /// Output destination
    pub output: LogOutput,
    /// Include timestamps in logs
    pub include_timestamps: bool,
    /// Include source location (file:line) in logs
    pub include_location: bool,
    /// Include thread information
    pub include_thread_info: bool,
    /// Log span close events with their timing
    pub include_spans: bool,
    /// Enable ANSI color codes
    pub enable_colors: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            module_levels: HashMap::new(),
            format: LogFormat::Compact,
            output: LogOutput::Stderr,
            include_timestamps: true,
            include_location: false,
            include_thread_info: false,
            include_spans: false,
            enable_colors: true,
        }
    }
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = PodwireError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(PodwireError::config(format!("Invalid log level: {}", s))),
        }
    }
}

/// Log output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Compact single-line format
    Compact,
    /// Pretty multi-line format for development
    Pretty,
    /// Full format with all available information
    Full,
    /// JSON format for structured logging
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = PodwireError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "full" => Ok(LogFormat::Full),
            "json" => Ok(LogFormat::Json),
            _ => Err(PodwireError::config(format!("Invalid log format: {}", s))),
        }
    }
}

/// Log output destinations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogOutput {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
    /// File output
    File {
        /// Path to the log file
        path: PathBuf,
        /// Whether to append to existing file
        #[serde(default = "default_append")]
        append: bool,
    },
}

fn default_append() -> bool {
    true
}

/// Logger builder for configuring the logging system
pub struct LoggerBuilder {
    config: LoggingConfig,
}

impl LoggerBuilder {
    /// Create a new logger builder with default configuration
    pub fn new() -> Self {
        Self {
            config: LoggingConfig::default(),
        }
    }

    /// Create a logger builder from configuration
    pub fn from_config(config: LoggingConfig) -> Self {
        Self { config }
    }

    /// Set the global log level
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    /// Set log level for a specific module
    pub fn module_level<S: Into<String>>(mut self, module: S, level: LogLevel) -> Self {
        self.config.module_levels.insert(module.into(), level);
        self
    }

    /// Set the log format
    pub fn format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    /// Set the log output destination
    pub fn output(mut self, output: LogOutput) -> Self {
        self.config.output = output;
        self
    }

    /// Enable or disable timestamps
    pub fn timestamps(mut self, enable: bool) -> Self {
        self.config.include_timestamps = enable;
        self
    }

    /// Enable or disable source location information
    pub fn location(mut self, enable: bool) -> Self {
        self.config.include_location = enable;
        self
    }

    /// Enable or disable thread information
    pub fn thread_info(mut self, enable: bool) -> Self {
        self.config.include_thread_info = enable;
        self
    }

    /// Enable or disable span close events
    pub fn spans(mut self, enable: bool) -> Self {
        self.config.include_spans = enable;
        self
    }

    /// Enable or disable colored output
    pub fn colors(mut self, enable: bool) -> Self {
        self.config.enable_colors = enable;
        self
    }

    /// Initialize the global logger
    pub fn init(self) -> Result<()> {
        init_logging(self.config)
    }
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the event filter for a configuration. `RUST_LOG` replaces it entirely
/// when set.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(env_filter) = std::env::var("RUST_LOG") {
        return EnvFilter::try_new(&env_filter)
            .map_err(|e| PodwireError::config(format!("Invalid RUST_LOG '{}': {}", env_filter, e)));
    }

    let mut filter = EnvFilter::new("warn");
    let mut directives: Vec<String> = PODWIRE_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, config.level))
        .collect();
    for (module, level) in &config.module_levels {
        directives.push(format!("{}={}", module, level));
    }

    for directive in directives {
        let parsed = directive.parse().map_err(|e| {
            PodwireError::config(format!("Invalid log directive '{}': {}", directive, e))
        })?;
        filter = filter.add_directive(parsed);
    }

    Ok(filter)
}

fn make_writer(output: &LogOutput) -> Result<BoxMakeWriter> {
    match output {
        LogOutput::Stdout => Ok(BoxMakeWriter::new(std::io::stdout)),
        LogOutput::Stderr => Ok(BoxMakeWriter::new(std::io::stderr)),
        LogOutput::File { path, append } => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .append(*append)
                .truncate(!*append)
                .open(path)?;
            Ok(BoxMakeWriter::new(Mutex::new(file)))
        }
    }
}

/// Initialize the logging system with the given configuration
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;
    let to_file = matches!(config.output, LogOutput::File { .. });
    let writer = make_writer(&config.output)?;

    let base = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(config.include_thread_info)
        .with_thread_names(config.include_thread_info)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_ansi(config.enable_colors && !to_file)
        .with_span_events(if config.include_spans {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    let timestamps = config.include_timestamps;
    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json if timestamps => base.json().boxed(),
        LogFormat::Json => base.json().without_time().boxed(),
        LogFormat::Compact if timestamps => base.compact().boxed(),
        LogFormat::Compact => base.compact().without_time().boxed(),
        LogFormat::Pretty if timestamps => base.pretty().boxed(),
        LogFormat::Pretty => base.pretty().without_time().boxed(),
        LogFormat::Full if timestamps => base.boxed(),
        LogFormat::Full => base.without_time().boxed(),
    };

    Registry::default()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| PodwireError::config(format!("Failed to install logger: {}", e)))?;

    tracing::debug!("Logging system initialized with level: {}", config.level);
    Ok(())
}

/// Initialize logging from `PODWIRE_LOG_LEVEL`, `PODWIRE_LOG_FORMAT`,
/// `PODWIRE_LOG_FILE` and `NO_COLOR`
pub fn init_from_env() -> Result<()> {
    let mut builder = LoggerBuilder::new();

    if let Ok(level_str) = std::env::var("PODWIRE_LOG_LEVEL") {
        builder = builder.level(level_str.parse()?);
    }

    if let Ok(format_str) = std::env::var("PODWIRE_LOG_FORMAT") {
        builder = builder.format(format_str.parse()?);
    }

    if let Ok(file_path) = std::env::var("PODWIRE_LOG_FILE") {
        builder = builder.output(LogOutput::File {
            path: PathBuf::from(file_path),
            append: true,
        });
    }

    if std::env::var("NO_COLOR").is_ok() {
        builder = builder.colors(false);
    }

    builder.init()
}
