use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Failures that stop vm2dhcp from starting or from running a command.
///
/// Faults met while syncing (registry calls, single events) are logged and
/// counted where they happen and never surface here.
#[derive(Error, Debug)]
pub enum Vm2DhcpError {
    /// The configuration directory cannot be determined
    #[error("Configuration error: {0}")]
    Config(String),

    /// One or more settings are unusable; every problem is listed
    #[error("Configuration validation failed: {}", list(.errors))]
    ConfigValidation { errors: Vec<ValidationError> },

    /// An explicitly named config file does not exist
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// A single setting that cannot be parsed, such as a poll interval or
    /// an unmanaged guest pattern
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Reading or writing the config file, or creating the runtime
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// Config file is not valid TOML
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// `config init` could not render the defaults
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// Printing reservations or configuration as JSON
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// The event feed cannot be opened at startup
    #[error("Event source error: {0}")]
    EventSource(#[from] crate::source::SourceError),

    /// The Prometheus exporter cannot be installed
    #[error("Metrics error: {0}")]
    Metrics(String),
}

/// One unusable setting, by dotted path (`registry.port`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

fn list(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ValidationError::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Vm2DhcpError>;
