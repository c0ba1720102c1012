//! Error Handling
//!
//! Unified error types for the application.
//! Uses thiserror for ergonomic error definitions.

use labctl_core::CoreError;
use thiserror::Error;

/// Exit code for configuration and infrastructure errors.
pub const EXIT_CONFIG_ERROR: i32 = 4;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Orchestrator errors (invalid plan, unknown profile, ...)
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed labctl.toml
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Report rendering or writing errors
    #[error("Report error: {0}")]
    Report(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a report error
    pub fn report(msg: impl Into<String>) -> Self {
        Self::Report(msg.into())
    }

    /// Whether this error comes from user-supplied configuration.
    pub fn is_configuration(&self) -> bool {
        match self {
            AppError::Core(e) => e.is_configuration(),
            AppError::Config(_) | AppError::TomlParse(_) => true,
            _ => false,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        EXIT_CONFIG_ERROR
    }
}

impl From<AppError> for String {
    fn from(err: AppError) -> String {
        err.to_string()
    }
}
