//! Core Error Types
//!
//! Defines the error types shared across the labctl workspace. Only
//! configuration problems and a failed Environment phase are surfaced as
//! stop conditions; unit-level failures are recorded as data on
//! `UnitResult` and never reach this type.

use thiserror::Error;

/// Core error type for the labctl workspace.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Bad scope name, non-positive batch size, unresolvable profile, missing
    /// phase handler. Raised before any unit runs.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The Environment phase contained failed units; later phases were not run.
    #[error("Fatal phase failure: {failed_units} unit(s) failed in phase '{phase}'")]
    FatalPhase { phase: String, failed_units: usize },

    /// Background workers could not be used. Callers fall back to sequential
    /// execution rather than failing.
    #[error("Scheduler infrastructure unavailable: {0}")]
    SchedulerUnavailable(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Parse errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Create an invalid configuration error
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a fatal phase error
    pub fn fatal_phase(phase: impl Into<String>, failed_units: usize) -> Self {
        Self::FatalPhase {
            phase: phase.into(),
            failed_units,
        }
    }

    /// Create a scheduler infrastructure error
    pub fn scheduler_unavailable(msg: impl Into<String>) -> Self {
        Self::SchedulerUnavailable(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error must stop a run before any unit executes.
    pub fn is_configuration(&self) -> bool {
        matches!(self, CoreError::InvalidConfiguration(_) | CoreError::Parse(_))
    }
}

/// Convert CoreError to a string
impl From<CoreError> for String {
    fn from(err: CoreError) -> String {
        err.to_string()
    }
}
