//! Core error types for tokenflow operations.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.

use std::path::PathBuf;

use thiserror::Error;

/// Core error type for tokenflow operations.
#[derive(Debug, Error)]
pub enum Error {
    // Configuration errors
    #[error("failed to read config '{path}': {reason}")]
    ConfigReadFailed { path: PathBuf, reason: String },

    #[error("config parse error: {reason}")]
    ConfigParseFailed { reason: String },

    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },

    // Runtime errors
    #[error("failed to start runtime: {reason}")]
    RuntimeStartFailed { reason: String },

    #[error("scheduler is closed")]
    SchedulerClosed,

    /// Scheduler bookkeeping reached a state it cannot recover from.
    #[error("scheduler invariant violated: {reason}")]
    InvariantViolated { reason: String },

    // Generic I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a config read error.
    pub fn config_read_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ConfigReadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a config parse error.
    pub fn config_parse_failed(reason: impl Into<String>) -> Self {
        Self::ConfigParseFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a runtime start error.
    pub fn runtime_start_failed(reason: impl Into<String>) -> Self {
        Self::RuntimeStartFailed {
            reason: reason.into(),
        }
    }

    /// Create an invariant violation error.
    pub fn invariant_violated(reason: impl Into<String>) -> Self {
        Self::InvariantViolated {
            reason: reason.into(),
        }
    }

    /// Whether this error must terminate the process.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolated { .. })
    }
}
