//! Error types for VajraPulse.
//!
//! This module defines the error types used throughout VajraPulse, providing
//! rich error information for debugging and user feedback.
//!
//! Business-level task failures are deliberately NOT represented here: a task
//! that fails produces a [`TaskResult::Failure`](crate::task::TaskResult)
//! record and never aborts the run. The variants below cover construction-time
//! contract violations and lifecycle misuse, which are fatal.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for VajraPulse operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for VajraPulse.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Construction Errors
    // ========================================================================
    /// Builder or configuration contract violation.
    #[error("Validation failed for '{field}': {message}")]
    Validation {
        /// The offending field or parameter
        field: String,
        /// What was wrong with it
        message: String,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Operation invoked in a lifecycle state that does not permit it.
    #[error("Invalid engine state for {operation}: expected {expected}, was {actual}")]
    InvalidState {
        /// The attempted operation
        operation: String,
        /// The state the operation requires
        expected: String,
        /// The state the engine was actually in
        actual: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    /// Configuration file not found.
    #[error("Configuration file not found: {0}")]
    ConfigFileNotFound(PathBuf),

    // ========================================================================
    // IO / Serialization Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // Other Errors
    // ========================================================================
    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a new invalid-state error.
    pub fn invalid_state(
        operation: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            operation: operation.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a new invalid-config error.
    pub fn invalid_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns the error code for CLI exit status.
    ///
    /// 0 is success, 1 means the run never started (bad configuration or
    /// contract violation), 2 means the run started and failed.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Validation { .. }
            | Error::Config(_)
            | Error::InvalidConfig { .. }
            | Error::ConfigFileNotFound(_)
            | Error::YamlParse(_) => 1,
            _ => 2,
        }
    }
}
