//! # Application Error Types
//!
//! This module defines common error types used throughout the prescription validator.
//! Component-specific failures (parse, inventory, secondary validator) live next to
//! their components and convert into [`AppError`] at the application boundary.

use std::fmt;

/// General application error type for consistent error handling
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Configuration validation errors
    Config(String),
    /// Raw model response could not be recovered into a payload
    Parse(String),
    /// Payload was structurally valid but could not be reduced to names
    Normalization(String),
    /// Inventory database loading errors
    Database(String),
    /// Secondary validator errors
    Validator(String),
    /// File system errors
    FileSystem(String),
    /// Internal application errors
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "[CONFIG] {}", msg),
            AppError::Parse(msg) => write!(f, "[PARSE] {}", msg),
            AppError::Normalization(msg) => write!(f, "[NORMALIZATION] {}", msg),
            AppError::Database(msg) => write!(f, "[DATABASE] {}", msg),
            AppError::Validator(msg) => write!(f, "[VALIDATOR] {}", msg),
            AppError::FileSystem(msg) => write!(f, "[FILESYSTEM] {}", msg),
            AppError::Internal(msg) => write!(f, "[INTERNAL] {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::FileSystem(err.to_string())
    }
}

impl From<crate::recovery_parser::ParseFailure> for AppError {
    fn from(err: crate::recovery_parser::ParseFailure) -> Self {
        AppError::Parse(err.to_string())
    }
}

impl From<crate::payload::PayloadError> for AppError {
    fn from(err: crate::payload::PayloadError) -> Self {
        AppError::Normalization(err.to_string())
    }
}

impl From<crate::inventory::InventoryError> for AppError {
    fn from(err: crate::inventory::InventoryError) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<crate::secondary::ValidatorError> for AppError {
    fn from(err: crate::secondary::ValidatorError) -> Self {
        AppError::Validator(err.to_string())
    }
}

impl From<crate::processor::ProcessError> for AppError {
    fn from(err: crate::processor::ProcessError) -> Self {
        match err {
            crate::processor::ProcessError::Parse(e) => e.into(),
            crate::processor::ProcessError::Normalization(e) => e.into(),
        }
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Standardized error logging utilities for consistent error reporting across the application
pub mod error_logging {
    use tracing::{error, warn};

    /// Log a response that could not be recovered into a payload
    pub fn log_parse_error(
        error: &impl std::fmt::Display,
        source_file: &str,
        response_len: usize,
        artifact_path: Option<&std::path::Path>,
    ) {
        error!(
            error = %error,
            source_file = %source_file,
            response_len = %response_len,
            artifact_path = ?artifact_path,
            "Response recovery failed"
        );
    }

    /// Log a single medicine entry that had to be skipped
    pub fn log_entry_skipped(error: &impl std::fmt::Display, index: usize) {
        warn!(
            error = %error,
            entry_index = %index,
            "Skipping malformed medicine entry"
        );
    }

    /// Log inventory database errors with path context
    pub fn log_database_error(
        error: &impl std::fmt::Display,
        operation: &str,
        path: Option<&std::path::Path>,
    ) {
        warn!(
            error = %error,
            operation = %operation,
            path = ?path,
            "Inventory database operation failed"
        );
    }

    /// Log secondary validator failures with request context
    pub fn log_validator_error(
        error: &impl std::fmt::Display,
        operation: &str,
        name_count: usize,
        attempt_count: Option<u32>,
    ) {
        warn!(
            error = %error,
            operation = %operation,
            name_count = %name_count,
            attempt_count = ?attempt_count,
            "Secondary validator call failed"
        );
    }

    /// Log file system errors with path and operation context
    pub fn log_filesystem_error(
        error: &impl std::fmt::Display,
        operation: &str,
        path: Option<&std::path::Path>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            path = ?path,
            "File system operation failed"
        );
    }

    /// Log configuration errors during startup/initialization
    pub fn log_config_error(error: &impl std::fmt::Display, config_key: &str, operation: &str) {
        error!(
            error = %error,
            config_key = %config_key,
            operation = %operation,
            "Configuration error"
        );
    }
}
